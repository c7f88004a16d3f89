//! Registry wire protocol — data models and the request/response envelope.
//!
//! One request and one response per stream, each a single JSON document.
//! The same types back the Redis records and the HTTP projections, so a
//! record written by one node version reads back on the next.

use serde::{Deserialize, Serialize};

/// Protocol identifier for Registry <-> Provider/Client streams.
pub const REGISTRY_ALPN: &[u8] = b"/prxs/registry-rpc/1.0";

/// DHT key under which the registry advertises itself.
///
/// Providers and clients look up this key only to find the registry.
/// Services are never advertised here — discovery of services goes
/// through the registry itself.
pub const REGISTRY_RENDEZVOUS: &str = "prxs.infra.registry";

/// A provider's self-description, published at registration time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceCard {
    /// Primary lookup key. Non-empty for any installable card.
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub inputs: Vec<String>,
    pub cost_per_op: f64,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    /// Optional vector for semantic search. The registry computes one
    /// when absent and the semantic index is enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

/// Self-signed stake receipt presented with a new registration.
///
/// The signature binds the proof to the peer's transport identity; see
/// [`crate::stake::verify_stake`] for the exact payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StakeProof {
    pub tx_hash: String,
    /// Peer identity the stake was made for. Empty means "the presenter".
    #[serde(default)]
    pub staker: String,
    pub amount: f64,
    pub nonce: i64,
    /// Seconds since the Unix epoch.
    pub timestamp: i64,
    pub chain_id: String,
    #[serde(default)]
    pub signature: Vec<u8>,
    /// Informational only — verification uses the transport identity key.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub client_pubkey: Vec<u8>,
}

/// How to reach a provider: its identity plus the multiaddrs it announces.
///
/// Supplied by the provider in its registration request; the registry
/// does not infer transport addresses from the stream itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AddrInfo {
    pub peer_id: String,
    #[serde(default)]
    pub addrs: Vec<String>,
}

/// Request envelope. `method` is `"register"` or `"find"`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryRequest {
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card: Option<ServiceCard>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stake_proof: Option<StakeProof>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_info: Option<AddrInfo>,
}

/// Response envelope.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub providers: Option<Vec<AddrInfo>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RegistryResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn with_providers(providers: Vec<AddrInfo>) -> Self {
        Self {
            success: true,
            providers: Some(providers),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_request_with_only_method_and_query_decodes() {
        let req: RegistryRequest =
            serde_json::from_str(r#"{"method":"find","query":"mat"}"#).unwrap();
        assert_eq!(req.method, "find");
        assert_eq!(req.query, "mat");
        assert!(req.card.is_none());
        assert!(req.stake_proof.is_none());
    }

    #[test]
    fn register_request_decodes_optional_fields() {
        let req: RegistryRequest = serde_json::from_str(
            r#"{
                "method": "register",
                "card": {"name":"math","description":"adds","cost_per_op":0.1,"version":"1.0"},
                "stake_proof": {"tx_hash":"tx1","amount":10.0,"nonce":1,"timestamp":1700000000,"chain_id":"dev"},
                "provider_info": {"peer_id":"peerA","addrs":["/ip4/10.0.0.1/udp/4001/quic-v1"]}
            }"#,
        )
        .unwrap();
        let card = req.card.unwrap();
        assert_eq!(card.name, "math");
        assert!(card.tags.is_none());
        let proof = req.stake_proof.unwrap();
        assert_eq!(proof.staker, "");
        assert!(proof.signature.is_empty());
        assert_eq!(req.provider_info.unwrap().addrs.len(), 1);
    }

    #[test]
    fn failure_response_carries_error_only() {
        let resp = RegistryResponse::failure("stake signature invalid");
        let text = serde_json::to_string(&resp).unwrap();
        assert_eq!(
            text,
            r#"{"success":false,"error":"stake signature invalid"}"#
        );
    }
}

//! Registry RPC over iroh streams.
//!
//! One JSON request and one JSON response per bidirectional stream. The
//! remote peer's endpoint id doubles as the Ed25519 key its stake proof
//! must verify against, so "who opened the stream" and "who staked" are
//! the same question.
//!
//! A `register` is a heartbeat iff the peer already holds a record and
//! re-presents the stake proof with the same `tx_hash`. Anything else —
//! first contact, changed tx, changed nonce — goes through the full
//! stake-verification and replay path.

use std::sync::Arc;

use chrono::Utc;
use ed25519_dalek::VerifyingKey;
use iroh::endpoint::Connection;
use iroh::protocol::{AcceptError, ProtocolHandler};
use serde_json::json;
use tokio::time::{timeout, Duration};

use lighthouse_core::embedding;
use lighthouse_core::protocol::{RegistryRequest, RegistryResponse};
use lighthouse_core::stake::{self, short_id, ReplayGuard, StakeError};
use lighthouse_services::semantic::QdrantIndex;
use lighthouse_services::state::{RegistrationRecord, RegistryState};
use lighthouse_services::store::RedisStore;

/// Longest accepted request document.
const MAX_REQUEST_SIZE: usize = 256 * 1024;

/// A stream that has not delivered a full request within this window is
/// dropped without a response, same as a malformed one.
const READ_DEADLINE: Duration = Duration::from_secs(10);

/// Everything the request handlers share. The optional collaborators are
/// best-effort: their failures are logged, never surfaced to the peer.
#[derive(Debug)]
pub struct RegistryNode {
    pub state: Arc<RegistryState>,
    pub replay: ReplayGuard,
    pub min_stake: f64,
    pub store: Option<RedisStore>,
    pub semantic: Option<Arc<QdrantIndex>>,
}

impl RegistryNode {
    pub fn new(min_stake: f64) -> Self {
        Self {
            state: Arc::new(RegistryState::new()),
            replay: ReplayGuard::new(),
            min_stake,
            store: None,
            semantic: None,
        }
    }
}

/// The peer on the far side of a stream, as the transport authenticated
/// it.
#[derive(Debug, Clone)]
pub struct RemotePeer {
    pub id: String,
    pub pubkey: Option<VerifyingKey>,
}

impl RemotePeer {
    fn from_connection(connection: &Connection) -> Self {
        let remote = connection.remote_node_id().expect("connection has a remote node id");
        Self {
            id: remote.to_string(),
            pubkey: VerifyingKey::from_bytes(remote.as_bytes()).ok(),
        }
    }
}

/// Protocol handler registered on the iroh router for
/// [`lighthouse_core::protocol::REGISTRY_ALPN`].
#[derive(Debug, Clone)]
pub struct RegistryRpcHandler {
    node: Arc<RegistryNode>,
}

impl RegistryRpcHandler {
    pub fn new(node: Arc<RegistryNode>) -> Self {
        Self { node }
    }
}

impl ProtocolHandler for RegistryRpcHandler {
    async fn accept(&self, connection: Connection) -> Result<(), AcceptError> {
        let peer = RemotePeer::from_connection(&connection);
        tracing::debug!(peer = %short_id(&peer.id), "registry connection accepted");

        loop {
            let (send, recv) = match connection.accept_bi().await {
                Ok(stream) => stream,
                Err(err) => {
                    tracing::debug!(peer = %short_id(&peer.id), error = %err, "registry connection closed");
                    break;
                }
            };

            let node = self.node.clone();
            let peer = peer.clone();
            tokio::spawn(async move {
                if let Err(err) = handle_stream(node, peer, send, recv).await {
                    tracing::debug!(error = %err, "registry stream failed");
                }
            });
        }

        Ok(())
    }
}

async fn handle_stream(
    node: Arc<RegistryNode>,
    peer: RemotePeer,
    mut send: iroh::endpoint::SendStream,
    mut recv: iroh::endpoint::RecvStream,
) -> anyhow::Result<()> {
    let buffer = match timeout(READ_DEADLINE, recv.read_to_end(MAX_REQUEST_SIZE)).await {
        Ok(Ok(buffer)) => buffer,
        Ok(Err(err)) => {
            tracing::debug!(peer = %short_id(&peer.id), error = %err, "request read failed");
            return Ok(());
        }
        Err(_) => {
            tracing::debug!(peer = %short_id(&peer.id), "request read deadline expired");
            return Ok(());
        }
    };

    // Malformed requests get no response, just a closed stream.
    let request: RegistryRequest = match serde_json::from_slice(&buffer) {
        Ok(request) => request,
        Err(_) => return Ok(()),
    };

    let response = dispatch(&node, &peer, request).await;
    let bytes = serde_json::to_vec(&response)?;
    send.write_all(&bytes).await?;
    send.finish()?;
    Ok(())
}

/// Decode-independent request dispatch; the unit under test for the
/// registration protocol.
pub async fn dispatch(
    node: &RegistryNode,
    peer: &RemotePeer,
    request: RegistryRequest,
) -> RegistryResponse {
    match request.method.as_str() {
        "register" => handle_register(node, peer, request).await,
        "find" => handle_find(node, &request.query),
        _ => RegistryResponse::failure("Unknown method"),
    }
}

async fn handle_register(
    node: &RegistryNode,
    peer: &RemotePeer,
    request: RegistryRequest,
) -> RegistryResponse {
    let existing = node.state.get(&peer.id);

    let is_heartbeat = match (&existing, &request.stake_proof) {
        (Some(existing), Some(incoming)) => existing
            .stake_proof
            .as_ref()
            .is_some_and(|current| current.tx_hash == incoming.tx_hash),
        _ => false,
    };

    if is_heartbeat {
        let updated = node
            .state
            .heartbeat(&peer.id, Utc::now(), request.provider_info);
        tracing::info!(peer = %short_id(&peer.id), "heartbeat received");

        if let (Some(store), Some(record)) = (&node.store, &updated) {
            if let Err(err) = store.save(&peer.id, record).await {
                tracing::warn!(error = %err, "failed to save heartbeat to redis");
            }
        }
        return RegistryResponse::ok();
    }

    // New registration, or the stake changed: full verification path.
    let Some(proof) = request.stake_proof else {
        let err = StakeError::Missing(node.min_stake);
        tracing::warn!(peer = %short_id(&peer.id), error = %err, "stake invalid");
        return RegistryResponse::failure(err.to_string());
    };
    if let Err(err) = stake::verify_stake(
        &peer.id,
        peer.pubkey.as_ref(),
        Some(&proof),
        node.min_stake,
    ) {
        tracing::warn!(peer = %short_id(&peer.id), error = %err, "stake invalid");
        return RegistryResponse::failure(err.to_string());
    }

    if !node.replay.check_and_claim(&proof.tx_hash, proof.nonce) {
        tracing::warn!(peer = %short_id(&peer.id), tx_hash = %proof.tx_hash, "replay attack");
        return RegistryResponse::failure("stake proof already used (replay detected)");
    }

    let (Some(card), Some(provider_info)) = (request.card, request.provider_info) else {
        // No card or no reachable addresses: the stake is accepted and
        // the replay key stays claimed, but nothing is installed.
        tracing::debug!(peer = %short_id(&peer.id), "register without provider info, nothing installed");
        return RegistryResponse::ok();
    };

    let vector = card
        .embedding
        .clone()
        .unwrap_or_else(|| embedding::embed_card(&card));

    let record = RegistrationRecord {
        last_seen: Utc::now(),
        service_card: card,
        stake_proof: Some(proof),
        addr_info: provider_info,
    };
    node.state.upsert(&peer.id, record.clone());
    tracing::info!(
        peer = %short_id(&peer.id),
        service = %record.service_card.name,
        "new registration"
    );

    if let Some(store) = &node.store {
        if let Err(err) = store.save(&peer.id, &record).await {
            tracing::warn!(error = %err, "failed to save registration to redis");
        }
    }

    if let Some(index) = &node.semantic {
        if !vector.is_empty() {
            let card = &record.service_card;
            let payload = json!({
                "service_name": card.name,
                "peer_id": peer.id,
                "description": card.description,
                "tags": card.tags,
                "version": card.version,
                "cost_per_op": card.cost_per_op,
            });
            let point = format!("{}:{}", peer.id, card.name);
            if let Err(err) = index.upsert(&point, &vector, payload).await {
                tracing::warn!(error = %err, "qdrant upsert failed");
            }
        }
    }

    RegistryResponse::ok()
}

fn handle_find(node: &RegistryNode, query: &str) -> RegistryResponse {
    let providers = node.state.find_providers(query);
    tracing::info!(query, hits = providers.len(), "served find query");
    RegistryResponse::with_providers(providers)
}

//! End-to-end dispatch tests for the registry protocol, driven without a
//! live network: requests go straight into `rpc::dispatch` with a signed
//! stake proof, the way the stream handler would after decoding.

use chrono::{Duration, Utc};
use ed25519_dalek::{Signer, SigningKey};

use lighthouse_core::protocol::{AddrInfo, RegistryRequest, ServiceCard, StakeProof};
use lighthouse_core::stake::stake_digest;
use lighthouse_services::state::LIVENESS_TTL_SECS;
use lighthoused::rpc::{dispatch, RegistryNode, RemotePeer};

struct TestPeer {
    id: String,
    key: SigningKey,
}

impl TestPeer {
    fn new(id: &str, seed: u8) -> Self {
        Self {
            id: id.to_string(),
            key: SigningKey::from_bytes(&[seed; 32]),
        }
    }

    fn remote(&self) -> RemotePeer {
        RemotePeer {
            id: self.id.clone(),
            pubkey: Some(self.key.verifying_key()),
        }
    }

    fn proof(&self, tx_hash: &str, nonce: i64, amount: f64) -> StakeProof {
        let mut proof = StakeProof {
            tx_hash: tx_hash.to_string(),
            amount,
            nonce,
            timestamp: 1_700_000_000,
            chain_id: "dev".to_string(),
            ..StakeProof::default()
        };
        proof.signature = self.key.sign(&stake_digest(&proof)).to_vec();
        proof
    }

    fn addr(&self) -> AddrInfo {
        AddrInfo {
            peer_id: self.id.clone(),
            addrs: vec!["/ip4/10.0.0.1/udp/4001/quic-v1".to_string()],
        }
    }
}

fn card(name: &str) -> ServiceCard {
    ServiceCard {
        name: name.to_string(),
        description: format!("{name} service"),
        inputs: vec!["input".to_string()],
        cost_per_op: 0.5,
        version: "1.0".to_string(),
        ..ServiceCard::default()
    }
}

fn register(peer: &TestPeer, card: ServiceCard, proof: StakeProof) -> RegistryRequest {
    RegistryRequest {
        method: "register".to_string(),
        card: Some(card),
        stake_proof: Some(proof),
        provider_info: Some(peer.addr()),
        ..RegistryRequest::default()
    }
}

fn find(query: &str) -> RegistryRequest {
    RegistryRequest {
        method: "find".to_string(),
        query: query.to_string(),
        ..RegistryRequest::default()
    }
}

#[tokio::test]
async fn register_then_find() {
    let node = RegistryNode::new(10.0);
    let peer = TestPeer::new("peerA", 1);

    let resp = dispatch(
        &node,
        &peer.remote(),
        register(&peer, card("math"), peer.proof("tx1", 1, 10.0)),
    )
    .await;
    assert!(resp.success, "registration failed: {:?}", resp.error);

    let resp = dispatch(&node, &peer.remote(), find("mat")).await;
    assert!(resp.success);
    let providers = resp.providers.unwrap();
    assert_eq!(providers.len(), 1);
    assert_eq!(providers[0], peer.addr());
}

#[tokio::test]
async fn find_with_empty_query_matches_all() {
    let node = RegistryNode::new(10.0);
    let a = TestPeer::new("peerA", 1);
    let b = TestPeer::new("peerB", 2);

    dispatch(&node, &a.remote(), register(&a, card("math"), a.proof("tx1", 1, 10.0))).await;
    dispatch(&node, &b.remote(), register(&b, card("ocr"), b.proof("tx2", 1, 10.0))).await;

    let resp = dispatch(&node, &a.remote(), find("")).await;
    assert_eq!(resp.providers.unwrap().len(), 2);

    let resp = dispatch(&node, &a.remote(), find("nothing-here")).await;
    assert!(resp.success);
    assert!(resp.providers.unwrap().is_empty());
}

#[tokio::test]
async fn heartbeat_advances_last_seen_but_never_the_card() {
    let node = RegistryNode::new(10.0);
    let peer = TestPeer::new("peerA", 1);
    let proof = peer.proof("tx1", 1, 10.0);

    dispatch(&node, &peer.remote(), register(&peer, card("math"), proof.clone())).await;
    let first = node.state.get(&peer.id).unwrap();

    // Same tx_hash: a heartbeat, even though the card in the request
    // says something else.
    let resp = dispatch(&node, &peer.remote(), register(&peer, card("math2"), proof.clone())).await;
    assert!(resp.success);

    let after = node.state.get(&peer.id).unwrap();
    assert_eq!(after.service_card.name, "math");
    assert!(after.last_seen >= first.last_seen);
    assert!(node.state.get_by_name("math2").is_empty());

    // And a third heartbeat still succeeds — heartbeats never trip the
    // replay guard.
    let resp = dispatch(&node, &peer.remote(), register(&peer, card("math"), proof)).await;
    assert!(resp.success);
}

#[tokio::test]
async fn replayed_proof_is_rejected_after_eviction() {
    let node = RegistryNode::new(10.0);
    let peer = TestPeer::new("peerA", 1);
    let proof = peer.proof("tx1", 1, 10.0);

    let resp = dispatch(&node, &peer.remote(), register(&peer, card("math"), proof.clone())).await;
    assert!(resp.success);

    // The record dies, the replay guard does not.
    node.state.evict(&peer.id).unwrap();

    let resp = dispatch(&node, &peer.remote(), register(&peer, card("math"), proof)).await;
    assert!(!resp.success);
    assert_eq!(
        resp.error.unwrap(),
        "stake proof already used (replay detected)"
    );
}

#[tokio::test]
async fn replayed_proof_is_rejected_across_peers() {
    let node = RegistryNode::new(10.0);
    let a = TestPeer::new("peerA", 1);
    let b = TestPeer::new("peerB", 2);

    dispatch(&node, &a.remote(), register(&a, card("math"), a.proof("tx1", 1, 10.0))).await;

    // peerB signs the same (tx_hash, nonce) with its own key; the
    // signature is fine but the pair is spent.
    let resp =
        dispatch(&node, &b.remote(), register(&b, card("ocr"), b.proof("tx1", 1, 10.0))).await;
    assert!(!resp.success);
    assert_eq!(
        resp.error.unwrap(),
        "stake proof already used (replay detected)"
    );
}

#[tokio::test]
async fn new_stake_replaces_card_and_moves_the_index() {
    let node = RegistryNode::new(10.0);
    let peer = TestPeer::new("peerA", 1);

    dispatch(&node, &peer.remote(), register(&peer, card("math"), peer.proof("tx1", 1, 10.0))).await;
    let resp = dispatch(
        &node,
        &peer.remote(),
        register(&peer, card("stats"), peer.proof("tx2", 2, 10.0)),
    )
    .await;
    assert!(resp.success);

    assert_eq!(node.state.get(&peer.id).unwrap().service_card.name, "stats");
    assert!(node.state.get_by_name("math").is_empty());
    assert_eq!(node.state.get_by_name("stats").len(), 1);
}

#[tokio::test]
async fn stake_too_low_is_rejected_with_exact_message() {
    let node = RegistryNode::new(10.0);
    let peer = TestPeer::new("peerA", 1);

    let resp =
        dispatch(&node, &peer.remote(), register(&peer, card("math"), peer.proof("tx1", 1, 5.0)))
            .await;
    assert!(!resp.success);
    assert_eq!(resp.error.unwrap(), "stake too low: have 5.00 need 10.00");
    assert!(node.state.is_empty());
}

#[tokio::test]
async fn staker_mismatch_is_rejected() {
    let node = RegistryNode::new(10.0);
    let peer = TestPeer::new("peerA", 1);

    let mut proof = peer.proof("tx1", 1, 10.0);
    proof.staker = "peerB".to_string();
    // Re-sign: the staker field is not part of the canonical payload,
    // but keep the proof otherwise valid.
    proof.signature = peer.key.sign(&stake_digest(&proof)).to_vec();

    let resp = dispatch(&node, &peer.remote(), register(&peer, card("math"), proof)).await;
    assert!(!resp.success);
    assert!(resp.error.unwrap().starts_with("stake staker mismatch"));
}

#[tokio::test]
async fn missing_stake_is_rejected() {
    let node = RegistryNode::new(10.0);
    let peer = TestPeer::new("peerA", 1);

    let request = RegistryRequest {
        method: "register".to_string(),
        card: Some(card("math")),
        provider_info: Some(peer.addr()),
        ..RegistryRequest::default()
    };
    let resp = dispatch(&node, &peer.remote(), request).await;
    assert!(!resp.success);
    assert_eq!(resp.error.unwrap(), "stake proof required (min 10.00)");
}

#[tokio::test]
async fn foreign_signature_is_rejected() {
    let node = RegistryNode::new(10.0);
    let peer = TestPeer::new("peerA", 1);
    let other = TestPeer::new("peerA", 2); // same id, different key

    let resp = dispatch(
        &node,
        &peer.remote(),
        register(&peer, card("math"), other.proof("tx1", 1, 10.0)),
    )
    .await;
    assert!(!resp.success);
    assert_eq!(resp.error.unwrap(), "stake signature invalid");
}

#[tokio::test]
async fn unknown_method_is_rejected() {
    let node = RegistryNode::new(10.0);
    let peer = TestPeer::new("peerA", 1);

    let request = RegistryRequest {
        method: "destroy".to_string(),
        ..RegistryRequest::default()
    };
    let resp = dispatch(&node, &peer.remote(), request).await;
    assert!(!resp.success);
    assert_eq!(resp.error.unwrap(), "Unknown method");
}

#[tokio::test]
async fn register_without_provider_info_installs_nothing_but_claims_the_proof() {
    let node = RegistryNode::new(10.0);
    let peer = TestPeer::new("peerA", 1);

    let request = RegistryRequest {
        method: "register".to_string(),
        card: Some(card("math")),
        stake_proof: Some(peer.proof("tx1", 1, 10.0)),
        ..RegistryRequest::default()
    };
    let resp = dispatch(&node, &peer.remote(), request).await;
    assert!(resp.success);
    assert!(node.state.is_empty());

    // The claimed pair cannot admit a later registration.
    let resp =
        dispatch(&node, &peer.remote(), register(&peer, card("math"), peer.proof("tx1", 1, 10.0)))
            .await;
    assert!(!resp.success);
}

#[tokio::test]
async fn silent_provider_is_evicted_and_disappears_from_find() {
    let node = RegistryNode::new(10.0);
    let peer = TestPeer::new("peerA", 1);

    dispatch(&node, &peer.remote(), register(&peer, card("math"), peer.proof("tx1", 1, 10.0))).await;

    // 95 seconds later the eviction sweep fires with no heartbeat seen.
    let evicted = node.state.evict_stale(
        Utc::now() + Duration::seconds(95),
        Duration::seconds(LIVENESS_TTL_SECS),
    );
    assert_eq!(evicted.len(), 1);
    assert_eq!(evicted[0].0, peer.id);

    let resp = dispatch(&node, &peer.remote(), find("")).await;
    assert!(resp.success);
    assert!(resp.providers.unwrap().is_empty());
}

//! Periodic DHT advertisement under the registry rendezvous key.
//!
//! Providers and clients resolve the rendezvous key to find the registry;
//! they never advertise services here. The signing key and salt for the
//! mutable item are derived from the rendezvous string and the current
//! unix minute, so resolvers can recompute them without any shared state
//! beyond the well-known key.

use std::sync::Arc;
use std::time::Duration;

use mainline::{Dht, MutableItem, SigningKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use lighthouse_core::protocol::REGISTRY_RENDEZVOUS;

const ADVERTISE_INTERVAL: Duration = Duration::from_secs(60);

/// Record stored under the rendezvous key: enough for a peer to dial us.
#[derive(Debug, Serialize, Deserialize)]
pub struct RendezvousRecord {
    pub node_id: [u8; 32],
    pub published_at: u64,
}

/// Start a mainline DHT client, optionally seeded with an extra
/// bootstrap node (`host:port`) on top of the well-known ones.
pub fn start_dht(bootstrap: Option<&str>) -> std::io::Result<Dht> {
    let mut builder = Dht::builder();
    if let Some(node) = bootstrap {
        builder.extra_bootstrap(&[node.to_string()]);
    }
    builder
        .build()
        .map_err(|e| std::io::Error::other(format!("DHT client: {e}")))
}

/// Republish the rendezvous record every minute.
///
/// Runs forever — cancel by dropping the task handle.
pub async fn advertise_loop(dht: Dht, node_id: [u8; 32]) {
    let dht = Arc::new(dht);
    let mut interval = tokio::time::interval(ADVERTISE_INTERVAL);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut seq = 0i64;

    loop {
        interval.tick().await;
        publish(&dht, node_id, seq).await;
        seq += 1;
    }
}

async fn publish(dht: &Arc<Dht>, node_id: [u8; 32], seq: i64) {
    let minute = unix_minute();
    let record = RendezvousRecord {
        node_id,
        published_at: std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs(),
    };
    let value = match postcard::to_allocvec(&record) {
        Ok(value) => value,
        Err(err) => {
            tracing::error!(error = %err, "failed to encode rendezvous record");
            return;
        }
    };

    let signing_key = derive_signing_key(REGISTRY_RENDEZVOUS.as_bytes(), minute);
    let salt = derive_salt(REGISTRY_RENDEZVOUS.as_bytes(), minute);
    let item = MutableItem::new(signing_key, &value, seq, Some(&salt));

    let dht = Arc::clone(dht);
    match tokio::task::spawn_blocking(move || dht.put_mutable(item, None)).await {
        Ok(Ok(_)) => tracing::debug!(seq, minute, "advertised presence on DHT"),
        Ok(Err(err)) => tracing::warn!(error = %err, "DHT advertisement failed"),
        Err(err) => tracing::error!(error = %err, "DHT advertisement task panicked"),
    }
}

/// Derive the rendezvous signing key for a given unix minute.
pub fn derive_signing_key(rendezvous: &[u8], unix_minute: u64) -> SigningKey {
    let mut hasher = Sha256::new();
    hasher.update(b"lighthouse:rendezvous:v1:");
    hasher.update(rendezvous);
    hasher.update(unix_minute.to_le_bytes());
    let hash = hasher.finalize();
    SigningKey::from_bytes(&hash.into())
}

/// Derive the mutable-item salt for a given unix minute.
pub fn derive_salt(rendezvous: &[u8], unix_minute: u64) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(b"lighthouse:salt:v1:");
    hasher.update(rendezvous);
    hasher.update(unix_minute.to_le_bytes());
    hasher.finalize().to_vec()
}

/// Current unix minute.
pub fn unix_minute() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
        / 60
}

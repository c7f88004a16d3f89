//! Redis-backed persistence for registry state.
//!
//! The durable store is a TTL'd mirror of the in-memory state: losing it
//! costs nothing but restart continuity. Keys: `registration:<peer_id>`
//! holds the JSON-encoded record, `service:<name>` holds the set of peer
//! ids offering that service; both carry the same TTL, refreshed on each
//! save. Every operation is bounded by a short deadline so a hung Redis
//! cannot stall the eviction loop.

use std::collections::HashMap;
use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use thiserror::Error;
use tokio::time::timeout;

use crate::state::RegistrationRecord;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const OP_TIMEOUT: Duration = Duration::from_secs(2);

const REGISTRATION_PREFIX: &str = "registration:";
const SERVICE_PREFIX: &str = "service:";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("record encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("redis operation timed out")]
    Timeout,
}

/// Handle to the durable store. Cheap to clone; all clones share one
/// multiplexed connection.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    ttl: Duration,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore").field("ttl", &self.ttl).finish()
    }
}

impl RedisStore {
    /// Connect and ping. `addr` is `host:port` or a full `redis://` URL.
    pub async fn connect(addr: &str, ttl: Duration) -> Result<Self, StoreError> {
        let url = if addr.contains("://") {
            addr.to_string()
        } else {
            format!("redis://{addr}")
        };
        let client = redis::Client::open(url)?;
        let mut conn = timeout(CONNECT_TIMEOUT, client.get_connection_manager())
            .await
            .map_err(|_| StoreError::Timeout)??;
        timeout(OP_TIMEOUT, redis::cmd("PING").query_async::<()>(&mut conn))
            .await
            .map_err(|_| StoreError::Timeout)??;
        tracing::info!(addr, "redis connected");
        Ok(Self { conn, ttl })
    }

    /// Store a registration record and refresh the service-name set.
    pub async fn save(&self, peer_id: &str, record: &RegistrationRecord) -> Result<(), StoreError> {
        let payload = serde_json::to_string(record)?;
        let key = registration_key(peer_id);
        let service_key = service_key(&record.service_card.name);
        let ttl_secs = self.ttl.as_secs();
        let mut conn = self.conn.clone();

        timeout(OP_TIMEOUT, async move {
            conn.set_ex::<_, _, ()>(&key, payload, ttl_secs).await?;
            conn.sadd::<_, _, ()>(&service_key, peer_id).await?;
            conn.expire::<_, ()>(&service_key, ttl_secs as i64).await?;
            Ok(())
        })
        .await
        .map_err(|_| StoreError::Timeout)?
    }

    /// Fetch a single registration record.
    pub async fn load(&self, peer_id: &str) -> Result<Option<RegistrationRecord>, StoreError> {
        let key = registration_key(peer_id);
        let mut conn = self.conn.clone();
        let data: Option<String> = timeout(OP_TIMEOUT, conn.get(&key))
            .await
            .map_err(|_| StoreError::Timeout)??;
        match data {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    /// Remove a registration record and its service-set membership.
    pub async fn delete(&self, peer_id: &str, service_name: &str) -> Result<(), StoreError> {
        let key = registration_key(peer_id);
        let service_key = service_key(service_name);
        let mut conn = self.conn.clone();

        timeout(OP_TIMEOUT, async move {
            conn.del::<_, ()>(&key).await?;
            conn.srem::<_, _, ()>(&service_key, peer_id).await?;
            Ok(())
        })
        .await
        .map_err(|_| StoreError::Timeout)?
    }

    /// Load every stored registration, keyed by peer id. Unreadable
    /// entries are skipped with a warning — one corrupt record must not
    /// block startup. Staleness filtering is the caller's job.
    pub async fn restore_all(&self) -> Result<HashMap<String, RegistrationRecord>, StoreError> {
        let mut conn = self.conn.clone();
        let pattern = format!("{REGISTRATION_PREFIX}*");

        let keys: Vec<String> = timeout(CONNECT_TIMEOUT, async {
            let mut keys = Vec::new();
            let mut iter = conn.scan_match::<_, String>(&pattern).await?;
            while let Some(key) = iter.next_item().await {
                keys.push(key);
            }
            Ok::<_, redis::RedisError>(keys)
        })
        .await
        .map_err(|_| StoreError::Timeout)??;

        let mut records = HashMap::with_capacity(keys.len());
        let mut conn = self.conn.clone();
        for key in keys {
            let data: Option<String> = match timeout(OP_TIMEOUT, conn.get(&key)).await {
                Ok(Ok(data)) => data,
                Ok(Err(err)) => {
                    tracing::warn!(key, error = %err, "failed to read registration key");
                    continue;
                }
                Err(_) => return Err(StoreError::Timeout),
            };
            let Some(text) = data else { continue };
            let record: RegistrationRecord = match serde_json::from_str(&text) {
                Ok(record) => record,
                Err(err) => {
                    tracing::warn!(key, error = %err, "failed to decode registration record");
                    continue;
                }
            };
            let peer_id = key.trim_start_matches(REGISTRATION_PREFIX).to_string();
            records.insert(peer_id, record);
        }
        Ok(records)
    }
}

fn registration_key(peer_id: &str) -> String {
    format!("{REGISTRATION_PREFIX}{peer_id}")
}

fn service_key(name: &str) -> String {
    format!("{SERVICE_PREFIX}{name}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use lighthouse_core::protocol::{AddrInfo, ServiceCard};

    #[test]
    fn key_layout_matches_the_store_contract() {
        assert_eq!(registration_key("peerA"), "registration:peerA");
        assert_eq!(service_key("math"), "service:math");
    }

    #[test]
    fn record_json_roundtrips_through_store_encoding() {
        let record = RegistrationRecord {
            last_seen: Utc::now(),
            service_card: ServiceCard {
                name: "math".into(),
                description: "adds".into(),
                cost_per_op: 0.5,
                version: "1.0".into(),
                ..ServiceCard::default()
            },
            stake_proof: None,
            addr_info: AddrInfo {
                peer_id: "peerA".into(),
                addrs: vec!["/ip4/10.0.0.1/udp/4001/quic-v1".into()],
            },
        };
        let text = serde_json::to_string(&record).unwrap();
        let decoded: RegistrationRecord = serde_json::from_str(&text).unwrap();
        assert_eq!(decoded.service_card, record.service_card);
        assert_eq!(decoded.addr_info, record.addr_info);
        assert_eq!(decoded.last_seen, record.last_seen);
    }
}

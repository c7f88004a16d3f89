//! Eviction of providers whose heartbeats stopped.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use lighthouse_core::stake::short_id;
use lighthouse_services::state::LIVENESS_TTL_SECS;

use crate::rpc::RegistryNode;

const SWEEP_INTERVAL: Duration = Duration::from_secs(10);

/// Prune registrations whose `last_seen` fell behind the liveness
/// window. Stale sessions are collected under the state lock; the
/// matching durable-store deletions happen after it is released.
///
/// Runs forever — cancel by dropping the task handle.
pub async fn gc_loop(node: Arc<RegistryNode>) {
    let ttl = chrono::Duration::seconds(LIVENESS_TTL_SECS);
    let mut interval = tokio::time::interval(SWEEP_INTERVAL);

    loop {
        interval.tick().await;

        let evicted = node.state.evict_stale(Utc::now(), ttl);
        for (peer_id, record) in evicted {
            tracing::info!(
                peer = %short_id(&peer_id),
                service = %record.service_card.name,
                last_seen = %record.last_seen.to_rfc3339(),
                "pruning dead provider"
            );
            if let Some(store) = &node.store {
                if let Err(err) = store.delete(&peer_id, &record.service_card.name).await {
                    tracing::warn!(error = %err, "failed to delete registration from redis");
                }
            }
        }
    }
}

//! Startup rehydration from the durable store.

use chrono::Utc;

use lighthouse_services::state::LIVENESS_TTL_SECS;
use lighthouse_services::store::StoreError;

use crate::rpc::RegistryNode;

/// Rebuild in-memory state from Redis. Records already past the liveness
/// window are skipped so a restarted registry does not resurrect peers
/// the next eviction tick would collect anyway. The replay guard is NOT
/// restored: a previously-spent stake proof is accepted again after a
/// restart.
pub async fn restore_state(node: &RegistryNode) -> Result<(), StoreError> {
    let Some(store) = &node.store else {
        return Ok(());
    };

    tracing::info!("restoring state from redis");
    let records = store.restore_all().await?;
    if records.is_empty() {
        tracing::info!("no registrations found in redis");
        return Ok(());
    }

    let (restored, skipped) = node.state.restore(
        records,
        Utc::now(),
        chrono::Duration::seconds(LIVENESS_TTL_SECS),
    );
    tracing::info!(
        restored,
        skipped,
        services = node.state.service_count(),
        "state restored"
    );
    Ok(())
}

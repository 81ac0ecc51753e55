use std::sync::Arc;
use std::time::Duration;

use super::registry::ConnectionRegistry;

/// Spawn a background task that closes stale observers and pings the rest.
///
/// Runs until aborted; the returned handle is aborted during shutdown.
pub fn start_heartbeat(
    registry: Arc<ConnectionRegistry>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);

        loop {
            ticker.tick().await;

            let stale = registry.sweep_stale().await;
            let count = registry.total_connections().await;
            tracing::debug!(count, stale = stale.len(), "Observer heartbeat ping");
            registry.ping_all().await;
        }
    })
}

//! Eviction loop: periodically drops partial frames that stopped
//! receiving chunks.

use std::time::Duration;

use tokio::sync::broadcast;

use facestream_services::FrameService;

/// Runs until shutdown. With a zero `ttl` eviction is disabled and the loop
/// only waits for shutdown.
pub async fn eviction_loop(
    service: FrameService,
    ttl: Duration,
    every: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    if ttl.is_zero() {
        tracing::debug!("stalled frame eviction disabled");
        let _ = shutdown.recv().await;
        return;
    }

    tracing::info!(ttl_secs = ttl.as_secs(), "stalled frame eviction enabled");
    let mut interval = tokio::time::interval(every);

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("eviction loop shutting down");
                return;
            }
            _ = interval.tick() => {
                let evicted = service.evict_stale(ttl);
                if evicted > 0 {
                    tracing::info!(evicted, "evicted stalled frames");
                }
            }
        }
    }
}

//! Background metrics persistence for server roles.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::recorder::MetricsRecorder;
use crate::config::FlushConfig;
use crate::shutdown::Shutdown;

/// Saves a snapshot every `config.interval` and a final snapshot (plus
/// summary) once `shutdown` fires. Save errors are logged, never fatal.
pub fn spawn_flusher(
    recorder: Arc<MetricsRecorder>,
    config: FlushConfig,
    mut shutdown: Shutdown,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(config.interval);
        // The first tick completes immediately; skip it.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = recorder.save(&config.path) {
                        warn!(error = %e, "periodic metrics save failed");
                    }
                }
                _ = shutdown.wait() => break,
            }
        }

        match recorder.save_final(&config.path) {
            Ok(snapshot) => info!(
                path = %config.path.display(),
                processed = snapshot.transactions.processed,
                failed = snapshot.transactions.failed,
                "final metrics saved"
            ),
            Err(e) => warn!(error = %e, "final metrics save failed"),
        }
    })
}

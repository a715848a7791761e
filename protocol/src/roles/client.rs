//! Client driver: generates a stream of transactions against the endorsers.
//!
//! Each iteration picks an endorser at random and waits for it to accept a
//! connection before sending. An endorser that stays unreachable for the
//! whole discovery window is skipped and the loop moves on; the client never
//! gives up on its own.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::config::{ClientConfig, PeerAddr, CLIENT_PAYLOAD_PREFIX};
use crate::metrics::MetricsRecorder;
use crate::network::transport::{probe, request};
use crate::network::PeerSelector;
use crate::shutdown::Shutdown;
use crate::transaction::Transaction;

/// Result of a single send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// The endorser replied.
    Acknowledged { reply: String, latency: Duration },
    /// The endorser closed the connection without replying.
    NoResponse,
    /// Connecting or writing failed.
    Failed,
}

/// Drives one client process.
#[derive(Debug)]
pub struct ClientDriver {
    config: ClientConfig,
    selector: PeerSelector,
    metrics: Arc<MetricsRecorder>,
    metrics_path: Option<PathBuf>,
    next_sequence: u64,
}

impl ClientDriver {
    /// `metrics_path`, when set, receives periodic snapshots and the final
    /// snapshot plus summary.
    pub fn new(
        config: ClientConfig,
        selector: PeerSelector,
        metrics: Arc<MetricsRecorder>,
        metrics_path: Option<PathBuf>,
    ) -> Self {
        Self {
            config,
            selector,
            metrics,
            metrics_path,
            next_sequence: 1,
        }
    }

    pub fn metrics(&self) -> &Arc<MetricsRecorder> {
        &self.metrics
    }

    /// Runs until `shutdown` fires or `max_transactions` have been sent.
    ///
    /// The final snapshot is written on every exit path, including a panic
    /// unwinding out of the loop.
    pub async fn run(mut self, mut shutdown: Shutdown) {
        let _final_flush = FinalFlush {
            metrics: Arc::clone(&self.metrics),
            path: self.metrics_path.clone(),
        };

        info!(
            endorsers = self.config.endorsers.len(),
            max_transactions = ?self.config.max_transactions,
            "client starting"
        );

        loop {
            if shutdown.is_triggered() {
                info!("shutdown requested, stopping client");
                break;
            }
            if let Some(max) = self.config.max_transactions {
                if self.metrics.sent() >= max {
                    info!(sent = max, "all transactions sent");
                    break;
                }
            }

            let Some(endorser) = self.selector.choose(&self.config.endorsers).cloned() else {
                error!("no endorsers configured, stopping client");
                break;
            };

            let available = tokio::select! {
                up = self.wait_for_endorser(&endorser) => up,
                _ = shutdown.wait() => continue,
            };

            if !available {
                self.metrics.record_discovery_timeout();
                warn!(%endorser, "skipping endorser after discovery timeout");
                pause(self.config.skip_backoff, &mut shutdown).await;
                continue;
            }

            self.send_one(&endorser).await;

            let sent = self.metrics.sent();
            if self.config.snapshot_every > 0 && sent % self.config.snapshot_every == 0 {
                if let Some(path) = &self.metrics_path {
                    if let Err(e) = self.metrics.save(path) {
                        warn!(error = %e, "periodic metrics save failed");
                    }
                }
            }

            pause(self.config.send_interval, &mut shutdown).await;
        }

        self.metrics.mark_sending_complete();
    }

    /// Probes `endorser` every `probe_interval` until it accepts a
    /// connection or `discovery_timeout` elapses.
    pub async fn wait_for_endorser(&self, endorser: &PeerAddr) -> bool {
        let deadline = Instant::now() + self.config.discovery_timeout;
        loop {
            match probe(endorser, self.config.probe_connect_timeout).await {
                Ok(()) => return true,
                Err(e) => info!(%endorser, error = %e, "endorser not available yet, retrying"),
            }
            if Instant::now() + self.config.probe_interval > deadline {
                error!(
                    %endorser,
                    timeout_secs = self.config.discovery_timeout.as_secs_f64(),
                    "endorser did not become available in time"
                );
                return false;
            }
            sleep(self.config.probe_interval).await;
        }
    }

    /// Builds the next transaction and sends it to `endorser`.
    pub async fn send_one(&mut self, endorser: &PeerAddr) -> SendOutcome {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        let tx = Transaction::new(format!("{CLIENT_PAYLOAD_PREFIX}{sequence}_from_Client"));

        self.metrics.record_sent();
        let started = Instant::now();
        match request(endorser, &tx.encode()).await {
            Ok(Some(reply)) => {
                let latency = started.elapsed();
                self.metrics.record_round_trip(latency);
                info!(
                    %endorser,
                    sequence,
                    tx = tx.short_hash(),
                    latency_ms = latency.as_millis() as u64,
                    reply = %reply,
                    "transaction acknowledged"
                );
                SendOutcome::Acknowledged { reply, latency }
            }
            Ok(None) => {
                self.metrics.record_failed();
                warn!(%endorser, sequence, "no response from endorser");
                SendOutcome::NoResponse
            }
            Err(e) => {
                self.metrics.record_failed();
                error!(%endorser, sequence, error = %e, "failed to send transaction");
                SendOutcome::Failed
            }
        }
    }
}

/// Sleeps for `duration`, waking early on shutdown.
async fn pause(duration: Duration, shutdown: &mut Shutdown) {
    tokio::select! {
        _ = sleep(duration) => {}
        _ = shutdown.wait() => {}
    }
}

/// Writes the final snapshot when dropped.
struct FinalFlush {
    metrics: Arc<MetricsRecorder>,
    path: Option<PathBuf>,
}

impl Drop for FinalFlush {
    fn drop(&mut self) {
        let Some(path) = &self.path else { return };
        self.metrics.mark_sending_complete();
        match self.metrics.save_final(path) {
            Ok(snapshot) => info!(
                path = %path.display(),
                sent = self.metrics.sent(),
                processed = snapshot.transactions.processed,
                failed = snapshot.transactions.failed,
                "final client metrics saved"
            ),
            Err(e) => warn!(error = %e, "final client metrics save failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Role;
    use crate::network::transport::{read_frame, write_reply};
    use crate::shutdown;
    use tokio::net::TcpListener;

    fn fast_config(endorsers: Vec<PeerAddr>) -> ClientConfig {
        ClientConfig {
            endorsers,
            probe_interval: Duration::from_millis(20),
            discovery_timeout: Duration::from_millis(100),
            probe_connect_timeout: Duration::from_millis(50),
            skip_backoff: Duration::from_millis(10),
            send_interval: Duration::from_millis(1),
            snapshot_every: 0,
            max_transactions: None,
        }
    }

    async fn dead_addr() -> PeerAddr {
        let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
        PeerAddr::from(l.local_addr().unwrap())
    }

    #[tokio::test]
    async fn payloads_are_numbered_from_one() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = PeerAddr::from(listener.local_addr().unwrap());
        let server = tokio::spawn(async move {
            let mut frames = Vec::new();
            for _ in 0..2 {
                let (mut stream, _) = listener.accept().await.unwrap();
                let frame = read_frame(&mut stream).await.unwrap().unwrap();
                write_reply(&mut stream, "ok").await.unwrap();
                frames.push(String::from_utf8(frame).unwrap());
            }
            frames
        });

        let metrics = Arc::new(MetricsRecorder::new(Role::Client));
        let mut driver = ClientDriver::new(
            fast_config(vec![addr.clone()]),
            PeerSelector::seeded(1),
            Arc::clone(&metrics),
            None,
        );
        assert!(matches!(driver.send_one(&addr).await, SendOutcome::Acknowledged { .. }));
        assert!(matches!(driver.send_one(&addr).await, SendOutcome::Acknowledged { .. }));

        let frames = server.await.unwrap();
        let payloads: Vec<_> = frames
            .iter()
            .map(|f| Transaction::decode_str(f).unwrap().payload)
            .collect();
        assert_eq!(
            payloads,
            ["Transaction_1_from_Client", "Transaction_2_from_Client"]
        );
        assert_eq!(metrics.processed(), 2);
        assert_eq!(metrics.latency_count(), 2);
    }

    #[tokio::test]
    async fn unreachable_endorser_is_skipped() {
        let metrics = Arc::new(MetricsRecorder::new(Role::Client));
        let driver = ClientDriver::new(
            fast_config(vec![dead_addr().await]),
            PeerSelector::seeded(7),
            Arc::clone(&metrics),
            None,
        );
        let (trigger, handle) = shutdown::channel();
        let task = tokio::spawn(driver.run(handle));

        tokio::time::sleep(Duration::from_millis(400)).await;
        trigger.trigger();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("client stops on shutdown")
            .unwrap();

        let snap = metrics.snapshot();
        assert!(snap.client_metrics.unwrap().discovery_timeouts >= 1);
        assert_eq!(metrics.sent(), 0);
    }

    #[tokio::test]
    async fn stops_after_max_transactions_and_saves() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = PeerAddr::from(listener.local_addr().unwrap());
        tokio::spawn(async move {
            loop {
                let (mut stream, _) = listener.accept().await.unwrap();
                // Probes close without writing; frames get a reply.
                if let Ok(Some(_)) = read_frame(&mut stream).await {
                    let _ = write_reply(&mut stream, "ok").await;
                }
            }
        });

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client_metrics.json");
        let metrics = Arc::new(MetricsRecorder::new(Role::Client));
        let mut config = fast_config(vec![addr]);
        config.max_transactions = Some(3);
        let driver = ClientDriver::new(
            config,
            PeerSelector::seeded(3),
            Arc::clone(&metrics),
            Some(path.clone()),
        );

        driver.run(Shutdown::never()).await;

        assert_eq!(metrics.sent(), 3);
        assert_eq!(metrics.processed(), 3);
        let saved: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(saved["client_metrics"]["sent"], 3);
        assert!(saved["timing"]["sending_complete_seconds"].is_number());
        assert!(crate::metrics::summary_path(&path).exists());
    }
}

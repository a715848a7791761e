//! Thread-safe per-role metrics recorder.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use thiserror::Error;
use tracing::debug;

use super::snapshot::{
    ClientMetrics, CommitterMetrics, ForwardMetrics, GossipMetrics, LedgerMetrics,
    MetricsSnapshot, PerformanceMetrics, TimingMetrics, TransactionMetrics,
};
use super::stats;
use super::window::RollingWindow;
use crate::config::{Role, ROLLING_SAMPLE_PERIOD, ROLLING_WINDOW_CAPACITY};

/// Errors from persisting a snapshot.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// Writing or renaming the metrics file failed.
    #[error("failed to write metrics file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The snapshot could not be serialized.
    #[error("failed to serialize metrics snapshot: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    received: u64,
    processed: u64,
    failed: u64,
    committed: u64,
    duplicates: u64,
    gossip_sent: u64,
    gossip_received: u64,
    gossip_failed: u64,
    forwarded: u64,
    forward_failed: u64,
    sent: u64,
    discovery_timeouts: u64,
}

#[derive(Debug)]
struct Inner {
    counters: Counters,
    /// Round-trip (client), forward (endorser, orderer) or commit
    /// (committer) latencies, in seconds.
    latencies: Vec<f64>,
    window: RollingWindow,
    ledger_size: usize,
    sending_complete_at: Option<Instant>,
}

/// Counters, latency samples and rolling throughput for one role.
///
/// Shared by every connection handler in the process behind an `Arc`.
/// All mutation goes through one mutex; every operation is a few field
/// updates, so the lock is held only briefly. Counters never decrease.
pub struct MetricsRecorder {
    role: Role,
    started_at: DateTime<Utc>,
    started: Instant,
    inner: Mutex<Inner>,
}

impl fmt::Debug for MetricsRecorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("MetricsRecorder")
            .field("role", &self.role)
            .field("counters", &inner.counters)
            .finish()
    }
}

impl MetricsRecorder {
    /// Creates a recorder with the default 60-sample, one-second window.
    pub fn new(role: Role) -> Self {
        Self::with_window(role, ROLLING_WINDOW_CAPACITY, ROLLING_SAMPLE_PERIOD)
    }

    /// Creates a recorder with a custom rolling window.
    pub fn with_window(role: Role, capacity: usize, period: Duration) -> Self {
        let started = Instant::now();
        Self {
            role,
            started_at: Utc::now(),
            started,
            inner: Mutex::new(Inner {
                counters: Counters::default(),
                latencies: Vec::new(),
                window: RollingWindow::starting_at(capacity, period, started),
                ledger_size: 0,
                sending_complete_at: None,
            }),
        }
    }

    /// The role this recorder belongs to.
    pub fn role(&self) -> Role {
        self.role
    }

    // -- inbound accounting --------------------------------------------------

    /// A request arrived. Counted before decode.
    pub fn record_received(&self) {
        self.inner.lock().counters.received += 1;
    }

    /// A request was handled successfully.
    pub fn record_processed(&self) {
        let mut inner = self.inner.lock();
        inner.counters.processed += 1;
        inner.window.record_event(Instant::now());
    }

    /// A request was rejected or a round trip failed.
    pub fn record_failed(&self) {
        self.inner.lock().counters.failed += 1;
    }

    // -- committer -----------------------------------------------------------

    /// A transaction was committed for the first time.
    pub fn record_commit(&self, latency: Duration, ledger_size: usize) {
        let mut inner = self.inner.lock();
        inner.counters.committed += 1;
        inner.counters.processed += 1;
        inner.latencies.push(latency.as_secs_f64());
        inner.ledger_size = inner.ledger_size.max(ledger_size);
        inner.window.record_event(Instant::now());
    }

    /// A transaction was already in the ledger.
    pub fn record_duplicate(&self) {
        let mut inner = self.inner.lock();
        inner.counters.duplicates += 1;
        inner.counters.processed += 1;
        inner.window.record_event(Instant::now());
    }

    /// A gossip frame was written to a peer.
    pub fn record_gossip_sent(&self) {
        self.inner.lock().counters.gossip_sent += 1;
    }

    /// A gossip frame arrived on the gossip-facing port.
    pub fn record_gossip_received(&self) {
        self.inner.lock().counters.gossip_received += 1;
    }

    /// A gossip delivery attempt failed.
    pub fn record_gossip_failed(&self) {
        self.inner.lock().counters.gossip_failed += 1;
    }

    // -- endorser / orderer --------------------------------------------------

    /// The transaction reached the next hop.
    pub fn record_forwarded(&self, latency: Duration) {
        let mut inner = self.inner.lock();
        inner.counters.forwarded += 1;
        inner.latencies.push(latency.as_secs_f64());
    }

    /// The next hop was unreachable or did not answer.
    pub fn record_forward_failed(&self) {
        self.inner.lock().counters.forward_failed += 1;
    }

    // -- client --------------------------------------------------------------

    /// A transaction was built and is about to be sent. Also counts as
    /// received, so `received >= processed + failed` holds for the client.
    pub fn record_sent(&self) {
        let mut inner = self.inner.lock();
        inner.counters.sent += 1;
        inner.counters.received += 1;
    }

    /// A round trip completed.
    pub fn record_round_trip(&self, latency: Duration) {
        let mut inner = self.inner.lock();
        inner.counters.processed += 1;
        inner.latencies.push(latency.as_secs_f64());
        inner.window.record_event(Instant::now());
    }

    /// An endorser was skipped after the discovery timeout.
    pub fn record_discovery_timeout(&self) {
        self.inner.lock().counters.discovery_timeouts += 1;
    }

    /// The client stopped sending. Only the first call is kept.
    pub fn mark_sending_complete(&self) {
        let mut inner = self.inner.lock();
        if inner.sending_complete_at.is_none() {
            inner.sending_complete_at = Some(Instant::now());
        }
    }

    // -- reads ---------------------------------------------------------------

    pub fn received(&self) -> u64 {
        self.inner.lock().counters.received
    }

    pub fn processed(&self) -> u64 {
        self.inner.lock().counters.processed
    }

    pub fn failed(&self) -> u64 {
        self.inner.lock().counters.failed
    }

    pub fn committed(&self) -> u64 {
        self.inner.lock().counters.committed
    }

    pub fn duplicates(&self) -> u64 {
        self.inner.lock().counters.duplicates
    }

    pub fn sent(&self) -> u64 {
        self.inner.lock().counters.sent
    }

    /// Number of recorded latencies.
    pub fn latency_count(&self) -> usize {
        self.inner.lock().latencies.len()
    }

    /// Copies the current state into a snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let (counters, latencies, window, ledger_size, sending_complete_at) = {
            let inner = self.inner.lock();
            (
                inner.counters,
                inner.latencies.clone(),
                inner.window.clone(),
                inner.ledger_size,
                inner.sending_complete_at,
            )
        };

        let elapsed = self.started.elapsed().as_secs_f64();
        let attempts = counters.processed + counters.failed;
        let latency_mean = stats::mean(latencies.iter().copied());
        let latency_max = stats::max(latencies.iter().copied());

        let forward = || ForwardMetrics {
            forwarded: counters.forwarded,
            forward_failed: counters.forward_failed,
            forward_latency_mean: latency_mean,
            forward_latency_max: latency_max,
        };

        let is = |role| self.role == role;

        MetricsSnapshot {
            role: self.role,
            timing: TimingMetrics {
                start_time: self.started_at,
                snapshot_time: Utc::now(),
                elapsed_seconds: elapsed,
                sending_complete_seconds: sending_complete_at
                    .map(|at| at.duration_since(self.started).as_secs_f64()),
            },
            transactions: TransactionMetrics {
                received: counters.received,
                processed: counters.processed,
                failed: counters.failed,
                committed: counters.committed,
                duplicates: counters.duplicates,
                success_rate: stats::ratio(counters.processed, attempts),
                error_rate: stats::ratio(counters.failed, attempts),
            },
            performance: PerformanceMetrics {
                latency_mean,
                latency_max,
                latency_stddev: stats::std_dev(latencies.iter().copied()),
                latency_samples: latencies.len(),
                latencies,
                throughput_mean: window.mean(),
                throughput_stddev: window.std_dev(),
                throughput_window: window.samples(),
            },
            gossip: is(Role::Committer).then(|| GossipMetrics {
                sent: counters.gossip_sent,
                received: counters.gossip_received,
                failed: counters.gossip_failed,
            }),
            endorser_metrics: is(Role::Endorser).then(forward),
            orderer_metrics: is(Role::Orderer).then(forward),
            committer_metrics: is(Role::Committer).then(|| CommitterMetrics {
                commit_latency_mean: latency_mean,
                commit_latency_max: latency_max,
            }),
            client_metrics: is(Role::Client).then(|| ClientMetrics {
                sent: counters.sent,
                discovery_timeouts: counters.discovery_timeouts,
                send_rate: if elapsed > 0.0 {
                    counters.sent as f64 / elapsed
                } else {
                    0.0
                },
            }),
            ledger: is(Role::Committer).then_some(LedgerMetrics { size: ledger_size }),
        }
    }

    /// Writes a snapshot to `path` atomically (temp file, then rename).
    pub fn save(&self, path: &Path) -> Result<MetricsSnapshot, MetricsError> {
        let snapshot = self.snapshot();
        let body = serde_json::to_vec_pretty(&snapshot)?;
        write_atomic(path, &body)?;
        debug!(
            role = %self.role,
            path = %path.display(),
            processed = snapshot.transactions.processed,
            "metrics snapshot saved"
        );
        Ok(snapshot)
    }

    /// Final save at shutdown: the JSON snapshot plus a plain-text summary
    /// at `<path>.summary.txt`.
    pub fn save_final(&self, path: &Path) -> Result<MetricsSnapshot, MetricsError> {
        let snapshot = self.save(path)?;
        let summary_path = summary_path(path);
        write_atomic(&summary_path, snapshot.summary_text().as_bytes())?;
        Ok(snapshot)
    }
}

/// Where the plain-text summary for a metrics file goes.
pub fn summary_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".summary.txt");
    PathBuf::from(name)
}

fn write_atomic(path: &Path, body: &[u8]) -> Result<(), MetricsError> {
    let io_err = |source| MetricsError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    std::fs::write(&tmp, body).map_err(io_err)?;
    std::fs::rename(&tmp, path).map_err(io_err)
}

//! The persisted metrics file format.
//!
//! An offline aggregator reads these files, so field names and nesting are
//! part of the external interface. Add fields, never rename them.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::Role;

/// Point-in-time copy of a role's metrics.
///
/// Built under the recorder lock and serialized without it, so live
/// counters keep moving while the snapshot is written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Role that produced the snapshot.
    pub role: Role,
    /// Wall-clock timing.
    pub timing: TimingMetrics,
    /// Transaction counters and rates.
    pub transactions: TransactionMetrics,
    /// Latency and throughput statistics.
    pub performance: PerformanceMetrics,
    /// Gossip counters (committer only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gossip: Option<GossipMetrics>,
    /// Forwarding statistics (endorser only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endorser_metrics: Option<ForwardMetrics>,
    /// Forwarding statistics (orderer only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orderer_metrics: Option<ForwardMetrics>,
    /// Commit statistics (committer only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub committer_metrics: Option<CommitterMetrics>,
    /// Send statistics (client only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_metrics: Option<ClientMetrics>,
    /// Ledger size (committer only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ledger: Option<LedgerMetrics>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingMetrics {
    pub start_time: DateTime<Utc>,
    pub snapshot_time: DateTime<Utc>,
    pub elapsed_seconds: f64,
    /// Seconds from start until the client stopped sending.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sending_complete_seconds: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionMetrics {
    pub received: u64,
    pub processed: u64,
    pub failed: u64,
    pub committed: u64,
    pub duplicates: u64,
    pub success_rate: f64,
    pub error_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub latency_mean: f64,
    pub latency_max: f64,
    pub latency_stddev: f64,
    pub latency_samples: usize,
    /// Every observed latency in seconds, in arrival order.
    pub latencies: Vec<f64>,
    pub throughput_mean: f64,
    pub throughput_stddev: f64,
    /// The rolling window at snapshot time, oldest first.
    pub throughput_window: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GossipMetrics {
    pub sent: u64,
    pub received: u64,
    pub failed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForwardMetrics {
    pub forwarded: u64,
    pub forward_failed: u64,
    pub forward_latency_mean: f64,
    pub forward_latency_max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitterMetrics {
    pub commit_latency_mean: f64,
    pub commit_latency_max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientMetrics {
    pub sent: u64,
    pub discovery_timeouts: u64,
    /// Sent transactions per second over the whole run.
    pub send_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerMetrics {
    pub size: usize,
}

impl MetricsSnapshot {
    /// Human-readable run summary, written next to the final snapshot.
    pub fn summary_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "=== ledgerflow {} summary ===", self.role);
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "Duration: {:.2} seconds",
            self.timing.elapsed_seconds
        );
        let _ = writeln!(out, "Transactions received: {}", self.transactions.received);
        let _ = writeln!(out, "Transactions processed: {}", self.transactions.processed);
        let _ = writeln!(out, "Transactions failed: {}", self.transactions.failed);
        if self.role == Role::Committer {
            let _ = writeln!(out, "Transactions committed: {}", self.transactions.committed);
            let _ = writeln!(out, "Duplicates: {}", self.transactions.duplicates);
        }
        let _ = writeln!(
            out,
            "Error rate: {:.2}%",
            self.transactions.error_rate * 100.0
        );
        let _ = writeln!(
            out,
            "Average throughput: {:.2} tps",
            self.performance.throughput_mean
        );
        let _ = writeln!(
            out,
            "Average latency: {:.3} seconds",
            self.performance.latency_mean
        );
        let _ = writeln!(
            out,
            "Maximum latency: {:.3} seconds",
            self.performance.latency_max
        );
        if let Some(ledger) = &self.ledger {
            let _ = writeln!(out, "Ledger size: {}", ledger.size);
        }
        out
    }
}

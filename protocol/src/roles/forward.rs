//! Next-hop forwarding shared by the endorser and the orderer.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, warn};

use crate::config::PeerAddr;
use crate::metrics::MetricsRecorder;
use crate::network::transport::request;
use crate::network::PeerSelector;
use crate::transaction::Transaction;

/// What happened to a forward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardOutcome {
    /// The next hop answered.
    Forwarded {
        peer: PeerAddr,
        latency: Duration,
        reply: String,
    },
    /// The next hop was unreachable, reset the connection, or closed
    /// without replying.
    Failed { peer: PeerAddr },
    /// No next hop is configured.
    NoPeers,
}

/// Sends a transaction to one randomly chosen next hop over a fresh
/// connection, recording success, failure and latency.
#[derive(Debug)]
pub struct Forwarder {
    next_hop: &'static str,
    peers: Vec<PeerAddr>,
    selector: PeerSelector,
    metrics: Arc<MetricsRecorder>,
}

impl Forwarder {
    /// `next_hop` names the downstream role in log lines.
    pub fn new(
        next_hop: &'static str,
        peers: Vec<PeerAddr>,
        selector: PeerSelector,
        metrics: Arc<MetricsRecorder>,
    ) -> Self {
        Self {
            next_hop,
            peers,
            selector,
            metrics,
        }
    }

    pub fn peers(&self) -> &[PeerAddr] {
        &self.peers
    }

    /// Forwards `tx`. Never fails: every outcome is logged and metered.
    pub async fn forward(&self, tx: &Transaction) -> ForwardOutcome {
        let Some(peer) = self.selector.choose(&self.peers).cloned() else {
            self.metrics.record_forward_failed();
            warn!(next_hop = self.next_hop, "no next hop configured, dropping transaction");
            return ForwardOutcome::NoPeers;
        };

        let started = Instant::now();
        match request(&peer, &tx.encode()).await {
            Ok(Some(reply)) => {
                let latency = started.elapsed();
                self.metrics.record_forwarded(latency);
                debug!(
                    next_hop = self.next_hop,
                    %peer,
                    tx = tx.short_hash(),
                    latency_ms = latency.as_millis() as u64,
                    reply = %reply,
                    "forwarded transaction"
                );
                ForwardOutcome::Forwarded {
                    peer,
                    latency,
                    reply,
                }
            }
            Ok(None) => {
                self.metrics.record_forward_failed();
                warn!(
                    next_hop = self.next_hop,
                    %peer,
                    tx = tx.short_hash(),
                    "no response from next hop"
                );
                ForwardOutcome::Failed { peer }
            }
            Err(e) => {
                self.metrics.record_forward_failed();
                error!(
                    next_hop = self.next_hop,
                    tx = tx.short_hash(),
                    error = %e,
                    "failed to forward transaction"
                );
                ForwardOutcome::Failed { peer }
            }
        }
    }
}

//! Endorser: the client-facing first hop.
//!
//! Acknowledges every well-formed proposal, then forwards it to one orderer
//! picked at random. The acknowledgement goes out before forwarding starts,
//! so the client sees success even when the orderer is down. That is the
//! intended behavior: endorsement and ordering are independent steps.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use super::forward::{ForwardOutcome, Forwarder};
use crate::config::ForwardConfig;
use crate::metrics::MetricsRecorder;
use crate::network::{PeerSelector, TransactionHandler};
use crate::transaction::{reply, Transaction};

#[derive(Debug)]
pub struct EndorserService {
    metrics: Arc<MetricsRecorder>,
    forwarder: Forwarder,
}

impl EndorserService {
    /// `config.peers` are the orderers' endorser-facing addresses.
    pub fn new(
        config: ForwardConfig,
        selector: PeerSelector,
        metrics: Arc<MetricsRecorder>,
    ) -> Self {
        Self {
            forwarder: Forwarder::new("orderer", config.peers, selector, Arc::clone(&metrics)),
            metrics,
        }
    }

    /// Forwards directly, bypassing the inbound connection. Used by tests.
    pub async fn forward(&self, tx: &Transaction) -> ForwardOutcome {
        self.forwarder.forward(tx).await
    }
}

#[async_trait]
impl TransactionHandler for EndorserService {
    fn metrics(&self) -> &MetricsRecorder {
        &self.metrics
    }

    async fn on_transaction(&self, tx: &Transaction, peer: SocketAddr) -> &'static str {
        self.metrics.record_processed();
        info!(client = %peer, tx = tx.short_hash(), "endorsed transaction");
        reply::ENDORSED
    }

    async fn after_reply(&self, tx: Transaction) {
        self.forwarder.forward(&tx).await;
    }
}

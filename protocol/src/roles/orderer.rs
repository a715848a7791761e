//! Orderer: pass-through second hop between endorsement and commit.
//!
//! No sequencing happens here. The orderer acknowledges, then forwards to
//! one committer chosen at random.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use super::forward::Forwarder;
use crate::config::ForwardConfig;
use crate::metrics::MetricsRecorder;
use crate::network::{PeerSelector, TransactionHandler};
use crate::transaction::{reply, Transaction};

#[derive(Debug)]
pub struct OrdererService {
    metrics: Arc<MetricsRecorder>,
    forwarder: Forwarder,
}

impl OrdererService {
    /// `config.peers` are the committers' orderer-facing addresses.
    pub fn new(
        config: ForwardConfig,
        selector: PeerSelector,
        metrics: Arc<MetricsRecorder>,
    ) -> Self {
        Self {
            forwarder: Forwarder::new("committer", config.peers, selector, Arc::clone(&metrics)),
            metrics,
        }
    }
}

#[async_trait]
impl TransactionHandler for OrdererService {
    fn metrics(&self) -> &MetricsRecorder {
        &self.metrics
    }

    async fn on_transaction(&self, tx: &Transaction, peer: SocketAddr) -> &'static str {
        self.metrics.record_processed();
        info!(endorser = %peer, tx = tx.short_hash(), "ordered transaction");
        reply::ORDERED
    }

    async fn after_reply(&self, tx: Transaction) {
        self.forwarder.forward(&tx).await;
    }
}

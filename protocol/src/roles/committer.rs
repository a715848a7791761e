//! Committer: ledger owner and gossip participant.
//!
//! A committer listens on two ports. The orderer-facing port takes ordered
//! transactions; the gossip port takes transactions replicated by peer
//! committers. Both feed the same commit routine, so whichever copy of a
//! transaction arrives first wins and every later copy is a duplicate.
//!
//! ```text
//!   orderer ──► OrdererIngress ─┐
//!                               ├─► CommitterService::commit ─► Ledger
//!   peers   ──► GossipIngress ──┘                     │
//!                                                     └─► GossipFanout (first commit only)
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::CommitterConfig;
use crate::metrics::MetricsRecorder;
use crate::network::{
    FrameService, GossipBatch, GossipFanout, RoleServer, ServerError, TransactionHandler,
};
use crate::shutdown::Shutdown;
use crate::storage::{CommitStatus, Ledger};
use crate::transaction::{reply, Transaction};

/// Result of one pass through the commit routine.
#[derive(Debug)]
pub enum CommitOutcome {
    /// First sighting. The transaction is on the ledger and gossip is in
    /// flight.
    Committed {
        ledger_size: usize,
        gossip: GossipBatch,
    },
    /// Already on the ledger. Nothing was written or gossiped.
    Duplicate,
}

impl CommitOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, CommitOutcome::Committed { .. })
    }
}

/// Shared state behind both committer listeners.
#[derive(Debug)]
pub struct CommitterService {
    ledger: Arc<Ledger>,
    metrics: Arc<MetricsRecorder>,
    fanout: GossipFanout,
    commit_delay: Duration,
}

impl CommitterService {
    pub fn new(
        config: CommitterConfig,
        ledger: Arc<Ledger>,
        metrics: Arc<MetricsRecorder>,
    ) -> Self {
        let mut fanout = GossipFanout::new(
            config.gossip_peers,
            config.self_addr.as_ref(),
            Arc::clone(&metrics),
        );
        if let Some(local) = config.local_gossip {
            fanout = fanout.excluding_local(local);
        }
        Self {
            ledger,
            metrics,
            fanout,
            commit_delay: config.commit_delay,
        }
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    pub fn metrics(&self) -> &Arc<MetricsRecorder> {
        &self.metrics
    }

    pub fn gossip_peers(&self) -> &[crate::config::PeerAddr] {
        self.fanout.peers()
    }

    /// Commits `tx` unless its hash is already on the ledger.
    ///
    /// The simulated write cost is paid before the membership check, so a
    /// duplicate costs the same as a commit. Commit latency covers the
    /// whole routine, delay included.
    pub async fn commit(&self, tx: &Transaction) -> CommitOutcome {
        let started = Instant::now();
        if !self.commit_delay.is_zero() {
            tokio::time::sleep(self.commit_delay).await;
        }

        match self.ledger.commit(tx) {
            CommitStatus::Committed { ledger_size } => {
                self.metrics.record_commit(started.elapsed(), ledger_size);
                info!(tx = tx.short_hash(), ledger_size, "committed transaction");
                let gossip = self.fanout.fanout(tx);
                CommitOutcome::Committed {
                    ledger_size,
                    gossip,
                }
            }
            CommitStatus::Duplicate => {
                self.metrics.record_duplicate();
                debug!(tx = tx.short_hash(), "transaction already committed");
                CommitOutcome::Duplicate
            }
        }
    }
}

/// Handles transactions arriving from orderers.
#[derive(Debug, Clone)]
pub struct OrdererIngress(Arc<CommitterService>);

impl OrdererIngress {
    pub fn new(service: Arc<CommitterService>) -> Self {
        Self(service)
    }
}

#[async_trait]
impl TransactionHandler for OrdererIngress {
    fn metrics(&self) -> &MetricsRecorder {
        &self.0.metrics
    }

    async fn on_transaction(&self, tx: &Transaction, _peer: SocketAddr) -> &'static str {
        if self.0.commit(tx).await.is_committed() {
            reply::COMMITTED
        } else {
            reply::ALREADY_COMMITTED
        }
    }
}

/// Handles transactions replicated by peer committers.
#[derive(Debug, Clone)]
pub struct GossipIngress(Arc<CommitterService>);

impl GossipIngress {
    pub fn new(service: Arc<CommitterService>) -> Self {
        Self(service)
    }
}

#[async_trait]
impl TransactionHandler for GossipIngress {
    fn metrics(&self) -> &MetricsRecorder {
        &self.0.metrics
    }

    async fn on_transaction(&self, tx: &Transaction, peer: SocketAddr) -> &'static str {
        self.0.metrics.record_gossip_received();
        debug!(%peer, tx = tx.short_hash(), "gossip received");
        self.0.commit(tx).await;
        reply::GOSSIP_RECEIVED
    }
}

/// Runs both committer listeners until shutdown or until either one fails.
///
/// A failure on one listener stops the other: a committer that cannot take
/// gossip would silently diverge.
pub async fn serve_committer(
    service: Arc<CommitterService>,
    orderer_server: RoleServer,
    gossip_server: RoleServer,
    shutdown: Shutdown,
) -> Result<(), ServerError> {
    let orderer_side = Arc::new(FrameService::new(Arc::new(OrdererIngress::new(Arc::clone(
        &service,
    )))));
    let gossip_side = Arc::new(FrameService::new(Arc::new(GossipIngress::new(service))));

    tokio::try_join!(
        orderer_server.serve(orderer_side, shutdown.clone()),
        gossip_server.serve(gossip_side, shutdown),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PeerAddr, Role};
    use crate::network::transport::{read_frame, write_reply};
    use tokio::net::TcpListener;

    fn service(gossip_peers: Vec<PeerAddr>) -> CommitterService {
        let config = CommitterConfig {
            gossip_peers,
            commit_delay: Duration::ZERO,
            ..CommitterConfig::default()
        };
        CommitterService::new(
            config,
            Arc::new(Ledger::new()),
            Arc::new(MetricsRecorder::new(Role::Committer)),
        )
    }

    #[tokio::test]
    async fn second_commit_is_a_duplicate() {
        let svc = service(vec![]);
        let tx = Transaction::from_parts("abc123", "p");

        let first = svc.commit(&tx).await;
        assert!(matches!(first, CommitOutcome::Committed { ledger_size: 1, .. }));
        assert!(!svc.commit(&tx).await.is_committed());

        assert_eq!(svc.ledger().len(), 1);
        assert_eq!(svc.metrics().committed(), 1);
        assert_eq!(svc.metrics().duplicates(), 1);
        assert_eq!(svc.metrics().processed(), 2);
    }

    #[tokio::test]
    async fn only_first_commit_gossips() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let peer = PeerAddr::from(listener.local_addr().unwrap());
        let sink = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let frame = read_frame(&mut stream).await.unwrap().unwrap();
            write_reply(&mut stream, reply::GOSSIP_RECEIVED).await.unwrap();
            String::from_utf8(frame).unwrap()
        });

        let svc = service(vec![peer]);
        let tx = Transaction::from_parts("abc123", "p");

        let CommitOutcome::Committed { gossip, .. } = svc.commit(&tx).await else {
            panic!("expected a first commit");
        };
        assert_eq!(gossip.len(), 1);
        gossip.settle().await;
        assert_eq!(sink.await.unwrap(), "abc123:p");

        assert!(matches!(svc.commit(&tx).await, CommitOutcome::Duplicate));
        assert_eq!(svc.metrics().snapshot().gossip.unwrap().sent, 1);
    }

    #[tokio::test]
    async fn own_listener_in_peer_list_gets_no_gossip() {
        let own = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let local = own.local_addr().unwrap();
        let config = CommitterConfig {
            gossip_peers: vec![PeerAddr::from(local)],
            local_gossip: Some(local),
            commit_delay: Duration::ZERO,
            ..CommitterConfig::default()
        };
        let svc = CommitterService::new(
            config,
            Arc::new(Ledger::new()),
            Arc::new(MetricsRecorder::new(Role::Committer)),
        );
        assert!(svc.gossip_peers().is_empty());

        let tx = Transaction::new("t");
        let CommitOutcome::Committed { gossip, .. } = svc.commit(&tx).await else {
            panic!("expected a first commit");
        };
        assert!(gossip.is_empty());
    }

    #[tokio::test]
    async fn commit_latency_includes_delay() {
        let config = CommitterConfig {
            commit_delay: Duration::from_millis(20),
            ..CommitterConfig::default()
        };
        let svc = CommitterService::new(
            config,
            Arc::new(Ledger::new()),
            Arc::new(MetricsRecorder::new(Role::Committer)),
        );
        svc.commit(&Transaction::new("slow")).await;

        let perf = svc.metrics().snapshot().performance;
        assert_eq!(perf.latency_samples, 1);
        assert!(perf.latency_max >= 0.02);
    }

    #[tokio::test]
    async fn ingress_replies() {
        let svc = Arc::new(service(vec![]));
        let orderer_side = OrdererIngress::new(Arc::clone(&svc));
        let gossip_side = GossipIngress::new(Arc::clone(&svc));
        let peer: SocketAddr = "127.0.0.1:9".parse().unwrap();
        let tx = Transaction::new("t");

        assert_eq!(orderer_side.on_transaction(&tx, peer).await, reply::COMMITTED);
        assert_eq!(orderer_side.on_transaction(&tx, peer).await, reply::ALREADY_COMMITTED);
        assert_eq!(gossip_side.on_transaction(&tx, peer).await, reply::GOSSIP_RECEIVED);

        let snap = svc.metrics().snapshot();
        assert_eq!(snap.transactions.duplicates, 2);
        assert_eq!(snap.gossip.unwrap().received, 1);
    }
}

//! # Gossip Fan-out
//!
//! Flooding replication between committers. When a committer commits a
//! transaction for the first time, it pushes the frame to every configured
//! peer committer's gossip port, one independent task per peer.
//!
//! ## Delivery
//!
//! Each attempt opens a fresh connection, writes the frame and reads the
//! acknowledgement if there is one. Attempts are never retried and their
//! results are never aggregated: at-most-once per attempt, with overall
//! at-least-once delivery coming from the other peers' own fan-out.
//!
//! ## Amplification
//!
//! A committer re-floods every transaction it commits, including ones that
//! arrived by gossip, to all of its peers. The ledger's membership check
//! stops reprocessing, not resending, so a fully connected set of N
//! committers exchanges O(N²) frames per transaction. There is no TTL.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use futures::future::join_all;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::transport::request;
use crate::config::PeerAddr;
use crate::metrics::MetricsRecorder;
use crate::transaction::Transaction;

/// Result of one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The frame was written to the peer.
    Delivered(PeerAddr),
    /// Connecting or writing failed.
    Failed(PeerAddr),
}

/// The in-flight attempts of one fan-out.
///
/// Dropping the batch detaches the tasks; they run to completion on their
/// own. Tests call [`GossipBatch::settle`] to wait for them.
#[derive(Debug)]
pub struct GossipBatch {
    handles: Vec<JoinHandle<DeliveryOutcome>>,
}

impl GossipBatch {
    /// Number of attempts launched.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Returns `true` if there was nobody to gossip to.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Waits for every attempt. Panicked or cancelled tasks are skipped.
    pub async fn settle(self) -> Vec<DeliveryOutcome> {
        join_all(self.handles)
            .await
            .into_iter()
            .filter_map(Result::ok)
            .collect()
    }
}

/// Pushes committed transactions to peer committers.
#[derive(Debug)]
pub struct GossipFanout {
    peers: Vec<PeerAddr>,
    metrics: Arc<MetricsRecorder>,
}

impl GossipFanout {
    /// Builds the fan-out target list: `peers` minus `self_addr`, with
    /// duplicate entries collapsed.
    pub fn new(
        peers: Vec<PeerAddr>,
        self_addr: Option<&PeerAddr>,
        metrics: Arc<MetricsRecorder>,
    ) -> Self {
        let mut targets: Vec<PeerAddr> = Vec::with_capacity(peers.len());
        for peer in peers {
            if Some(&peer) == self_addr || targets.contains(&peer) {
                continue;
            }
            targets.push(peer);
        }
        Self {
            peers: targets,
            metrics,
        }
    }

    /// Drops peers that point back at our own gossip listener.
    ///
    /// A peer matches when it uses `local`'s port and names `local`'s IP, a
    /// loopback IP or `localhost`. A routable IP of this host is not
    /// recognized when `local` is an unspecified address.
    pub fn excluding_local(mut self, local: SocketAddr) -> Self {
        self.peers.retain(|peer| {
            let is_local = refers_to(peer, local);
            if is_local {
                debug!(%peer, %local, "dropping own gossip address from peers");
            }
            !is_local
        });
        self
    }

    /// The peers every fan-out targets.
    pub fn peers(&self) -> &[PeerAddr] {
        &self.peers
    }

    /// Launches one delivery attempt per peer and returns immediately.
    pub fn fanout(&self, tx: &Transaction) -> GossipBatch {
        let frame: Arc<str> = Arc::from(tx.encode());
        let short = tx.short_hash().to_string();

        let handles = self
            .peers
            .iter()
            .cloned()
            .map(|peer| {
                let frame = Arc::clone(&frame);
                let metrics = Arc::clone(&self.metrics);
                let short = short.clone();
                tokio::spawn(async move {
                    match request(&peer, &frame).await {
                        Ok(ack) => {
                            metrics.record_gossip_sent();
                            debug!(%peer, tx = %short, ack = ?ack, "gossip delivered");
                            DeliveryOutcome::Delivered(peer)
                        }
                        Err(e) => {
                            metrics.record_gossip_failed();
                            warn!(%peer, tx = %short, error = %e, "gossip delivery failed");
                            DeliveryOutcome::Failed(peer)
                        }
                    }
                })
            })
            .collect();

        GossipBatch { handles }
    }
}

fn refers_to(peer: &PeerAddr, local: SocketAddr) -> bool {
    if peer.port != local.port() {
        return false;
    }
    if peer.host.eq_ignore_ascii_case("localhost") {
        return true;
    }
    match peer.host.parse::<IpAddr>() {
        Ok(ip) if ip == local.ip() => true,
        Ok(ip) => ip.is_loopback() && (local.ip().is_loopback() || local.ip().is_unspecified()),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Role;
    use crate::network::transport::{read_frame, write_reply};
    use tokio::net::TcpListener;

    fn metrics() -> Arc<MetricsRecorder> {
        Arc::new(MetricsRecorder::new(Role::Committer))
    }

    /// Accepts `n` gossip frames and returns them.
    async fn sink(n: usize) -> (PeerAddr, JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = PeerAddr::from(listener.local_addr().unwrap());
        let task = tokio::spawn(async move {
            let mut frames = Vec::new();
            for _ in 0..n {
                let (mut stream, _) = listener.accept().await.unwrap();
                let frame = read_frame(&mut stream).await.unwrap().unwrap();
                frames.push(String::from_utf8(frame).unwrap());
                write_reply(&mut stream, "Gossip received").await.unwrap();
            }
            frames
        });
        (addr, task)
    }

    #[test]
    fn self_and_duplicates_are_excluded() {
        let me = PeerAddr::new("10.0.2.2", 7053);
        let other = PeerAddr::new("10.0.3.2", 7053);
        let fanout = GossipFanout::new(
            vec![me.clone(), other.clone(), other.clone()],
            Some(&me),
            metrics(),
        );
        assert_eq!(fanout.peers(), &[other]);
    }

    #[test]
    fn own_listener_is_excluded_without_self_addr() {
        let local: SocketAddr = "0.0.0.0:7053".parse().unwrap();
        let other = PeerAddr::new("10.0.3.2", 7053);
        let fanout = GossipFanout::new(
            vec![
                PeerAddr::new("127.0.0.1", 7053),
                PeerAddr::new("localhost", 7053),
                PeerAddr::new("127.0.0.1", 9053),
                other.clone(),
            ],
            None,
            metrics(),
        )
        .excluding_local(local);
        assert_eq!(fanout.peers(), &[PeerAddr::new("127.0.0.1", 9053), other]);
    }

    #[test]
    fn bound_ip_is_excluded() {
        let local: SocketAddr = "10.0.2.2:7053".parse().unwrap();
        let other = PeerAddr::new("10.0.3.2", 7053);
        let fanout = GossipFanout::new(
            vec![PeerAddr::new("10.0.2.2", 7053), other.clone()],
            None,
            metrics(),
        )
        .excluding_local(local);
        assert_eq!(fanout.peers(), &[other]);
    }

    #[tokio::test]
    async fn delivers_to_every_peer() {
        let (a, a_task) = sink(1).await;
        let (b, b_task) = sink(1).await;
        let m = metrics();
        let fanout = GossipFanout::new(vec![a, b], None, Arc::clone(&m));

        let tx = Transaction::from_parts("abc123", "p");
        let outcomes = fanout.fanout(&tx).settle().await;

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes
            .iter()
            .all(|o| matches!(o, DeliveryOutcome::Delivered(_))));
        assert_eq!(a_task.await.unwrap(), vec!["abc123:p".to_string()]);
        assert_eq!(b_task.await.unwrap(), vec!["abc123:p".to_string()]);
        assert_eq!(m.snapshot().gossip.unwrap().sent, 2);
    }

    #[tokio::test]
    async fn unreachable_peer_fails_without_affecting_others() {
        let (good, good_task) = sink(1).await;
        let dead = {
            let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
            PeerAddr::from(l.local_addr().unwrap())
        };
        let m = metrics();
        let fanout = GossipFanout::new(vec![dead.clone(), good.clone()], None, Arc::clone(&m));

        let outcomes = fanout.fanout(&Transaction::new("x")).settle().await;

        assert!(outcomes.contains(&DeliveryOutcome::Failed(dead)));
        assert!(outcomes.contains(&DeliveryOutcome::Delivered(good)));
        good_task.await.unwrap();
        let gossip = m.snapshot().gossip.unwrap();
        assert_eq!(gossip.sent, 1);
        assert_eq!(gossip.failed, 1);
    }

    #[tokio::test]
    async fn no_peers_means_empty_batch() {
        let fanout = GossipFanout::new(vec![], None, metrics());
        let batch = fanout.fanout(&Transaction::new("x"));
        assert!(batch.is_empty());
        assert!(batch.settle().await.is_empty());
    }
}

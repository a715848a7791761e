//! The accept loop shared by every listening role.
//!
//! [`RoleServer`] owns a bound listener and spawns one task per accepted
//! connection. Tasks are independent and unbounded in number. The loop ends
//! only on shutdown (clean) or when `accept` itself fails (fatal: the
//! listening socket is broken and there is nothing to retry).
//!
//! [`FrameService`] adapts a [`TransactionHandler`] into a
//! [`ConnectionHandler`]: it reads one frame, counts it, decodes it, rejects
//! malformed frames, writes the role's reply, closes the connection, and
//! only then runs the role's post-reply work (forwarding).

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tracing::{debug, error, info, warn, Instrument};

use super::transport::{read_frame, write_reply};
use crate::metrics::MetricsRecorder;
use crate::shutdown::Shutdown;
use crate::transaction::{reply, Transaction};

/// Listener-level failures. These end the service.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listening socket could not be bound.
    #[error("failed to bind {name} listener on {addr}: {source}")]
    Bind {
        name: &'static str,
        addr: String,
        #[source]
        source: io::Error,
    },

    /// `accept` failed; the listener is unusable.
    #[error("{name} accept loop failed: {source}")]
    Accept {
        name: &'static str,
        #[source]
        source: io::Error,
    },
}

/// Handles one accepted connection from start to close.
#[async_trait]
pub trait ConnectionHandler: Send + Sync + 'static {
    async fn handle(&self, stream: TcpStream, peer: SocketAddr);
}

/// Role logic for a decoded transaction.
#[async_trait]
pub trait TransactionHandler: Send + Sync + 'static {
    /// Metrics shared by every connection of this role.
    fn metrics(&self) -> &MetricsRecorder;

    /// Processes a decoded transaction and returns the reply literal.
    async fn on_transaction(&self, tx: &Transaction, peer: SocketAddr) -> &'static str;

    /// Runs after the reply is written and the inbound connection closed.
    async fn after_reply(&self, _tx: Transaction) {}
}

/// Wraps a [`TransactionHandler`] with the one-frame request protocol.
pub struct FrameService<H> {
    inner: Arc<H>,
}

impl<H> FrameService<H> {
    pub fn new(inner: Arc<H>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<H: TransactionHandler> ConnectionHandler for FrameService<H> {
    async fn handle(&self, mut stream: TcpStream, peer: SocketAddr) {
        let frame = match read_frame(&mut stream).await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                // Availability probes connect and close without sending.
                debug!(%peer, "connection closed without a request");
                return;
            }
            Err(e) => {
                warn!(%peer, error = %e, "failed to read request");
                return;
            }
        };

        let metrics = self.inner.metrics();
        metrics.record_received();

        let tx = match Transaction::decode(&frame) {
            Ok(tx) => tx,
            Err(e) => {
                metrics.record_failed();
                warn!(%peer, error = %e, "rejecting malformed transaction");
                if let Err(e) = write_reply(&mut stream, reply::INVALID_FORMAT).await {
                    debug!(%peer, error = %e, "failed to send rejection");
                }
                return;
            }
        };

        debug!(%peer, tx = tx.short_hash(), "received transaction");
        let reply = self.inner.on_transaction(&tx, peer).await;
        if let Err(e) = write_reply(&mut stream, reply).await {
            debug!(%peer, error = %e, "failed to send reply");
        }
        drop(stream);

        self.inner.after_reply(tx).await;
    }
}

/// A bound listener for one role.
#[derive(Debug)]
pub struct RoleServer {
    name: &'static str,
    listener: TcpListener,
}

impl RoleServer {
    /// Binds the listener. `name` labels log lines and errors.
    pub async fn bind<A>(name: &'static str, addr: A) -> Result<Self, ServerError>
    where
        A: ToSocketAddrs + std::fmt::Display,
    {
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                name,
                addr: addr.to_string(),
                source,
            })?;
        Ok(Self { name, listener })
    }

    /// The address actually bound (useful with port 0).
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections until `shutdown` fires or `accept` fails.
    ///
    /// Each connection runs on its own task; a slow or hung peer stalls only
    /// that task, never the loop.
    pub async fn serve<C: ConnectionHandler>(
        self,
        handler: Arc<C>,
        mut shutdown: Shutdown,
    ) -> Result<(), ServerError> {
        let name = self.name;
        match self.listener.local_addr() {
            Ok(addr) => info!(service = name, %addr, "listening"),
            Err(e) => warn!(service = name, error = %e, "listening on unknown address"),
        }

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            debug!(service = name, %peer, "accepted connection");
                            let handler = Arc::clone(&handler);
                            tokio::spawn(
                                async move { handler.handle(stream, peer).await }
                                    .in_current_span(),
                            );
                        }
                        Err(source) => {
                            error!(
                                service = name,
                                error = %source,
                                "accept failed, stopping service"
                            );
                            return Err(ServerError::Accept { name, source });
                        }
                    }
                }
                _ = shutdown.wait() => {
                    info!(service = name, "shutting down listener");
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PeerAddr, Role};
    use crate::network::transport::request;
    use crate::shutdown;

    struct Echo {
        metrics: MetricsRecorder,
    }

    #[async_trait]
    impl TransactionHandler for Echo {
        fn metrics(&self) -> &MetricsRecorder {
            &self.metrics
        }

        async fn on_transaction(&self, _tx: &Transaction, _peer: SocketAddr) -> &'static str {
            self.metrics.record_processed();
            "ok"
        }
    }

    async fn start() -> (PeerAddr, Arc<Echo>, shutdown::ShutdownTrigger) {
        let echo = Arc::new(Echo {
            metrics: MetricsRecorder::new(Role::Orderer),
        });
        let server = RoleServer::bind("test", "127.0.0.1:0").await.unwrap();
        let addr = PeerAddr::from(server.local_addr().unwrap());
        let (trigger, handle) = shutdown::channel();
        let service = Arc::new(FrameService::new(Arc::clone(&echo)));
        tokio::spawn(server.serve(service, handle));
        (addr, echo, trigger)
    }

    #[tokio::test]
    async fn valid_frame_gets_role_reply() {
        let (addr, echo, _trigger) = start().await;
        let reply = request(&addr, "abc:def").await.unwrap();
        assert_eq!(reply.as_deref(), Some("ok"));
        assert_eq!(echo.metrics.received(), 1);
        assert_eq!(echo.metrics.processed(), 1);
    }

    #[tokio::test]
    async fn malformed_frame_is_rejected_and_counted() {
        let (addr, echo, _trigger) = start().await;
        for frame in ["no-separator", "a:b:c"] {
            let reply = request(&addr, frame).await.unwrap();
            assert_eq!(reply.as_deref(), Some(reply::INVALID_FORMAT));
        }
        assert_eq!(echo.metrics.received(), 2);
        assert_eq!(echo.metrics.failed(), 2);
        assert_eq!(echo.metrics.processed(), 0);
    }

    #[tokio::test]
    async fn oversize_frame_is_rejected_and_counted() {
        let (addr, echo, _trigger) = start().await;
        let frame = format!("abc:{}", "x".repeat(crate::config::MAX_MESSAGE_SIZE));
        let reply = request(&addr, &frame).await.unwrap();
        assert_eq!(reply.as_deref(), Some(reply::INVALID_FORMAT));
        assert_eq!(echo.metrics.failed(), 1);
        assert_eq!(echo.metrics.processed(), 0);
    }

    #[tokio::test]
    async fn bare_probe_is_not_counted() {
        let (addr, echo, _trigger) = start().await;
        crate::network::transport::probe(&addr, std::time::Duration::from_secs(1))
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(echo.metrics.received(), 0);
    }

    #[tokio::test]
    async fn shutdown_stops_accepting() {
        let echo = Arc::new(Echo {
            metrics: MetricsRecorder::new(Role::Endorser),
        });
        let server = RoleServer::bind("test", "127.0.0.1:0").await.unwrap();
        let (trigger, handle) = shutdown::channel();
        let task = tokio::spawn(server.serve(Arc::new(FrameService::new(echo)), handle));

        trigger.trigger();
        let res = tokio::time::timeout(std::time::Duration::from_secs(1), task)
            .await
            .expect("serve should return after shutdown")
            .unwrap();
        assert!(res.is_ok());
    }

    #[tokio::test]
    async fn bind_conflict_is_reported() {
        let first = RoleServer::bind("first", "127.0.0.1:0").await.unwrap();
        let addr = first.local_addr().unwrap().to_string();
        let err = RoleServer::bind("second", addr).await.unwrap_err();
        assert!(matches!(err, ServerError::Bind { name: "second", .. }));
    }
}

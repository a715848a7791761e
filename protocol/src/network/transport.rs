//! Point-to-point request/response over TCP.
//!
//! Every hop is one connection carrying one frame each way. Each side writes
//! its frame and half-closes, so a frame is everything read up to EOF. An
//! empty read means the peer closed without answering.

use std::io;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::config::{PeerAddr, MAX_MESSAGE_SIZE};

/// Connectivity failures. Always recovered at the call site: logged,
/// counted, never propagated past the handler that hit them.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The peer refused or could not be reached.
    #[error("failed to connect to {peer}: {source}")]
    Connect {
        peer: PeerAddr,
        #[source]
        source: io::Error,
    },

    /// The connect attempt did not finish in time.
    #[error("connecting to {peer} timed out after {timeout:?}")]
    ConnectTimeout { peer: PeerAddr, timeout: Duration },

    /// Reading or writing failed mid-exchange (e.g. connection reset).
    #[error("i/o error talking to {peer}: {source}")]
    Io {
        peer: PeerAddr,
        #[source]
        source: io::Error,
    },
}

/// Opens a connection to `peer`.
pub async fn connect(peer: &PeerAddr) -> Result<TcpStream, TransportError> {
    TcpStream::connect((peer.host.as_str(), peer.port))
        .await
        .map_err(|source| TransportError::Connect {
            peer: peer.clone(),
            source,
        })
}

/// Checks that `peer` accepts a bare TCP connection, then closes it.
pub async fn probe(peer: &PeerAddr, timeout: Duration) -> Result<(), TransportError> {
    match tokio::time::timeout(timeout, connect(peer)).await {
        Ok(Ok(_stream)) => Ok(()),
        Ok(Err(e)) => Err(e),
        Err(_) => Err(TransportError::ConnectTimeout {
            peer: peer.clone(),
            timeout,
        }),
    }
}

/// Sends one frame to `peer` over a fresh connection and reads the reply.
///
/// Returns `Ok(None)` when the peer closed without replying.
pub async fn request(peer: &PeerAddr, frame: &str) -> Result<Option<String>, TransportError> {
    let mut stream = connect(peer).await?;
    let io_err = |source| TransportError::Io {
        peer: peer.clone(),
        source,
    };

    stream.write_all(frame.as_bytes()).await.map_err(io_err)?;
    stream.shutdown().await.map_err(io_err)?;
    let reply = read_frame(&mut stream).await.map_err(io_err)?;
    Ok(reply.map(|bytes| String::from_utf8_lossy(&bytes).into_owned()))
}

/// Reads one frame: everything the peer sends before half-closing.
///
/// At most `MAX_MESSAGE_SIZE + 1` bytes are kept, so an oversize frame
/// comes back one byte too long for the decoder to reject. The excess is
/// drained so the reply is not lost to a reset. `None` if nothing was sent.
pub async fn read_frame(stream: &mut TcpStream) -> io::Result<Option<Vec<u8>>> {
    let mut buf = Vec::new();
    (&mut *stream)
        .take(MAX_MESSAGE_SIZE as u64 + 1)
        .read_to_end(&mut buf)
        .await?;
    if buf.is_empty() {
        return Ok(None);
    }
    if buf.len() > MAX_MESSAGE_SIZE {
        tokio::io::copy(stream, &mut tokio::io::sink()).await?;
    }
    Ok(Some(buf))
}

/// Writes a reply literal and half-closes the write side.
pub async fn write_reply(stream: &mut TcpStream, reply: &str) -> io::Result<()> {
    stream.write_all(reply.as_bytes()).await?;
    stream.shutdown().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn echo_once(reply: &'static str) -> PeerAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let _ = read_frame(&mut stream).await.unwrap();
            if !reply.is_empty() {
                write_reply(&mut stream, reply).await.unwrap();
            }
        });
        PeerAddr::from(addr)
    }

    #[tokio::test]
    async fn request_returns_reply() {
        let peer = echo_once("Transaction committed").await;
        let reply = request(&peer, "abc:def").await.unwrap();
        assert_eq!(reply.as_deref(), Some("Transaction committed"));
    }

    #[tokio::test]
    async fn silent_peer_yields_none() {
        let peer = echo_once("").await;
        let reply = request(&peer, "abc:def").await.unwrap();
        assert!(reply.is_none());
    }

    #[tokio::test]
    async fn frame_spanning_several_writes_is_read_whole() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let peer = PeerAddr::from(listener.local_addr().unwrap());
        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            read_frame(&mut stream).await.unwrap().unwrap()
        });

        let mut stream = connect(&peer).await.unwrap();
        stream.write_all(b"abc").await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        stream.write_all(b":def").await.unwrap();
        stream.shutdown().await.unwrap();

        assert_eq!(server.await.unwrap(), b"abc:def");
    }

    #[tokio::test]
    async fn oversize_frame_is_capped_one_past_limit() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let peer = PeerAddr::from(listener.local_addr().unwrap());
        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let frame = read_frame(&mut stream).await.unwrap().unwrap();
            write_reply(&mut stream, "too big").await.unwrap();
            frame.len()
        });

        let frame = format!("h:{}", "x".repeat(MAX_MESSAGE_SIZE * 2));
        let reply = request(&peer, &frame).await.unwrap();
        assert_eq!(reply.as_deref(), Some("too big"));
        assert_eq!(server.await.unwrap(), MAX_MESSAGE_SIZE + 1);
    }

    #[tokio::test]
    async fn refused_connection_is_connect_error() {
        // Bind then drop to get a port with nothing listening.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let peer = PeerAddr::from(listener.local_addr().unwrap());
        drop(listener);

        let err = request(&peer, "abc:def").await.unwrap_err();
        assert!(matches!(err, TransportError::Connect { .. }));
        assert!(probe(&peer, Duration::from_millis(200)).await.is_err());
    }

    #[tokio::test]
    async fn probe_succeeds_against_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let peer = PeerAddr::from(listener.local_addr().unwrap());
        probe(&peer, Duration::from_secs(1)).await.unwrap();
    }
}

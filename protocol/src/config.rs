//! # Protocol Configuration & Constants
//!
//! Every fixed port, interval and capacity used by the pipeline lives here,
//! together with the per-role configuration structs. The process supervisor
//! that launches each role only hands us peer lists and an output path; the
//! rest comes from these defaults.

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Fixed Ports
// ---------------------------------------------------------------------------

/// Endorser, client-facing.
pub const ENDORSER_PORT: u16 = 7052;

/// Orderer, endorser-facing.
pub const ORDERER_PORT: u16 = 7050;

/// Committer, orderer-facing.
pub const COMMITTER_PORT: u16 = 7051;

/// Committer, gossip-facing. Kept separate from the orderer-facing port so
/// replication traffic never queues behind client traffic.
pub const GOSSIP_PORT: u16 = 7053;

// ---------------------------------------------------------------------------
// Wire Limits
// ---------------------------------------------------------------------------

/// Largest frame accepted on the wire. One request per connection; anything
/// longer is rejected as malformed.
pub const MAX_MESSAGE_SIZE: usize = 4096;

// ---------------------------------------------------------------------------
// Telemetry
// ---------------------------------------------------------------------------

/// Capacity of the rolling throughput window. 60 one-second samples give a
/// one-minute view of recent throughput.
pub const ROLLING_WINDOW_CAPACITY: usize = 60;

/// Minimum spacing between two rolling window samples.
pub const ROLLING_SAMPLE_PERIOD: Duration = Duration::from_secs(1);

/// How often server roles persist a metrics snapshot.
pub const METRICS_FLUSH_INTERVAL: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Committer
// ---------------------------------------------------------------------------

/// Simulated ledger write cost applied before every commit attempt.
pub const DEFAULT_COMMIT_DELAY: Duration = Duration::from_millis(10);

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Interval between endorser availability probes.
pub const CLIENT_PROBE_INTERVAL: Duration = Duration::from_secs(2);

/// Ceiling on endorser discovery. After this the endorser is skipped.
pub const CLIENT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Connect timeout for a single probe attempt.
pub const CLIENT_PROBE_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Back-off after an endorser has been skipped.
pub const CLIENT_SKIP_BACKOFF: Duration = Duration::from_secs(2);

/// Pause between two consecutive transactions.
pub const CLIENT_SEND_INTERVAL: Duration = Duration::from_millis(100);

/// The client persists a snapshot every this many sent transactions.
pub const CLIENT_SNAPSHOT_EVERY: u64 = 100;

/// Fixed prefix of every client payload.
pub const CLIENT_PAYLOAD_PREFIX: &str = "Transaction_";

// ---------------------------------------------------------------------------
// Roles
// ---------------------------------------------------------------------------

/// The four process roles of the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Generates transactions and measures round trips.
    Client,
    /// First hop: acknowledges proposals and forwards to an orderer.
    Endorser,
    /// Second hop: pass-through to a committer.
    Orderer,
    /// Final hop: commits to the ledger and gossips to peer committers.
    Committer,
}

impl Role {
    /// Lowercase name, as used in log spans and the metrics file.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Endorser => "endorser",
            Self::Orderer => "orderer",
            Self::Committer => "committer",
        }
    }

    /// The port this role listens on, if it listens at all.
    pub fn listen_port(&self) -> Option<u16> {
        match self {
            Self::Client => None,
            Self::Endorser => Some(ENDORSER_PORT),
            Self::Orderer => Some(ORDERER_PORT),
            Self::Committer => Some(COMMITTER_PORT),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Peer Addresses
// ---------------------------------------------------------------------------

/// Errors from parsing a peer list entry.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PeerAddrError {
    /// The entry was empty after trimming.
    #[error("empty peer address")]
    Empty,

    /// The port suffix did not parse as a `u16`.
    #[error("invalid port in peer address {0:?}")]
    InvalidPort(String),
}

/// A next-hop peer: a host plus the port of the service we talk to there.
///
/// Peer lists come from the supervisor as bare IPs. A bare host resolves to
/// the role's fixed port; `host:port` overrides it, which lets several roles
/// share one host in tests.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerAddr {
    /// IP address or hostname.
    pub host: String,
    /// TCP port.
    pub port: u16,
}

impl PeerAddr {
    /// Creates a peer address from its parts.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parses `host` or `host:port`, falling back to `default_port`.
    pub fn parse_with_default(s: &str, default_port: u16) -> Result<Self, PeerAddrError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(PeerAddrError::Empty);
        }

        // Bracketed IPv6 or a plain socket address.
        if let Ok(addr) = SocketAddr::from_str(s) {
            return Ok(Self::new(addr.ip().to_string(), addr.port()));
        }

        match s.rsplit_once(':') {
            // A single colon means host:port. More than one is a bare IPv6.
            Some((host, port)) if !host.contains(':') => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| PeerAddrError::InvalidPort(s.to_string()))?;
                if host.is_empty() {
                    return Err(PeerAddrError::Empty);
                }
                Ok(Self::new(host, port))
            }
            _ => Ok(Self::new(s, default_port)),
        }
    }

    /// Parses a comma-separated list, skipping empty entries.
    pub fn parse_list(list: &str, default_port: u16) -> Result<Vec<Self>, PeerAddrError> {
        list.split(',')
            .filter(|entry| !entry.trim().is_empty())
            .map(|entry| Self::parse_with_default(entry, default_port))
            .collect()
    }
}

impl From<SocketAddr> for PeerAddr {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr.ip().to_string(), addr.port())
    }
}

impl fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

// ---------------------------------------------------------------------------
// Role Configuration
// ---------------------------------------------------------------------------

/// Next-hop configuration shared by the endorser and orderer.
#[derive(Debug, Clone, Default)]
pub struct ForwardConfig {
    /// Candidate next hops. One is picked uniformly at random per request.
    pub peers: Vec<PeerAddr>,
}

/// Committer configuration.
#[derive(Debug, Clone)]
pub struct CommitterConfig {
    /// Gossip ports of every peer committer. May include ourselves.
    pub gossip_peers: Vec<PeerAddr>,
    /// Our own gossip address, filtered out of `gossip_peers`.
    pub self_addr: Option<PeerAddr>,
    /// The bound gossip listener. Peers naming this port on our own or a
    /// loopback IP are filtered out too.
    pub local_gossip: Option<SocketAddr>,
    /// Simulated ledger write cost.
    pub commit_delay: Duration,
}

impl Default for CommitterConfig {
    fn default() -> Self {
        Self {
            gossip_peers: Vec::new(),
            self_addr: None,
            local_gossip: None,
            commit_delay: DEFAULT_COMMIT_DELAY,
        }
    }
}

/// Client driver configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Candidate endorsers.
    pub endorsers: Vec<PeerAddr>,
    /// Spacing between availability probes.
    pub probe_interval: Duration,
    /// Discovery ceiling before an endorser is skipped.
    pub discovery_timeout: Duration,
    /// Connect timeout of a single probe.
    pub probe_connect_timeout: Duration,
    /// Back-off after a skip.
    pub skip_backoff: Duration,
    /// Pause between transactions.
    pub send_interval: Duration,
    /// Persist a snapshot every this many sent transactions. Zero disables.
    pub snapshot_every: u64,
    /// Stop after this many transactions. `None` runs until shutdown.
    pub max_transactions: Option<u64>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endorsers: Vec::new(),
            probe_interval: CLIENT_PROBE_INTERVAL,
            discovery_timeout: CLIENT_DISCOVERY_TIMEOUT,
            probe_connect_timeout: CLIENT_PROBE_CONNECT_TIMEOUT,
            skip_backoff: CLIENT_SKIP_BACKOFF,
            send_interval: CLIENT_SEND_INTERVAL,
            snapshot_every: CLIENT_SNAPSHOT_EVERY,
            max_transactions: None,
        }
    }
}

/// Where and how often a role persists its metrics.
#[derive(Debug, Clone)]
pub struct FlushConfig {
    /// Output path of the JSON snapshot.
    pub path: PathBuf,
    /// Periodic save interval.
    pub interval: Duration,
}

impl FlushConfig {
    /// Flush to `path` at the default interval.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            interval: METRICS_FLUSH_INTERVAL,
        }
    }
}

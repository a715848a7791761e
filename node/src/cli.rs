//! # CLI Interface
//!
//! Command-line arguments for `ledgerflow-node` using `clap` derive. One
//! subcommand per role plus `version`. Every flag falls back to a
//! `LEDGERFLOW_*` environment variable so containers can be configured
//! without a wrapper script.

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use ledgerflow_protocol::config::{
    Role, CLIENT_SNAPSHOT_EVERY, COMMITTER_PORT, ENDORSER_PORT, GOSSIP_PORT, ORDERER_PORT,
};

use crate::logging::LogFormat;

/// ledgerflow pipeline node.
///
/// Runs one role of the client → endorser → orderer → committer pipeline.
#[derive(Parser, Debug)]
#[command(
    name = "ledgerflow-node",
    about = "ledgerflow transaction pipeline node",
    version,
    propagate_version = true
)]
pub struct LedgerflowCli {
    /// Log output format.
    #[arg(
        long,
        global = true,
        env = "LEDGERFLOW_LOG_FORMAT",
        value_enum,
        default_value_t = LogFormat::Pretty
    )]
    pub log_format: LogFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate transactions and submit them to endorsers.
    Client(ClientArgs),
    /// Acknowledge proposals and forward them to an orderer.
    Endorser(EndorserArgs),
    /// Acknowledge endorsed transactions and forward them to a committer.
    Orderer(OrdererArgs),
    /// Commit transactions and gossip them to peer committers.
    Committer(CommitterArgs),
    /// Print version information and exit.
    Version,
}

impl Commands {
    /// The pipeline role this subcommand runs, if any.
    pub fn role(&self) -> Option<Role> {
        match self {
            Commands::Client(_) => Some(Role::Client),
            Commands::Endorser(_) => Some(Role::Endorser),
            Commands::Orderer(_) => Some(Role::Orderer),
            Commands::Committer(_) => Some(Role::Committer),
            Commands::Version => None,
        }
    }
}

/// Flags shared by every role.
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// Where to write the JSON metrics snapshot.
    ///
    /// Defaults to `<role>_metrics.json` in the working directory. The final
    /// snapshot is accompanied by `<path>.summary.txt`.
    #[arg(long, env = "LEDGERFLOW_METRICS_OUT")]
    pub metrics_out: Option<PathBuf>,

    /// Seconds between periodic metrics saves (server roles).
    #[arg(long, env = "LEDGERFLOW_FLUSH_INTERVAL_SECS", default_value_t = 10)]
    pub flush_interval_secs: u64,

    /// Serve `/metrics` and `/snapshot` over HTTP on this port.
    #[arg(long, env = "LEDGERFLOW_METRICS_PORT")]
    pub metrics_port: Option<u16>,

    /// Seed for next-hop selection. Random when omitted.
    #[arg(long, env = "LEDGERFLOW_SEED")]
    pub seed: Option<u64>,
}

impl CommonArgs {
    pub fn metrics_path(&self, role: Role) -> PathBuf {
        self.metrics_out
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("{role}_metrics.json")))
    }
}

/// Listener flags for server roles.
#[derive(Args, Debug, Clone)]
pub struct ListenArgs {
    /// Interface to bind.
    #[arg(long, env = "LEDGERFLOW_BIND", default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub bind: IpAddr,
}

#[derive(Args, Debug)]
pub struct ClientArgs {
    /// Endorsers, comma-separated `host` or `host:port`.
    #[arg(long, env = "LEDGERFLOW_ENDORSERS", value_delimiter = ',', required = true)]
    pub endorsers: Vec<String>,

    /// Milliseconds between availability probes.
    #[arg(long, env = "LEDGERFLOW_PROBE_INTERVAL_MS", default_value_t = 2_000)]
    pub probe_interval_ms: u64,

    /// Seconds to wait for an endorser before skipping it.
    #[arg(long, env = "LEDGERFLOW_DISCOVERY_TIMEOUT_SECS", default_value_t = 30)]
    pub discovery_timeout_secs: u64,

    /// Milliseconds between transactions.
    #[arg(long, env = "LEDGERFLOW_SEND_INTERVAL_MS", default_value_t = 100)]
    pub send_interval_ms: u64,

    /// Save a snapshot every this many transactions. Zero disables.
    #[arg(long, env = "LEDGERFLOW_SNAPSHOT_EVERY", default_value_t = CLIENT_SNAPSHOT_EVERY)]
    pub snapshot_every: u64,

    /// Stop after this many transactions instead of running until
    /// interrupted.
    #[arg(long, env = "LEDGERFLOW_MAX_TRANSACTIONS")]
    pub max_transactions: Option<u64>,

    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Args, Debug)]
pub struct EndorserArgs {
    /// Port for client proposals.
    #[arg(long, env = "LEDGERFLOW_PORT", default_value_t = ENDORSER_PORT)]
    pub port: u16,

    /// Orderers, comma-separated `host` or `host:port`.
    #[arg(long, env = "LEDGERFLOW_ORDERERS", value_delimiter = ',')]
    pub orderers: Vec<String>,

    #[command(flatten)]
    pub listen: ListenArgs,

    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Args, Debug)]
pub struct OrdererArgs {
    /// Port for endorsed transactions.
    #[arg(long, env = "LEDGERFLOW_PORT", default_value_t = ORDERER_PORT)]
    pub port: u16,

    /// Committers, comma-separated `host` or `host:port`.
    #[arg(long, env = "LEDGERFLOW_COMMITTERS", value_delimiter = ',')]
    pub committers: Vec<String>,

    #[command(flatten)]
    pub listen: ListenArgs,

    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Args, Debug)]
pub struct CommitterArgs {
    /// Port for ordered transactions.
    #[arg(long, env = "LEDGERFLOW_PORT", default_value_t = COMMITTER_PORT)]
    pub port: u16,

    /// Port for gossip from peer committers.
    #[arg(long, env = "LEDGERFLOW_GOSSIP_PORT", default_value_t = GOSSIP_PORT)]
    pub gossip_port: u16,

    /// Peer committers' gossip addresses, comma-separated `host` or
    /// `host:port`. May include this node.
    #[arg(long, env = "LEDGERFLOW_PEERS", value_delimiter = ',')]
    pub peers: Vec<String>,

    /// This node's own gossip address as it appears in `--peers`.
    #[arg(long, env = "LEDGERFLOW_SELF_ADDR")]
    pub self_addr: Option<String>,

    /// Simulated ledger write cost in milliseconds.
    #[arg(long, env = "LEDGERFLOW_COMMIT_DELAY_MS", default_value_t = 10)]
    pub commit_delay_ms: u64,

    #[command(flatten)]
    pub listen: ListenArgs,

    #[command(flatten)]
    pub common: CommonArgs,
}

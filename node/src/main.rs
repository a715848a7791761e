// Copyright (c) 2026 ledgerflow contributors. MIT License.
// See LICENSE for details.

//! # ledgerflow Node
//!
//! Entry point for the `ledgerflow-node` binary. Parses CLI arguments,
//! initializes logging, starts one pipeline role and persists its metrics.
//!
//! Subcommands:
//!
//! - `client`    — generate transactions against the endorsers
//! - `endorser`  — acknowledge proposals, forward to an orderer
//! - `orderer`   — acknowledge, forward to a committer
//! - `committer` — commit to the in-memory ledger, gossip to peers
//! - `version`   — print build version information

mod cli;
mod logging;
mod metrics;

use std::future::Future;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::Instrument;

use ledgerflow_protocol::config::{
    ClientConfig, CommitterConfig, FlushConfig, ForwardConfig, PeerAddr, Role, COMMITTER_PORT,
    ENDORSER_PORT, GOSSIP_PORT, ORDERER_PORT,
};
use ledgerflow_protocol::metrics::{spawn_flusher, MetricsRecorder};
use ledgerflow_protocol::network::{FrameService, PeerSelector, RoleServer, ServerError};
use ledgerflow_protocol::roles::{
    serve_committer, ClientDriver, CommitterService, EndorserService, OrdererService,
};
use ledgerflow_protocol::shutdown::{self, Shutdown};
use ledgerflow_protocol::storage::Ledger;

use cli::{Commands, CommonArgs, LedgerflowCli};
use metrics::RoleExporter;

const DEFAULT_LOG_FILTER: &str = "ledgerflow_node=info,ledgerflow_protocol=info,tower_http=info";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = LedgerflowCli::parse();

    let Some(role) = cli.command.role() else {
        print_version();
        return Ok(());
    };

    logging::init_logging(DEFAULT_LOG_FILTER, cli.log_format);
    let span = tracing::info_span!("node", role = %role);

    async move {
        match cli.command {
            Commands::Client(args) => run_client(args).await,
            Commands::Endorser(args) => run_endorser(args).await,
            Commands::Orderer(args) => run_orderer(args).await,
            Commands::Committer(args) => run_committer(args).await,
            Commands::Version => Ok(()),
        }
    }
    .instrument(span)
    .await
}

// ---------------------------------------------------------------------------
// Roles
// ---------------------------------------------------------------------------

async fn run_client(args: cli::ClientArgs) -> Result<()> {
    let endorsers = parse_peers(&args.endorsers, ENDORSER_PORT).context("invalid --endorsers")?;
    anyhow::ensure!(!endorsers.is_empty(), "at least one endorser is required");

    let config = ClientConfig {
        endorsers,
        probe_interval: Duration::from_millis(args.probe_interval_ms),
        discovery_timeout: Duration::from_secs(args.discovery_timeout_secs),
        send_interval: Duration::from_millis(args.send_interval_ms),
        snapshot_every: args.snapshot_every,
        max_transactions: args.max_transactions,
        ..ClientConfig::default()
    };

    let recorder = Arc::new(MetricsRecorder::new(Role::Client));
    let path = args.common.metrics_path(Role::Client);
    ensure_parent_dir(&path)?;

    let (trigger, handle) = shutdown::channel();
    let http = spawn_http(&args.common, &recorder, handle.clone())?;

    tracing::info!(
        endorsers = config.endorsers.len(),
        metrics = %path.display(),
        "starting client"
    );
    let driver = ClientDriver::new(config, selector(&args.common), recorder, Some(path));
    let run = driver.run(handle);
    tokio::pin!(run);

    let finished = tokio::select! {
        _ = &mut run => true,
        _ = shutdown_signal() => false,
    };
    if !finished {
        tracing::info!("shutdown signal received, stopping client");
        trigger.trigger();
        run.await;
    }

    trigger.trigger();
    join_http(http).await;
    tracing::info!("client stopped");
    Ok(())
}

async fn run_endorser(args: cli::EndorserArgs) -> Result<()> {
    let orderers = parse_peers(&args.orderers, ORDERER_PORT).context("invalid --orderers")?;
    if orderers.is_empty() {
        tracing::warn!("no orderers configured; endorsed transactions will be dropped");
    }

    let recorder = Arc::new(MetricsRecorder::new(Role::Endorser));
    let service = Arc::new(FrameService::new(Arc::new(EndorserService::new(
        ForwardConfig { peers: orderers },
        selector(&args.common),
        Arc::clone(&recorder),
    ))));
    let server = RoleServer::bind("endorser", SocketAddr::new(args.listen.bind, args.port))
        .await
        .context("failed to start endorser")?;

    run_server(Role::Endorser, &args.common, recorder, |shutdown| {
        server.serve(service, shutdown)
    })
    .await
}

async fn run_orderer(args: cli::OrdererArgs) -> Result<()> {
    let committers =
        parse_peers(&args.committers, COMMITTER_PORT).context("invalid --committers")?;
    if committers.is_empty() {
        tracing::warn!("no committers configured; ordered transactions will be dropped");
    }

    let recorder = Arc::new(MetricsRecorder::new(Role::Orderer));
    let service = Arc::new(FrameService::new(Arc::new(OrdererService::new(
        ForwardConfig { peers: committers },
        selector(&args.common),
        Arc::clone(&recorder),
    ))));
    let server = RoleServer::bind("orderer", SocketAddr::new(args.listen.bind, args.port))
        .await
        .context("failed to start orderer")?;

    run_server(Role::Orderer, &args.common, recorder, |shutdown| {
        server.serve(service, shutdown)
    })
    .await
}

async fn run_committer(args: cli::CommitterArgs) -> Result<()> {
    let gossip_peers = parse_peers(&args.peers, GOSSIP_PORT).context("invalid --peers")?;
    let self_addr = args
        .self_addr
        .as_deref()
        .map(|s| PeerAddr::parse_with_default(s, GOSSIP_PORT))
        .transpose()
        .context("invalid --self-addr")?;

    let orderer_side = RoleServer::bind("committer", SocketAddr::new(args.listen.bind, args.port))
        .await
        .context("failed to start committer")?;
    let gossip_bind = SocketAddr::new(args.listen.bind, args.gossip_port);
    let gossip_side = RoleServer::bind("gossip", gossip_bind)
        .await
        .context("failed to start gossip listener")?;
    let local_gossip = gossip_side.local_addr().ok();

    if self_addr.is_none() && !gossip_peers.is_empty() && args.listen.bind.is_unspecified() {
        tracing::warn!(
            bind = %args.listen.bind,
            "no --self-addr while bound to an unspecified address; \
             a routable self entry in --peers will receive gossip"
        );
    }

    let config = CommitterConfig {
        gossip_peers,
        self_addr,
        local_gossip,
        commit_delay: Duration::from_millis(args.commit_delay_ms),
    };
    let recorder = Arc::new(MetricsRecorder::new(Role::Committer));
    let service = Arc::new(CommitterService::new(
        config,
        Arc::new(Ledger::new()),
        Arc::clone(&recorder),
    ));
    tracing::info!(peers = ?service.gossip_peers(), "gossip targets");

    run_server(Role::Committer, &args.common, recorder, |shutdown| {
        serve_committer(service, orderer_side, gossip_side, shutdown)
    })
    .await
}

// ---------------------------------------------------------------------------
// Plumbing
// ---------------------------------------------------------------------------

/// Runs a server role with periodic metrics flushing until a signal or a
/// listener failure. The final snapshot is written either way.
async fn run_server<F, Fut>(
    role: Role,
    common: &CommonArgs,
    recorder: Arc<MetricsRecorder>,
    serve: F,
) -> Result<()>
where
    F: FnOnce(Shutdown) -> Fut,
    Fut: Future<Output = Result<(), ServerError>>,
{
    let path = common.metrics_path(role);
    ensure_parent_dir(&path)?;

    let (trigger, handle) = shutdown::channel();
    let flush = FlushConfig {
        path: path.clone(),
        interval: Duration::from_secs(common.flush_interval_secs.max(1)),
    };
    let flusher = spawn_flusher(Arc::clone(&recorder), flush, handle.clone());
    let http = spawn_http(common, &recorder, handle.clone())?;

    tracing::info!(metrics = %path.display(), "starting {role}");
    let server = serve(handle);
    tokio::pin!(server);

    let finished = tokio::select! {
        res = &mut server => Some(res),
        _ = shutdown_signal() => None,
    };
    let result = match finished {
        Some(res) => res,
        None => {
            tracing::info!("shutdown signal received, draining");
            trigger.trigger();
            server.await
        }
    };

    // Also reached on listener failure: the flusher still writes the final
    // snapshot before we exit.
    trigger.trigger();
    if let Err(e) = flusher.await {
        tracing::warn!(error = %e, "metrics flusher did not finish cleanly");
    }
    join_http(http).await;

    result.with_context(|| format!("{role} listener failed"))?;
    tracing::info!("{role} stopped");
    Ok(())
}

fn parse_peers(entries: &[String], default_port: u16) -> Result<Vec<PeerAddr>> {
    let list = entries.join(",");
    PeerAddr::parse_list(&list, default_port).with_context(|| format!("bad peer list {list:?}"))
}

fn selector(common: &CommonArgs) -> PeerSelector {
    match common.seed {
        Some(seed) => PeerSelector::seeded(seed),
        None => PeerSelector::from_entropy(),
    }
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create metrics directory {}", dir.display())),
        _ => Ok(()),
    }
}

fn spawn_http(
    common: &CommonArgs,
    recorder: &Arc<MetricsRecorder>,
    shutdown: Shutdown,
) -> Result<Option<tokio::task::JoinHandle<Result<()>>>> {
    let Some(port) = common.metrics_port else {
        return Ok(None);
    };
    let exporter = RoleExporter::new(Arc::clone(recorder))
        .context("failed to create metrics registry")?;
    let exporter = Arc::new(exporter);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    Ok(Some(tokio::spawn(
        metrics::serve(addr, exporter, shutdown).in_current_span(),
    )))
}

async fn join_http(http: Option<tokio::task::JoinHandle<Result<()>>>) {
    let Some(task) = http else { return };
    match task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::warn!(error = %format!("{e:#}"), "metrics endpoint stopped with an error")
        }
        Err(e) => tracing::warn!(error = %e, "metrics endpoint task failed"),
    }
}

/// Prints version information to stdout.
fn print_version() {
    println!("ledgerflow-node {}", env!("CARGO_PKG_VERSION"));
    println!(
        "ports     endorser {ENDORSER_PORT}, orderer {ORDERER_PORT}, \
         committer {COMMITTER_PORT}, gossip {GOSSIP_PORT}"
    );
    println!("rustc     {}", option_env!("RUSTC_VERSION").unwrap_or("unknown"));
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported. A handler that cannot
/// be installed is logged and never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

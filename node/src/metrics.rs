//! # Prometheus Metrics
//!
//! Optional HTTP view of the live [`MetricsRecorder`]. `/metrics` renders
//! Prometheus text exposition, `/snapshot` returns the same JSON document
//! that is persisted to disk.
//!
//! The recorder stays the single source of truth. Prometheus handles are
//! gauges refreshed from a fresh snapshot on every scrape, registered in a
//! dedicated [`prometheus::Registry`] labelled with the role.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use prometheus::{Encoder, Gauge, IntGauge, Registry, TextEncoder};
use tower_http::trace::TraceLayer;

use ledgerflow_protocol::metrics::MetricsRecorder;
use ledgerflow_protocol::shutdown::Shutdown;

/// Prometheus handles mirroring one role's recorder.
pub struct RoleExporter {
    registry: Registry,
    recorder: Arc<MetricsRecorder>,
    received: IntGauge,
    processed: IntGauge,
    failed: IntGauge,
    committed: IntGauge,
    duplicates: IntGauge,
    gossip_sent: IntGauge,
    gossip_received: IntGauge,
    gossip_failed: IntGauge,
    ledger_size: IntGauge,
    latency_mean: Gauge,
    latency_max: Gauge,
    throughput_mean: Gauge,
}

fn int_gauge(registry: &Registry, name: &str, help: &str) -> Result<IntGauge, prometheus::Error> {
    let gauge = IntGauge::new(name, help)?;
    registry.register(Box::new(gauge.clone()))?;
    Ok(gauge)
}

fn gauge(registry: &Registry, name: &str, help: &str) -> Result<Gauge, prometheus::Error> {
    let gauge = Gauge::new(name, help)?;
    registry.register(Box::new(gauge.clone()))?;
    Ok(gauge)
}

impl RoleExporter {
    /// Creates and registers every gauge. Call once at startup.
    pub fn new(recorder: Arc<MetricsRecorder>) -> Result<Self, prometheus::Error> {
        let labels = HashMap::from([("role".to_string(), recorder.role().to_string())]);
        let registry = Registry::new_custom(Some("ledgerflow".into()), Some(labels))?;

        let int = |name: &str, help: &str| int_gauge(&registry, name, help);
        let float = |name: &str, help: &str| gauge(&registry, name, help);

        Ok(Self {
            received: int("transactions_received", "Requests received, counted before decode")?,
            processed: int("transactions_processed", "Requests handled successfully")?,
            failed: int("transactions_failed", "Malformed requests and failed round trips")?,
            committed: int("transactions_committed", "First-time ledger commits")?,
            duplicates: int("transactions_duplicate", "Commits rejected as already present")?,
            gossip_sent: int("gossip_sent", "Gossip frames delivered to peers")?,
            gossip_received: int("gossip_received", "Gossip frames received from peers")?,
            gossip_failed: int("gossip_failed", "Gossip delivery attempts that failed")?,
            ledger_size: int("ledger_size", "Entries in the in-memory ledger")?,
            latency_mean: float("latency_mean_seconds", "Mean recorded latency")?,
            latency_max: float("latency_max_seconds", "Maximum recorded latency")?,
            throughput_mean: float("throughput_mean_tps", "Mean of the rolling throughput window")?,
            registry,
            recorder,
        })
    }

    pub fn recorder(&self) -> &Arc<MetricsRecorder> {
        &self.recorder
    }

    /// Copies the recorder's current state into the gauges.
    fn refresh(&self) {
        let snap = self.recorder.snapshot();
        let tx = &snap.transactions;
        self.received.set(tx.received as i64);
        self.processed.set(tx.processed as i64);
        self.failed.set(tx.failed as i64);
        self.committed.set(tx.committed as i64);
        self.duplicates.set(tx.duplicates as i64);
        if let Some(gossip) = &snap.gossip {
            self.gossip_sent.set(gossip.sent as i64);
            self.gossip_received.set(gossip.received as i64);
            self.gossip_failed.set(gossip.failed as i64);
        }
        if let Some(ledger) = &snap.ledger {
            self.ledger_size.set(ledger.size as i64);
        }
        self.latency_mean.set(snap.performance.latency_mean);
        self.latency_max.set(snap.performance.latency_max);
        self.throughput_mean.set(snap.performance.throughput_mean);
    }

    /// Refreshes, then encodes all registered metrics in the Prometheus
    /// text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        self.refresh();
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

pub type SharedExporter = Arc<RoleExporter>;

/// Renders `/metrics` in Prometheus text format.
pub async fn metrics_handler(State(exporter): State<SharedExporter>) -> impl IntoResponse {
    match exporter.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}

/// Returns the live snapshot as JSON.
pub async fn snapshot_handler(State(exporter): State<SharedExporter>) -> impl IntoResponse {
    Json(exporter.recorder().snapshot())
}

pub fn router(exporter: SharedExporter) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/snapshot", get(snapshot_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(exporter)
}

/// Serves the metrics router on `addr` until `shutdown` fires.
pub async fn serve(
    addr: SocketAddr,
    exporter: SharedExporter,
    mut shutdown: Shutdown,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {addr}"))?;
    tracing::info!(%addr, "metrics endpoint listening");

    axum::serve(listener, router(exporter))
        .with_graceful_shutdown(async move { shutdown.wait().await })
        .await
        .context("metrics endpoint failed")
}

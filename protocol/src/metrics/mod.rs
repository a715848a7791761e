//! # Metrics Module
//!
//! Per-role telemetry: monotonically non-decreasing counters, latency
//! samples, and a 60-sample rolling throughput window. Each role process owns
//! one [`MetricsRecorder`] shared by all of its connection handlers, and
//! persists [`MetricsSnapshot`]s as JSON for an offline aggregator.
//!
//! ```text
//! recorder.rs — MetricsRecorder: the shared, mutex-guarded live state
//! window.rs   — RollingWindow: bounded throughput samples, one per second
//! snapshot.rs — MetricsSnapshot: the stable on-disk schema
//! flush.rs    — background periodic + final save for server roles
//! stats.rs    — mean / population std-dev / max helpers
//! ```

pub mod flush;
pub mod recorder;
pub mod snapshot;
pub mod stats;
pub mod window;

pub use flush::spawn_flusher;
pub use recorder::{summary_path, MetricsError, MetricsRecorder};
pub use snapshot::MetricsSnapshot;
pub use window::RollingWindow;

// Copyright (c) 2026 ledgerflow contributors. MIT License.
// See LICENSE for details.

//! # ledgerflow: core library
//!
//! A toy distributed transaction pipeline in the style of an
//! execute-order-validate ledger. Clients submit transactions to
//! endorsers, endorsers hand them to orderers, orderers hand them to
//! committers, and committers replicate every newly committed transaction
//! to each other by gossip.
//!
//! Nothing here is durable and nothing is signed: ledgers live in memory,
//! "endorsement" is an acknowledgement, and "ordering" is a relay. What the
//! crate does model carefully is the plumbing: one request per connection,
//! idempotent commits keyed by content hash, and per-role metrics written
//! atomically to disk.
//!
//! ## Modules
//!
//! - **config**: fixed ports, timing constants, peer addresses, role settings.
//! - **transaction**: the `hash:payload` wire frame and reply literals.
//! - **storage**: the in-memory, idempotent ledger.
//! - **network**: accept loop, outbound requests, peer choice, gossip.
//! - **roles**: endorser, orderer, committer and client behavior.
//! - **metrics**: counters, latencies, rolling throughput, JSON snapshots.
//! - **shutdown**: the cooperative stop signal every loop listens to.

pub mod config;
pub mod metrics;
pub mod network;
pub mod roles;
pub mod shutdown;
pub mod storage;
pub mod transaction;

pub use config::{PeerAddr, Role};
pub use metrics::{MetricsRecorder, MetricsSnapshot};
pub use storage::Ledger;
pub use transaction::Transaction;

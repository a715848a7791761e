//! # Roles
//!
//! The four process roles of the pipeline. Each server role is a
//! [`TransactionHandler`](crate::network::TransactionHandler) plugged into a
//! [`FrameService`](crate::network::FrameService); the client is a driver
//! loop of its own.
//!
//! ```text
//! client ─► endorser ─► orderer ─► committer ◄─► peer committers (gossip)
//! ```

pub mod client;
pub mod committer;
pub mod endorser;
pub mod forward;
pub mod orderer;

pub use client::{ClientDriver, SendOutcome};
pub use committer::{
    serve_committer, CommitOutcome, CommitterService, GossipIngress, OrdererIngress,
};
pub use endorser::EndorserService;
pub use forward::{ForwardOutcome, Forwarder};
pub use orderer::OrdererService;

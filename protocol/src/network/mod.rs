//! # Network Module
//!
//! Everything that touches a socket.
//!
//! ```text
//! server.rs    — RoleServer accept loop, ConnectionHandler, one-frame FrameService
//! transport.rs — outbound request/response, availability probe, frame I/O
//! selector.rs  — uniform random next-hop choice with an injectable RNG
//! gossip.rs    — GossipFanout: per-peer fire-and-forget replication
//! ```
//!
//! ## Design Decisions
//!
//! - One connection per request. No pooling, no framing beyond a single
//!   read, no backpressure: each accepted connection gets its own task.
//! - No timeouts on forwards or gossip. A hung peer stalls only the task
//!   talking to it. The client's discovery probe is the one exception.
//! - The library never binds fixed ports itself; callers pass addresses, so
//!   tests can run whole topologies on ephemeral localhost ports.

pub mod gossip;
pub mod selector;
pub mod server;
pub mod transport;

pub use gossip::{DeliveryOutcome, GossipBatch, GossipFanout};
pub use selector::PeerSelector;
pub use server::{ConnectionHandler, FrameService, RoleServer, ServerError, TransactionHandler};
pub use transport::TransportError;

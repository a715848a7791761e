//! # Transaction Module
//!
//! The unit of work flowing through the pipeline and its wire codec.
//!
//! ```text
//! codec.rs — Transaction, payload digest, `hash:payload` framing, reply literals
//! ```
//!
//! A transaction is created at the client, lives on the wire and, once
//! committed, as a ledger entry. It is never deleted.

pub mod codec;

pub use codec::{payload_digest, reply, CodecError, Transaction};

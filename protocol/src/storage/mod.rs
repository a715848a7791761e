//! # Storage Module
//!
//! The committer's ledger. Nothing here touches disk: the ledger lives for
//! the process lifetime and is gone when the process exits.
//!
//! ```text
//! ledger.rs — content-addressed hash → payload map with atomic check-then-insert
//! ```

pub mod ledger;

pub use ledger::{CommitStatus, Ledger};

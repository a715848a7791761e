//! In-memory, content-addressed ledger.
//!
//! Each committer owns exactly one [`Ledger`] for the lifetime of the
//! process. Entries are keyed by transaction hash, append-only, never
//! persisted. Membership is the only consistency mechanism in the network:
//! a hash present in the ledger has been committed here, and any further
//! delivery of it is a duplicate.

use std::collections::HashMap;
use std::fmt;

use parking_lot::Mutex;

use crate::transaction::Transaction;

/// Result of a commit attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitStatus {
    /// First time this hash was seen; the entry was inserted.
    Committed {
        /// Ledger size after the insert.
        ledger_size: usize,
    },
    /// The hash was already present; nothing changed.
    Duplicate,
}

/// Thread-safe hash → payload map.
///
/// A single coarse mutex guards the map. Commits are short (one lookup and
/// one insert), so contention is not a concern, and the check-then-insert
/// must be one critical section anyway.
#[derive(Default)]
pub struct Ledger {
    entries: Mutex<HashMap<String, String>>,
}

impl fmt::Debug for Ledger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ledger").field("size", &self.len()).finish()
    }
}

impl Ledger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts the transaction unless its hash is already present.
    ///
    /// Membership check and insert happen under one lock acquisition, so
    /// two concurrent deliveries of the same hash (orderer path and gossip
    /// path) commit exactly once.
    pub fn commit(&self, tx: &Transaction) -> CommitStatus {
        let mut entries = self.entries.lock();
        if entries.contains_key(&tx.hash) {
            return CommitStatus::Duplicate;
        }
        entries.insert(tx.hash.clone(), tx.payload.clone());
        CommitStatus::Committed {
            ledger_size: entries.len(),
        }
    }

    /// Returns `true` if the hash has been committed.
    pub fn contains(&self, hash: &str) -> bool {
        self.entries.lock().contains_key(hash)
    }

    /// Returns the committed payload for a hash.
    pub fn get(&self, hash: &str) -> Option<String> {
        self.entries.lock().get(hash).cloned()
    }

    /// Number of committed transactions.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns `true` if nothing has been committed yet.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// All committed hashes, sorted. Used by tests and diagnostics.
    pub fn hashes(&self) -> Vec<String> {
        let mut hashes: Vec<String> = self.entries.lock().keys().cloned().collect();
        hashes.sort();
        hashes
    }
}

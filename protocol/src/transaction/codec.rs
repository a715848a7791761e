//! Wire encoding of transactions.
//!
//! Every hop speaks the same UTF-8 text frame, `"<hexdigest>:<payload>"`,
//! one frame per connection. The digest is computed once at the client and
//! carried unchanged to the committers, where it is the ledger key.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::config::MAX_MESSAGE_SIZE;

/// Separator between hash and payload on the wire.
pub const SEPARATOR: char = ':';

// ---------------------------------------------------------------------------
// Replies
// ---------------------------------------------------------------------------

/// Fixed acknowledgement strings. Callers may ignore the content; only a
/// zero-length reply means "no response".
pub mod reply {
    /// Endorser accepted the proposal.
    pub const ENDORSED: &str = "Transaction endorsed by Endorser";
    /// Orderer accepted the transaction.
    pub const ORDERED: &str = "Transaction ordered by Orderer";
    /// Committer appended the transaction to its ledger.
    pub const COMMITTED: &str = "Transaction committed";
    /// Committer already had the hash.
    pub const ALREADY_COMMITTED: &str = "Transaction already committed";
    /// Gossip-facing acknowledgement.
    pub const GOSSIP_RECEIVED: &str = "Gossip received";
    /// The request was not a `hash:payload` frame.
    pub const INVALID_FORMAT: &str = "Invalid transaction format";
}

// ---------------------------------------------------------------------------
// CodecError
// ---------------------------------------------------------------------------

/// Reasons a frame is rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// The frame is longer than the wire limit.
    #[error("frame exceeds {limit} bytes")]
    TooLarge { limit: usize },

    /// The frame is not valid UTF-8.
    #[error("frame is not valid utf-8")]
    InvalidUtf8,

    /// The frame does not contain exactly one separator.
    #[error("expected exactly one ':' separator, found {0}")]
    SeparatorCount(usize),
}

// ---------------------------------------------------------------------------
// Transaction
// ---------------------------------------------------------------------------

/// A transaction as it travels the pipeline.
///
/// Equal payloads always produce equal hashes. The hash is the sole
/// identity; no collision handling is attempted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Transaction {
    /// Hex digest of the payload.
    pub hash: String,
    /// Opaque payload text.
    pub payload: String,
}

impl Transaction {
    /// Builds a transaction, hashing the payload.
    pub fn new(payload: impl Into<String>) -> Self {
        let payload = payload.into();
        Self {
            hash: payload_digest(&payload),
            payload,
        }
    }

    /// Assembles a transaction from an already-known hash. The hash is not
    /// checked against the payload; relayed frames are trusted as-is.
    pub fn from_parts(hash: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            payload: payload.into(),
        }
    }

    /// Encodes to the wire frame.
    pub fn encode(&self) -> String {
        format!("{}{}{}", self.hash, SEPARATOR, self.payload)
    }

    /// Decodes a wire frame of at most [`MAX_MESSAGE_SIZE`] bytes.
    pub fn decode(frame: &[u8]) -> Result<Self, CodecError> {
        if frame.len() > MAX_MESSAGE_SIZE {
            return Err(CodecError::TooLarge {
                limit: MAX_MESSAGE_SIZE,
            });
        }
        let text = std::str::from_utf8(frame).map_err(|_| CodecError::InvalidUtf8)?;
        Self::decode_str(text)
    }

    /// Decodes a frame that is already text.
    pub fn decode_str(text: &str) -> Result<Self, CodecError> {
        let separators = text.matches(SEPARATOR).count();
        if separators != 1 {
            return Err(CodecError::SeparatorCount(separators));
        }
        // Exactly one separator, so the split always succeeds.
        let (hash, payload) = text
            .split_once(SEPARATOR)
            .ok_or(CodecError::SeparatorCount(0))?;
        Ok(Self::from_parts(hash, payload))
    }

    /// First eight characters of the hash, for log lines.
    pub fn short_hash(&self) -> &str {
        let end = self
            .hash
            .char_indices()
            .nth(8)
            .map(|(i, _)| i)
            .unwrap_or(self.hash.len());
        &self.hash[..end]
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/// Lowercase hex SHA-256 of a payload.
pub fn payload_digest(payload: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_deterministic_and_fixed_length() {
        let a = Transaction::new("Transaction_1_from_Client");
        let b = Transaction::new("Transaction_1_from_Client");
        assert_eq!(a.hash, b.hash);
        assert_eq!(a.hash.len(), 64);
        assert!(a.hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn different_payloads_hash_differently() {
        assert_ne!(Transaction::new("a").hash, Transaction::new("b").hash);
    }

    #[test]
    fn known_sha256_vector() {
        assert_eq!(
            payload_digest("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn encode_then_decode_preserves_fields() {
        let tx = Transaction::new("Transaction_7_from_Client");
        let decoded = Transaction::decode(tx.encode().as_bytes()).unwrap();
        assert_eq!(decoded, tx);
    }

    #[test]
    fn short_opaque_hash_is_accepted() {
        let tx = Transaction::decode(b"abc123:p").unwrap();
        assert_eq!(tx.hash, "abc123");
        assert_eq!(tx.payload, "p");
    }

    #[test]
    fn missing_separator_is_rejected() {
        assert_eq!(
            Transaction::decode(b"no separator here"),
            Err(CodecError::SeparatorCount(0))
        );
    }

    #[test]
    fn extra_separator_is_rejected() {
        assert_eq!(
            Transaction::decode(b"abc:def:ghi"),
            Err(CodecError::SeparatorCount(2))
        );
    }

    #[test]
    fn non_utf8_is_rejected() {
        assert_eq!(
            Transaction::decode(&[0xff, 0xfe, b':', b'x']),
            Err(CodecError::InvalidUtf8)
        );
    }

    #[test]
    fn oversize_frame_is_rejected() {
        let at_limit = format!("h:{}", "x".repeat(MAX_MESSAGE_SIZE - 2));
        assert!(Transaction::decode(at_limit.as_bytes()).is_ok());

        let over = format!("h:{}", "x".repeat(MAX_MESSAGE_SIZE - 1));
        assert_eq!(
            Transaction::decode(over.as_bytes()),
            Err(CodecError::TooLarge {
                limit: MAX_MESSAGE_SIZE
            })
        );
    }

    #[test]
    fn short_hash_truncates() {
        let tx = Transaction::from_parts("0123456789abcdef", "x");
        assert_eq!(tx.short_hash(), "01234567");
        let tiny = Transaction::from_parts("ab", "x");
        assert_eq!(tiny.short_hash(), "ab");
    }
}

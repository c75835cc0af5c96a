//! Error types for VaultLog core.

use thiserror::Error;
use vaultlog_protocol::{ItemId, ProtocolError, SequenceNo};

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur while sealing, opening or replaying state.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A ciphertext could not be authenticated (tampering or wrong key).
    #[error("decryption failed: {message}")]
    Decryption {
        /// Description of the failure.
        message: String,
    },

    /// Encryption failed.
    #[error("encryption failed: {message}")]
    Encryption {
        /// Description of the failure.
        message: String,
    },

    /// Invalid key size.
    #[error("invalid key size: expected {expected} bytes, got {actual}")]
    InvalidKeySize {
        /// Expected size in bytes.
        expected: usize,
        /// Actual size in bytes.
        actual: usize,
    },

    /// The log does not continue where the base state ends.
    #[error("sequence gap: expected entry {expected}, found {found}")]
    SequenceGap {
        /// Sequence number the replay needed next.
        expected: SequenceNo,
        /// Sequence number actually present.
        found: SequenceNo,
    },

    /// An insert named an id that is already live.
    #[error("entry {sequence_no} inserts item {item_id} which already exists")]
    DuplicateItem {
        /// The offending id.
        item_id: ItemId,
        /// Entry that carried the insert.
        sequence_no: SequenceNo,
    },

    /// Items and id map disagree.
    #[error("inconsistent state: {message}")]
    InconsistentState {
        /// Description of the mismatch.
        message: String,
    },

    /// Log entry framing error.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// CBOR codec error on a decrypted payload.
    #[error("codec error: {0}")]
    Codec(String),
}

impl CoreError {
    /// Creates a decryption failed error.
    pub fn decryption_failed(message: impl Into<String>) -> Self {
        Self::Decryption {
            message: message.into(),
        }
    }

    /// Creates an encryption failed error.
    pub fn encryption_failed(message: impl Into<String>) -> Self {
        Self::Encryption {
            message: message.into(),
        }
    }

    /// Creates an invalid key size error.
    pub fn invalid_key_size(actual: usize, expected: usize) -> Self {
        Self::InvalidKeySize { expected, actual }
    }

    /// Creates a sequence gap error.
    pub fn sequence_gap(expected: SequenceNo, found: SequenceNo) -> Self {
        Self::SequenceGap { expected, found }
    }

    /// Creates an inconsistent state error.
    pub fn inconsistent(message: impl Into<String>) -> Self {
        Self::InconsistentState {
            message: message.into(),
        }
    }

    /// Creates a codec error.
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec(message.into())
    }
}

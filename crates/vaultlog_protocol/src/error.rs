//! Error types for the protocol crate.

use crate::ids::SequenceNo;
use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while validating or encoding protocol messages.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// A log entry violates its structural rules.
    #[error("malformed log entry {sequence_no}: {reason}")]
    MalformedEntry {
        /// Sequence number of the offending entry.
        sequence_no: SequenceNo,
        /// What is wrong with it.
        reason: String,
    },

    /// CBOR encoding or decoding failed.
    #[error("codec error: {0}")]
    Codec(String),
}

impl ProtocolError {
    /// Creates a malformed entry error.
    pub fn malformed(sequence_no: SequenceNo, reason: impl Into<String>) -> Self {
        Self::MalformedEntry {
            sequence_no,
            reason: reason.into(),
        }
    }

    /// Creates a codec error.
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec(message.into())
    }
}

//! Transport layer abstraction for log queries and mutations.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use vaultlog_protocol::{
    BatchDeleteRequest, BatchWriteRequest, DeleteRequest, EncryptedSnapshot, SequenceNo,
    TransactionLogResponse, WriteRequest,
};

/// Result type for transport calls.
pub type TransportResult<T> = Result<T, TransportError>;

/// Errors reported by a transport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The server rejected the credentials (HTTP 401 or equivalent).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The server answered with a non-success status.
    #[error("server responded with status {status}: {message}")]
    Status {
        /// Status code.
        status: u16,
        /// Response body or reason.
        message: String,
    },

    /// The request never got an answer.
    #[error("network error: {0}")]
    Network(String),

    /// A request or response body could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),
}

impl TransportError {
    /// Creates an unauthorized error.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    /// Creates a status error.
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    /// Creates a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    /// Returns true for unauthenticated-class failures.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, TransportError::Unauthorized(_))
    }

    /// Returns true if the failure is likely transient.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Network(_) => true,
            TransportError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Network operations against the remote transaction log.
///
/// Implementations perform no retries of their own unless documented;
/// the client never retries either.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetches log entries with sequence numbers `>= starting_seq_no`.
    ///
    /// If the server compacted the log behind a bundle that covers
    /// `starting_seq_no`, the response carries the bundle's sequence number
    /// and the entries start right after it.
    async fn query_transaction_log(
        &self,
        starting_seq_no: SequenceNo,
    ) -> TransportResult<TransactionLogResponse>;

    /// Fetches the encrypted bundle materialised at `bundle_seq_no`.
    async fn query_encrypted_db_state(
        &self,
        bundle_seq_no: SequenceNo,
    ) -> TransportResult<EncryptedSnapshot>;

    /// Submits an insert.
    async fn insert(&self, request: WriteRequest) -> TransportResult<()>;

    /// Submits an update.
    async fn update(&self, request: WriteRequest) -> TransportResult<()>;

    /// Submits a delete.
    async fn delete(&self, request: DeleteRequest) -> TransportResult<()>;

    /// Submits a batched insert.
    async fn batch_insert(&self, request: BatchWriteRequest) -> TransportResult<()>;

    /// Submits a batched update.
    async fn batch_update(&self, request: BatchWriteRequest) -> TransportResult<()>;

    /// Submits a batched delete.
    async fn batch_delete(&self, request: BatchDeleteRequest) -> TransportResult<()>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn query_transaction_log(
        &self,
        starting_seq_no: SequenceNo,
    ) -> TransportResult<TransactionLogResponse> {
        (**self).query_transaction_log(starting_seq_no).await
    }

    async fn query_encrypted_db_state(
        &self,
        bundle_seq_no: SequenceNo,
    ) -> TransportResult<EncryptedSnapshot> {
        (**self).query_encrypted_db_state(bundle_seq_no).await
    }

    async fn insert(&self, request: WriteRequest) -> TransportResult<()> {
        (**self).insert(request).await
    }

    async fn update(&self, request: WriteRequest) -> TransportResult<()> {
        (**self).update(request).await
    }

    async fn delete(&self, request: DeleteRequest) -> TransportResult<()> {
        (**self).delete(request).await
    }

    async fn batch_insert(&self, request: BatchWriteRequest) -> TransportResult<()> {
        (**self).batch_insert(request).await
    }

    async fn batch_update(&self, request: BatchWriteRequest) -> TransportResult<()> {
        (**self).batch_update(request).await
    }

    async fn batch_delete(&self, request: BatchDeleteRequest) -> TransportResult<()> {
        (**self).batch_delete(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(TransportError::unauthorized("expired").is_unauthorized());
        assert!(!TransportError::status(401, "x").is_unauthorized());
        assert!(TransportError::network("timeout").is_retryable());
        assert!(TransportError::status(502, "bad gateway").is_retryable());
        assert!(!TransportError::status(404, "missing").is_retryable());
        assert!(!TransportError::unauthorized("expired").is_retryable());
    }

    #[test]
    fn error_display() {
        let err = TransportError::status(500, "boom");
        assert_eq!(err.to_string(), "server responded with status 500: boom");
    }
}

//! Error types for the client.

use crate::transport::TransportError;
use thiserror::Error;
use vaultlog_core::CoreError;
use vaultlog_protocol::SequenceNo;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors surfaced by the caller-facing operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// The server rejected the session's credentials. Local credentials
    /// have already been purged when this is returned.
    #[error("authentication expired: {0}")]
    AuthExpired(String),

    /// No key is available for this session.
    #[error("not authenticated")]
    NotAuthenticated,

    /// Network or server failure, passed through unchanged.
    #[error(transparent)]
    Transport(TransportError),

    /// A payload or bundle failed authentication.
    #[error("decryption failed: {0}")]
    Decryption(String),

    /// The log does not continue where the local state ends.
    #[error("sequence gap: expected entry {expected}, found {found}")]
    SequenceGap {
        /// Sequence number the replay needed next.
        expected: SequenceNo,
        /// Sequence number actually received.
        found: SequenceNo,
    },

    /// The server sent something that breaks the protocol.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Other failure inside the core.
    #[error(transparent)]
    Core(CoreError),

    /// The caller passed arguments that cannot be submitted.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl ClientError {
    /// Creates a protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Returns true if the session has to authenticate again.
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, ClientError::AuthExpired(_) | ClientError::NotAuthenticated)
    }

    /// Returns true if repeating the call may succeed.
    ///
    /// The client never retries on its own.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Transport(e) => e.is_retryable(),
            _ => false,
        }
    }
}

impl From<CoreError> for ClientError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Decryption { message } => ClientError::Decryption(message),
            CoreError::SequenceGap { expected, found } => {
                ClientError::SequenceGap { expected, found }
            }
            CoreError::Protocol(e) => ClientError::Protocol(e.to_string()),
            CoreError::DuplicateItem { .. } => ClientError::Protocol(err.to_string()),
            other => ClientError::Core(other),
        }
    }
}

/// Failure of the background compaction signal.
///
/// Logged by the compaction worker and never returned to a caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackgroundSignalError {
    /// The session key could not be resolved.
    #[error("key unavailable: {0}")]
    KeyUnavailable(String),

    /// The compactor reported a failure.
    #[error("compaction failed: {0}")]
    Compaction(String),

    /// The compaction job panicked or was aborted.
    #[error("compaction job aborted: {0}")]
    Aborted(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_errors_are_lifted() {
        let err: ClientError = CoreError::decryption_failed("bad tag").into();
        assert_eq!(err, ClientError::Decryption("bad tag".into()));

        let err: ClientError = CoreError::sequence_gap(4, 6).into();
        assert_eq!(
            err,
            ClientError::SequenceGap {
                expected: 4,
                found: 6
            }
        );

        let err: ClientError = CoreError::codec("eof").into();
        assert!(matches!(err, ClientError::Core(CoreError::Codec(_))));
    }

    #[test]
    fn retryable_errors() {
        assert!(ClientError::Transport(TransportError::network("connection reset")).is_retryable());
        assert!(ClientError::Transport(TransportError::status(503, "busy")).is_retryable());
        assert!(!ClientError::Transport(TransportError::status(400, "bad")).is_retryable());
        assert!(!ClientError::AuthExpired("401".into()).is_retryable());
        assert!(!ClientError::Decryption("x".into()).is_retryable());
    }

    #[test]
    fn auth_classification() {
        assert!(ClientError::AuthExpired("401".into()).is_auth_expired());
        assert!(ClientError::NotAuthenticated.is_auth_expired());
        assert!(!ClientError::protocol("x").is_auth_expired());
    }

    #[test]
    fn error_display() {
        let err = ClientError::SequenceGap {
            expected: 11,
            found: 13,
        };
        assert_eq!(err.to_string(), "sequence gap: expected entry 11, found 13");
    }
}

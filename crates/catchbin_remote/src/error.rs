//! Error types for remote calls.

use thiserror::Error;

/// Result type for remote calls.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Errors returned by a [`crate::RemoteClient`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// The remote entity does not exist.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Entity kind ("session" or "request").
        kind: &'static str,
        /// The missing id.
        id: String,
    },

    /// Network or transport failure.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the call can be retried.
        retryable: bool,
    },

    /// The server answered but refused the operation.
    #[error("{operation} rejected: {reason}")]
    Rejected {
        /// Operation that was refused.
        operation: &'static str,
        /// Server-provided or derived reason.
        reason: String,
    },

    /// The response could not be understood.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The push channel is closed.
    #[error("push channel closed")]
    ChannelClosed,
}

impl RemoteError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Creates a rejection error.
    pub fn rejected(operation: &'static str, reason: impl Into<String>) -> Self {
        Self::Rejected {
            operation,
            reason: reason.into(),
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RemoteError::Transport { retryable: true, .. })
    }
}

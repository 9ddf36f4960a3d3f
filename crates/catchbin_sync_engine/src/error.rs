//! Error types for the sync engine.

use catchbin_model::ModelError;
use catchbin_remote::RemoteError;
use catchbin_storage::StorageError;
use thiserror::Error;

/// Result type for engine operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during engine operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Input rejected before any I/O.
    #[error("validation failed: {0}")]
    Validation(#[from] ModelError),

    /// The remote entity does not exist.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Entity kind ("session" or "request").
        kind: &'static str,
        /// The missing id.
        id: String,
    },

    /// Transport failure or a non-success result from the server.
    #[error("remote error: {0}")]
    Remote(RemoteError),

    /// The local store failed.
    #[error("local store error: {0}")]
    LocalStore(#[from] StorageError),
}

impl SyncError {
    /// Error for a delete the server reported as unsuccessful.
    pub(crate) fn declined(operation: &'static str) -> Self {
        Self::Remote(RemoteError::rejected(
            operation,
            "server reported failure",
        ))
    }

    /// Returns true if the failed call can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Remote(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Returns true if the failure came from the local store.
    pub fn is_local(&self) -> bool {
        matches!(self, SyncError::LocalStore(_))
    }

    /// Returns true if the remote entity does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SyncError::NotFound { .. })
    }
}

impl From<RemoteError> for SyncError {
    fn from(error: RemoteError) -> Self {
        match error {
            RemoteError::NotFound { kind, id } => SyncError::NotFound { kind, id },
            other => SyncError::Remote(other),
        }
    }
}

//! Validation errors for model types.

use thiserror::Error;

/// Result type for model validation.
pub type ModelResult<T> = Result<T, ModelError>;

/// Input rejected before any I/O takes place.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    /// A header name is empty or contains characters outside the HTTP token set.
    #[error("invalid header name: {name:?}")]
    InvalidHeaderName {
        /// The rejected name.
        name: String,
    },

    /// The configured response body exceeds the size limit.
    #[error("response body too large: {size} bytes exceeds maximum of {max} bytes")]
    BodyTooLarge {
        /// Size of the rejected body.
        size: usize,
        /// Maximum accepted size.
        max: usize,
    },

    /// An entity id is empty or contains path separators or whitespace.
    #[error("invalid {kind} id: {id:?}")]
    InvalidId {
        /// Entity kind ("session" or "request").
        kind: &'static str,
        /// The rejected id.
        id: String,
    },
}

impl ModelError {
    /// Validates an opaque entity id.
    ///
    /// Ids are server-assigned and otherwise opaque, but they end up in URL
    /// paths, so empty ids and ids with `/`, `?`, `#` or whitespace are refused.
    pub fn check_id(kind: &'static str, id: &str) -> ModelResult<()> {
        let bad = id.is_empty()
            || id
                .chars()
                .any(|c| c.is_whitespace() || matches!(c, '/' | '?' | '#'));
        if bad {
            return Err(ModelError::InvalidId {
                kind,
                id: id.to_string(),
            });
        }
        Ok(())
    }
}

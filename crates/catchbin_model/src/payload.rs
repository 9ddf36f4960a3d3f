//! Deferred request body.

use serde::{Deserialize, Serialize};

/// The body of a captured request.
///
/// Push events announce new requests without their body. The body starts
/// out [`Payload::Pending`] and moves to [`Payload::Resolved`] once it has
/// been fetched. Resolution happens at most once: a resolved payload is
/// never replaced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Payload {
    /// The body has not been fetched yet.
    #[default]
    Pending,
    /// The body bytes.
    Resolved(Vec<u8>),
}

impl Payload {
    /// Returns true once the body is known.
    pub fn is_resolved(&self) -> bool {
        matches!(self, Payload::Resolved(_))
    }

    /// Returns the body bytes if resolved.
    pub fn bytes(&self) -> Option<&[u8]> {
        match self {
            Payload::Pending => None,
            Payload::Resolved(bytes) => Some(bytes),
        }
    }

    /// Resolves a pending payload.
    ///
    /// Returns false and leaves the payload untouched if it was already
    /// resolved.
    pub fn resolve(&mut self, bytes: Vec<u8>) -> bool {
        match self {
            Payload::Pending => {
                *self = Payload::Resolved(bytes);
                true
            }
            Payload::Resolved(_) => false,
        }
    }
}

impl From<Option<Vec<u8>>> for Payload {
    fn from(bytes: Option<Vec<u8>>) -> Self {
        bytes.map_or(Payload::Pending, Payload::Resolved)
    }
}

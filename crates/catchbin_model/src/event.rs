//! Push channel events.

use crate::request::Request;

/// An event delivered by a session's push channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushEvent {
    /// A request was captured. The body is not included.
    Create(Request),
    /// A request was deleted.
    Delete {
        /// Id of the deleted request.
        request_id: String,
    },
    /// All requests of the session were deleted.
    Clear,
}

impl PushEvent {
    /// Short action name, as used on the wire.
    pub fn action(&self) -> &'static str {
        match self {
            PushEvent::Create(_) => "create",
            PushEvent::Delete { .. } => "delete",
            PushEvent::Clear => "clear",
        }
    }
}

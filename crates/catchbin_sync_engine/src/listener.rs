//! Push listeners.

use crate::error::SyncError;
use catchbin_model::Request;

/// Receives push events after the engine has applied them.
///
/// All methods default to doing nothing. Listeners run on the push
/// channel's task and must not block.
pub trait PushListener: Send + Sync + 'static {
    /// A request was captured and added to the list.
    fn on_create(&self, request: &Request) {
        let _ = request;
    }

    /// A request was deleted.
    fn on_delete(&self, request_id: &str) {
        let _ = request_id;
    }

    /// Every request of the session was deleted.
    fn on_clear(&self, session_id: &str) {
        let _ = session_id;
    }

    /// The channel reported an error or an event could not be applied.
    fn on_error(&self, error: &SyncError) {
        let _ = error;
    }
}

/// A listener that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopListener;

impl PushListener for NoopListener {}

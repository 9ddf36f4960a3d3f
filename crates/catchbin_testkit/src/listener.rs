//! A push listener that records what it is told.

use catchbin_model::Request;
use catchbin_sync_engine::{PushListener, SyncError};
use parking_lot::Mutex;
use std::sync::Arc;

/// One notification received by a [`RecordingListener`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recorded {
    /// A request was created; holds its id.
    Created(String),
    /// A request was deleted; holds its id.
    Deleted(String),
    /// A session's requests were cleared; holds the session id.
    Cleared(String),
    /// An error was reported; holds its message.
    Error(String),
}

/// Records every notification in arrival order.
#[derive(Debug, Default)]
pub struct RecordingListener {
    events: Mutex<Vec<Recorded>>,
}

impl RecordingListener {
    /// Creates a listener ready to hand to the engine.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every notification so far.
    pub fn events(&self) -> Vec<Recorded> {
        self.events.lock().clone()
    }

    /// Ids of created requests, in arrival order.
    pub fn created(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                Recorded::Created(id) => Some(id.clone()),
                _ => None,
            })
            .collect()
    }

    /// Error messages, in arrival order.
    pub fn errors(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                Recorded::Error(message) => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of notifications so far.
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Returns true if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    fn push(&self, event: Recorded) {
        self.events.lock().push(event);
    }
}

impl PushListener for RecordingListener {
    fn on_create(&self, request: &Request) {
        self.push(Recorded::Created(request.id.clone()));
    }

    fn on_delete(&self, request_id: &str) {
        self.push(Recorded::Deleted(request_id.to_string()));
    }

    fn on_clear(&self, session_id: &str) {
        self.push(Recorded::Cleared(session_id.to_string()));
    }

    fn on_error(&self, error: &SyncError) {
        self.push(Recorded::Error(error.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::request;

    #[test]
    fn records_in_order() {
        let listener = RecordingListener::new();
        listener.on_create(&request("r1", "s1", 0));
        listener.on_delete("r1");
        listener.on_clear("s1");

        assert_eq!(
            listener.events(),
            [
                Recorded::Created("r1".into()),
                Recorded::Deleted("r1".into()),
                Recorded::Cleared("s1".into()),
            ]
        );
        assert_eq!(listener.created(), ["r1"]);
        assert!(listener.errors().is_empty());
    }
}

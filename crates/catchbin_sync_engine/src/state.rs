//! Observable engine state.

use catchbin_model::{Request, Session};

/// The state the engine publishes to its observers.
///
/// Every change is published as a whole new snapshot; observers never see
/// a half-applied operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineState {
    /// The current session.
    pub session: Option<Session>,
    /// The current request.
    pub request: Option<Request>,
    /// Id of the most recently selected request.
    ///
    /// Set as soon as a request is selected, before `request` is known.
    pub selected_request_id: Option<String>,
    /// Requests of the current session, newest first.
    pub requests: Vec<Request>,
    /// Ids of every session known locally.
    pub all_session_ids: Vec<String>,
    /// The last-used session marker.
    pub last_used_session_id: Option<String>,
}

impl EngineState {
    /// Id of the current session.
    pub fn session_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.id.as_str())
    }

    /// Returns true if `session_id` is the current session.
    pub fn is_current_session(&self, session_id: &str) -> bool {
        self.session_id() == Some(session_id)
    }

    /// Finds a request of the current session.
    pub fn find_request(&self, request_id: &str) -> Option<&Request> {
        self.requests.iter().find(|r| r.id == request_id)
    }

    /// Clears the current request and selection.
    pub(crate) fn clear_request(&mut self) {
        self.request = None;
        self.selected_request_id = None;
    }

    /// Forgets sessions: drops them from the known list, the current
    /// session slot and the last-used marker.
    pub(crate) fn forget_sessions(&mut self, ids: &[String]) {
        self.all_session_ids.retain(|id| !ids.contains(id));
        if self.session_id().is_some_and(|id| ids.iter().any(|x| x == id)) {
            self.session = None;
            self.requests.clear();
            self.clear_request();
        }
        if self
            .last_used_session_id
            .as_ref()
            .is_some_and(|id| ids.contains(id))
        {
            self.last_used_session_id = None;
        }
    }

    /// Adds a session id to the known list if missing.
    pub(crate) fn remember_session(&mut self, id: &str) {
        if !self.all_session_ids.iter().any(|x| x == id) {
            self.all_session_ids.push(id.to_string());
        }
    }
}

/// Statistics about engine activity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Push events applied.
    pub push_events_applied: u64,
    /// Push events that arrived for a session that was no longer current.
    pub push_events_stale: u64,
    /// Push channel errors received.
    pub push_errors: u64,
    /// Push channels opened.
    pub channels_opened: u64,
    /// Payloads fetched and stored.
    pub payloads_resolved: u64,
    /// Payload fetches that failed.
    pub payload_failures: u64,
    /// Slow-phase results dropped because the selection had moved on.
    pub stale_results_discarded: u64,
    /// Sessions removed by reconciliation.
    pub sessions_pruned: u64,
}

//! The remote API contract.

use crate::error::RemoteResult;
use async_trait::async_trait;
use catchbin_model::{PushEvent, Request, Session, SessionOptions};
use std::collections::HashMap;
use std::fmt;
use tokio::sync::mpsc;

/// Remote API consumed by the sync engine.
///
/// Every call may fail with a [`crate::RemoteError`]. Calls that return
/// `bool` report the server's success flag; `false` means the server
/// declined the operation.
#[async_trait]
pub trait RemoteClient: Send + Sync + 'static {
    /// Creates a session from the given options.
    async fn create_session(&self, options: &SessionOptions) -> RemoteResult<Session>;

    /// Fetches a session by id.
    async fn get_session(&self, session_id: &str) -> RemoteResult<Session>;

    /// Deletes a session.
    async fn delete_session(&self, session_id: &str) -> RemoteResult<bool>;

    /// Reports which of the given sessions still exist remotely.
    async fn check_sessions_exist(&self, session_ids: &[String])
        -> RemoteResult<HashMap<String, bool>>;

    /// Lists the captured requests of a session.
    ///
    /// Payloads may be omitted.
    async fn get_session_requests(&self, session_id: &str) -> RemoteResult<Vec<Request>>;

    /// Fetches one captured request including its payload.
    async fn get_session_request(&self, session_id: &str, request_id: &str)
        -> RemoteResult<Request>;

    /// Deletes one captured request.
    async fn delete_session_request(&self, session_id: &str, request_id: &str)
        -> RemoteResult<bool>;

    /// Deletes every captured request of a session.
    async fn delete_all_session_requests(&self, session_id: &str) -> RemoteResult<bool>;

    /// Opens a push channel for a session.
    async fn subscribe_to_session_requests(&self, session_id: &str)
        -> RemoteResult<PushSubscription>;
}

/// Closes a push channel. Runs at most once, on [`PushCloser::close`] or drop.
#[must_use = "dropping a closer closes the channel"]
pub struct PushCloser {
    close: Option<Box<dyn FnOnce() + Send>>,
}

impl PushCloser {
    /// Creates a closer around the given function.
    pub fn new(close: impl FnOnce() + Send + 'static) -> Self {
        Self {
            close: Some(Box::new(close)),
        }
    }

    /// A closer with nothing to release.
    pub fn noop() -> Self {
        Self { close: None }
    }

    /// Closes the channel.
    pub fn close(mut self) {
        self.run();
    }

    fn run(&mut self) {
        if let Some(close) = self.close.take() {
            close();
        }
    }
}

impl Drop for PushCloser {
    fn drop(&mut self) {
        self.run();
    }
}

impl fmt::Debug for PushCloser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PushCloser")
            .field("open", &self.close.is_some())
            .finish()
    }
}

/// An open push channel for one session.
///
/// Events arrive on `events`; the channel ends when the sender side
/// closes. Dropping the subscription closes the channel.
#[derive(Debug)]
pub struct PushSubscription {
    /// Session this channel listens to.
    pub session_id: String,
    /// Incoming events and channel errors.
    pub events: mpsc::Receiver<RemoteResult<PushEvent>>,
    /// Releases the underlying channel.
    pub closer: PushCloser,
}

impl PushSubscription {
    /// Creates a subscription.
    pub fn new(
        session_id: impl Into<String>,
        events: mpsc::Receiver<RemoteResult<PushEvent>>,
        closer: PushCloser,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            events,
            closer,
        }
    }

    /// Receives the next event, or `None` once the channel has ended.
    pub async fn next(&mut self) -> Option<RemoteResult<PushEvent>> {
        self.events.recv().await
    }

    /// Closes the channel.
    pub fn close(self) {
        self.closer.close();
    }
}

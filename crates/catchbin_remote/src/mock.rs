//! In-memory remote for tests.
//!
//! [`MockRemote`] behaves like a small catchbin server: it assigns ids,
//! keeps sessions and captured requests, and pushes events to open
//! channels. Tests can count calls, inject failures, hold individual
//! request fetches and capture new requests.

use crate::client::{PushCloser, PushSubscription, RemoteClient};
use crate::error::{RemoteError, RemoteResult};
use async_trait::async_trait;
use catchbin_model::{insert_newest_first, PushEvent, Request, Session, SessionOptions};
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};

/// Remote endpoints, for call counting and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// `create_session`
    CreateSession,
    /// `get_session`
    GetSession,
    /// `delete_session`
    DeleteSession,
    /// `check_sessions_exist`
    CheckSessionsExist,
    /// `get_session_requests`
    GetSessionRequests,
    /// `get_session_request`
    GetSessionRequest,
    /// `delete_session_request`
    DeleteSessionRequest,
    /// `delete_all_session_requests`
    DeleteAllSessionRequests,
    /// `subscribe_to_session_requests`
    Subscribe,
}

const CHANNEL_CAPACITY: usize = 64;

#[derive(Default)]
struct MockState {
    sessions: HashMap<String, Session>,
    /// Newest first, with payloads.
    requests: HashMap<String, Vec<Request>>,
    channels: HashMap<u64, Channel>,
    next_channel: u64,
}

struct Channel {
    session_id: String,
    sender: mpsc::Sender<RemoteResult<PushEvent>>,
}

struct MockInner {
    state: Mutex<MockState>,
    calls: Mutex<HashMap<Endpoint, usize>>,
    failures: Mutex<HashMap<Endpoint, RemoteError>>,
    declines: Mutex<HashSet<Endpoint>>,
    gates: Mutex<HashMap<String, Arc<Notify>>>,
    connected: AtomicBool,
    channels_closed: AtomicUsize,
}

/// A mock remote for testing.
///
/// Cloning shares the same server state.
#[derive(Clone)]
pub struct MockRemote {
    inner: Arc<MockInner>,
}

impl Default for MockRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MockRemote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("MockRemote")
            .field("sessions", &state.sessions.len())
            .field("channels", &state.channels.len())
            .finish()
    }
}

impl MockRemote {
    /// Creates an empty mock remote.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MockInner {
                state: Mutex::new(MockState::default()),
                calls: Mutex::new(HashMap::new()),
                failures: Mutex::new(HashMap::new()),
                declines: Mutex::new(HashSet::new()),
                gates: Mutex::new(HashMap::new()),
                connected: AtomicBool::new(true),
                channels_closed: AtomicUsize::new(0),
            }),
        }
    }

    /// Adds or replaces a session.
    pub fn insert_session(&self, session: Session) {
        let mut state = self.inner.state.lock();
        state.requests.entry(session.id.clone()).or_default();
        state.sessions.insert(session.id.clone(), session);
    }

    /// Removes a session as if it had expired server side. No events are sent.
    pub fn expire_session(&self, session_id: &str) {
        let mut state = self.inner.state.lock();
        state.sessions.remove(session_id);
        state.requests.remove(session_id);
    }

    /// Adds a request without notifying channels.
    pub fn insert_request(&self, request: Request) {
        let mut state = self.inner.state.lock();
        let list = state.requests.entry(request.session_id.clone()).or_default();
        insert_newest_first(list, request);
    }

    /// Removes a request without notifying channels.
    pub fn remove_request(&self, request_id: &str) {
        let mut state = self.inner.state.lock();
        for list in state.requests.values_mut() {
            list.retain(|r| r.id != request_id);
        }
    }

    /// Captures a request: stores it and pushes a create event without the body.
    pub fn capture(&self, request: Request) {
        let event = PushEvent::Create(request.without_payload());
        let session_id = request.session_id.clone();
        self.insert_request(request);
        self.emit(&session_id, event);
    }

    /// Pushes an event to every open channel of a session.
    ///
    /// Server state is not changed.
    pub fn emit(&self, session_id: &str, event: PushEvent) {
        self.send(session_id, Ok(event));
    }

    /// Pushes an error to every open channel of a session.
    pub fn emit_error(&self, session_id: &str, error: RemoteError) {
        self.send(session_id, Err(error));
    }

    fn send(&self, session_id: &str, item: RemoteResult<PushEvent>) {
        let state = self.inner.state.lock();
        for channel in state.channels.values() {
            if channel.session_id == session_id {
                let _ = channel.sender.try_send(item.clone());
            }
        }
    }

    /// Makes every call to `endpoint` fail with `error` until cleared.
    pub fn fail(&self, endpoint: Endpoint, error: RemoteError) {
        self.inner.failures.lock().insert(endpoint, error);
    }

    /// Stops failing calls to `endpoint`.
    pub fn clear_failure(&self, endpoint: Endpoint) {
        self.inner.failures.lock().remove(&endpoint);
    }

    /// Makes a delete endpoint answer `false` until cleared.
    pub fn decline(&self, endpoint: Endpoint) {
        self.inner.declines.lock().insert(endpoint);
    }

    /// Stops declining calls to `endpoint`.
    pub fn clear_decline(&self, endpoint: Endpoint) {
        self.inner.declines.lock().remove(&endpoint);
    }

    /// Sets the connected state. Every call fails while disconnected.
    pub fn set_connected(&self, connected: bool) {
        self.inner.connected.store(connected, Ordering::SeqCst);
    }

    /// Holds fetches of a request until the returned gate is released.
    pub fn hold_request(&self, request_id: &str) -> RequestGate {
        let notify = Arc::new(Notify::new());
        self.inner
            .gates
            .lock()
            .insert(request_id.to_string(), Arc::clone(&notify));
        RequestGate {
            request_id: request_id.to_string(),
            notify,
            remote: self.clone(),
        }
    }

    /// Number of calls made to `endpoint`.
    pub fn calls(&self, endpoint: Endpoint) -> usize {
        self.inner.calls.lock().get(&endpoint).copied().unwrap_or(0)
    }

    /// Number of calls made to any endpoint.
    pub fn total_calls(&self) -> usize {
        self.inner.calls.lock().values().sum()
    }

    /// Resets all call counters.
    pub fn reset_calls(&self) {
        self.inner.calls.lock().clear();
    }

    /// Number of open push channels for a session.
    pub fn open_channels(&self, session_id: &str) -> usize {
        self.inner
            .state
            .lock()
            .channels
            .values()
            .filter(|c| c.session_id == session_id)
            .count()
    }

    /// Number of open push channels.
    pub fn total_open_channels(&self) -> usize {
        self.inner.state.lock().channels.len()
    }

    /// Number of channels closed by their subscriber.
    pub fn channels_closed(&self) -> usize {
        self.inner.channels_closed.load(Ordering::SeqCst)
    }

    /// Returns a session as the server holds it.
    pub fn session(&self, session_id: &str) -> Option<Session> {
        self.inner.state.lock().sessions.get(session_id).cloned()
    }

    /// Returns the requests of a session as the server holds them.
    pub fn requests(&self, session_id: &str) -> Vec<Request> {
        self.inner
            .state
            .lock()
            .requests
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Records the call and applies injected failures.
    fn enter(&self, endpoint: Endpoint) -> RemoteResult<()> {
        *self.inner.calls.lock().entry(endpoint).or_insert(0) += 1;
        if !self.inner.connected.load(Ordering::SeqCst) {
            return Err(RemoteError::transport_retryable("not connected"));
        }
        match self.inner.failures.lock().get(&endpoint) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn declined(&self, endpoint: Endpoint) -> bool {
        self.inner.declines.lock().contains(&endpoint)
    }

    fn session_not_found(session_id: &str) -> RemoteError {
        RemoteError::NotFound {
            kind: "session",
            id: session_id.to_string(),
        }
    }
}

/// Holds fetches of one request until released.
pub struct RequestGate {
    request_id: String,
    notify: Arc<Notify>,
    remote: MockRemote,
}

impl RequestGate {
    /// Lets one held (or the next) fetch of the request proceed.
    pub fn release_one(&self) {
        self.notify.notify_one();
    }

    /// Lets every current and future fetch proceed.
    pub fn release(self) {
        self.remote.inner.gates.lock().remove(&self.request_id);
        self.notify.notify_one();
        self.notify.notify_waiters();
    }
}

#[async_trait]
impl RemoteClient for MockRemote {
    async fn create_session(&self, options: &SessionOptions) -> RemoteResult<Session> {
        self.enter(Endpoint::CreateSession)?;
        let normalized = options
            .normalize()
            .map_err(|e| RemoteError::rejected("create session", e.to_string()))?;
        let id = uuid::Uuid::new_v4().simple().to_string();
        let session = normalized.into_session(id, Utc::now());
        self.insert_session(session.clone());
        Ok(session)
    }

    async fn get_session(&self, session_id: &str) -> RemoteResult<Session> {
        self.enter(Endpoint::GetSession)?;
        self.session(session_id)
            .ok_or_else(|| Self::session_not_found(session_id))
    }

    async fn delete_session(&self, session_id: &str) -> RemoteResult<bool> {
        self.enter(Endpoint::DeleteSession)?;
        if self.declined(Endpoint::DeleteSession) {
            return Ok(false);
        }
        let mut state = self.inner.state.lock();
        state.requests.remove(session_id);
        Ok(state.sessions.remove(session_id).is_some())
    }

    async fn check_sessions_exist(
        &self,
        session_ids: &[String],
    ) -> RemoteResult<HashMap<String, bool>> {
        self.enter(Endpoint::CheckSessionsExist)?;
        let state = self.inner.state.lock();
        Ok(session_ids
            .iter()
            .map(|id| (id.clone(), state.sessions.contains_key(id)))
            .collect())
    }

    async fn get_session_requests(&self, session_id: &str) -> RemoteResult<Vec<Request>> {
        self.enter(Endpoint::GetSessionRequests)?;
        let state = self.inner.state.lock();
        if !state.sessions.contains_key(session_id) {
            return Err(Self::session_not_found(session_id));
        }
        // Lists omit bodies, like the real API.
        Ok(state
            .requests
            .get(session_id)
            .map(|list| list.iter().map(Request::without_payload).collect())
            .unwrap_or_default())
    }

    async fn get_session_request(
        &self,
        session_id: &str,
        request_id: &str,
    ) -> RemoteResult<Request> {
        self.enter(Endpoint::GetSessionRequest)?;
        let gate = self.inner.gates.lock().get(request_id).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let state = self.inner.state.lock();
        state
            .requests
            .get(session_id)
            .and_then(|list| list.iter().find(|r| r.id == request_id))
            .cloned()
            .ok_or_else(|| RemoteError::NotFound {
                kind: "request",
                id: request_id.to_string(),
            })
    }

    async fn delete_session_request(
        &self,
        session_id: &str,
        request_id: &str,
    ) -> RemoteResult<bool> {
        self.enter(Endpoint::DeleteSessionRequest)?;
        if self.declined(Endpoint::DeleteSessionRequest) {
            return Ok(false);
        }
        let mut state = self.inner.state.lock();
        let Some(list) = state.requests.get_mut(session_id) else {
            return Ok(false);
        };
        let before = list.len();
        list.retain(|r| r.id != request_id);
        Ok(list.len() < before)
    }

    async fn delete_all_session_requests(&self, session_id: &str) -> RemoteResult<bool> {
        self.enter(Endpoint::DeleteAllSessionRequests)?;
        if self.declined(Endpoint::DeleteAllSessionRequests) {
            return Ok(false);
        }
        let mut state = self.inner.state.lock();
        if !state.sessions.contains_key(session_id) {
            return Ok(false);
        }
        if let Some(list) = state.requests.get_mut(session_id) {
            list.clear();
        }
        Ok(true)
    }

    async fn subscribe_to_session_requests(
        &self,
        session_id: &str,
    ) -> RemoteResult<PushSubscription> {
        self.enter(Endpoint::Subscribe)?;
        let (sender, events) = mpsc::channel(CHANNEL_CAPACITY);
        let id = {
            let mut state = self.inner.state.lock();
            let id = state.next_channel;
            state.next_channel += 1;
            state.channels.insert(
                id,
                Channel {
                    session_id: session_id.to_string(),
                    sender,
                },
            );
            id
        };

        let inner = Arc::downgrade(&self.inner);
        let closer = PushCloser::new(move || {
            if let Some(inner) = inner.upgrade() {
                if inner.state.lock().channels.remove(&id).is_some() {
                    inner.channels_closed.fetch_add(1, Ordering::SeqCst);
                }
            }
        });
        Ok(PushSubscription::new(session_id, events, closer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catchbin_model::Payload;
    use chrono::{Duration, TimeZone};

    fn request(id: &str, session_id: &str, secs: i64) -> Request {
        Request {
            id: id.into(),
            session_id: session_id.into(),
            client_address: "10.0.0.1".into(),
            method: "POST".into(),
            url: "/".into(),
            headers: vec![],
            captured_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::seconds(secs),
            payload: Payload::Resolved(id.as_bytes().to_vec()),
        }
    }

    #[tokio::test]
    async fn create_assigns_id_and_normalizes() {
        let remote = MockRemote::new();
        let session = remote
            .create_session(&SessionOptions::new().with_status_code(1000))
            .await
            .unwrap();
        assert_eq!(session.id.len(), 32);
        assert_eq!(session.status_code, 599);
        assert_eq!(remote.get_session(&session.id).await.unwrap(), session);
        assert_eq!(remote.calls(Endpoint::CreateSession), 1);
        assert_eq!(remote.calls(Endpoint::GetSession), 1);
    }

    #[tokio::test]
    async fn lists_omit_payloads_but_fetch_includes_them() {
        let remote = MockRemote::new();
        let session = remote.create_session(&SessionOptions::new()).await.unwrap();
        remote.insert_request(request("r1", &session.id, 1));
        remote.insert_request(request("r2", &session.id, 2));

        let list = remote.get_session_requests(&session.id).await.unwrap();
        assert_eq!(list[0].id, "r2");
        assert!(list.iter().all(|r| !r.payload.is_resolved()));

        let full = remote.get_session_request(&session.id, "r1").await.unwrap();
        assert_eq!(full.payload.bytes(), Some(&b"r1"[..]));
    }

    #[tokio::test]
    async fn failures_and_declines() {
        let remote = MockRemote::new();
        let session = remote.create_session(&SessionOptions::new()).await.unwrap();

        remote.fail(Endpoint::GetSession, RemoteError::transport_fatal("down"));
        assert!(remote.get_session(&session.id).await.is_err());
        remote.clear_failure(Endpoint::GetSession);
        assert!(remote.get_session(&session.id).await.is_ok());

        remote.decline(Endpoint::DeleteSession);
        assert!(!remote.delete_session(&session.id).await.unwrap());
        remote.clear_decline(Endpoint::DeleteSession);
        assert!(remote.delete_session(&session.id).await.unwrap());
        assert!(!remote.delete_session(&session.id).await.unwrap());

        remote.set_connected(false);
        assert!(remote
            .check_sessions_exist(&[session.id.clone()])
            .await
            .unwrap_err()
            .is_retryable());
    }

    #[tokio::test]
    async fn capture_reaches_open_channels() {
        let remote = MockRemote::new();
        let session = remote.create_session(&SessionOptions::new()).await.unwrap();
        let mut sub = remote
            .subscribe_to_session_requests(&session.id)
            .await
            .unwrap();
        assert_eq!(remote.open_channels(&session.id), 1);

        remote.capture(request("r1", &session.id, 1));
        match sub.next().await {
            Some(Ok(PushEvent::Create(r))) => {
                assert_eq!(r.id, "r1");
                assert!(!r.payload.is_resolved());
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(remote.requests(&session.id).len(), 1);

        sub.close();
        assert_eq!(remote.open_channels(&session.id), 0);
        assert_eq!(remote.channels_closed(), 1);
    }

    #[tokio::test]
    async fn held_fetch_waits_for_release() {
        let remote = MockRemote::new();
        let session = remote.create_session(&SessionOptions::new()).await.unwrap();
        remote.insert_request(request("r1", &session.id, 1));
        let gate = remote.hold_request("r1");

        let fetch = {
            let remote = remote.clone();
            let sid = session.id.clone();
            tokio::spawn(async move { remote.get_session_request(&sid, "r1").await })
        };
        tokio::task::yield_now().await;
        assert!(!fetch.is_finished());

        gate.release_one();
        assert_eq!(fetch.await.unwrap().unwrap().id, "r1");
    }
}

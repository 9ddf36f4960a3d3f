//! Test fixtures and engine helpers.
//!
//! Provides canned sessions and requests, engines wired to an in-memory
//! store and a [`MockRemote`], and helpers for waiting on state that
//! changes in the background.

use catchbin_model::{Header, Payload, Request, Session, SessionOptions, Timestamp};
use catchbin_remote::MockRemote;
use catchbin_storage::{FileBackend, InMemoryBackend, LogStore};
use catchbin_sync_engine::{EngineConfig, EngineState, SyncEngine};
use chrono::{Duration, TimeZone, Utc};
use std::path::PathBuf;
use std::time::Duration as StdDuration;
use tempfile::TempDir;

/// An engine over an in-memory store and a mock remote.
pub type TestEngine = SyncEngine<LogStore<InMemoryBackend>, MockRemote>;

/// How long background helpers wait before giving up.
pub const WAIT_TIMEOUT: StdDuration = StdDuration::from_secs(5);

/// A fixed point in time plus `secs` seconds.
pub fn timestamp(secs: i64) -> Timestamp {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .single()
        .expect("valid fixed timestamp")
        + Duration::seconds(secs)
}

/// Options used by the creation scenario: 201, `X-A: 1`, no delay, body "ok".
pub fn scenario_options() -> SessionOptions {
    SessionOptions::new()
        .with_status_code(201)
        .with_header("X-A", "1")
        .with_delay_seconds(0)
        .with_response_body("ok")
}

/// A session with default settings.
pub fn session(id: &str) -> Session {
    SessionOptions::new()
        .normalize()
        .expect("default options are valid")
        .into_session(id, timestamp(0))
}

/// A captured request with a pending payload, captured `secs` after [`timestamp`]'s origin.
pub fn request(id: &str, session_id: &str, secs: i64) -> Request {
    Request {
        id: id.to_string(),
        session_id: session_id.to_string(),
        client_address: "203.0.113.9".to_string(),
        method: "POST".to_string(),
        url: format!("/{}/{}", session_id, id),
        headers: vec![Header::new("Content-Type", "application/json")],
        captured_at: timestamp(secs),
        payload: Payload::Pending,
    }
}

/// A captured request with a resolved payload.
pub fn request_with_payload(id: &str, session_id: &str, secs: i64, payload: &[u8]) -> Request {
    Request {
        payload: Payload::Resolved(payload.to_vec()),
        ..request(id, session_id, secs)
    }
}

/// `count` requests `r0..` with payloads `body-N`, oldest first.
pub fn requests(session_id: &str, count: usize) -> Vec<Request> {
    (0..count)
        .map(|i| {
            request_with_payload(
                &format!("r{}", i),
                session_id,
                i as i64,
                format!("body-{}", i).as_bytes(),
            )
        })
        .collect()
}

/// Ids of the given requests, in order.
pub fn ids(requests: &[Request]) -> Vec<String> {
    requests.iter().map(|r| r.id.clone()).collect()
}

/// Creates an engine with the default configuration.
pub fn test_engine() -> TestEngine {
    test_engine_with(EngineConfig::default())
}

/// Creates an engine with the given configuration.
pub fn test_engine_with(config: EngineConfig) -> TestEngine {
    engine_with(config, LogStore::in_memory(), MockRemote::new())
}

/// Creates an engine over an existing store and remote.
pub fn engine_with(
    config: EngineConfig,
    store: LogStore<InMemoryBackend>,
    remote: MockRemote,
) -> TestEngine {
    SyncEngine::new(config, store, remote)
}

/// A store file in a temporary directory, removed on drop.
pub struct TempStore {
    /// Path of the store file.
    pub path: PathBuf,
    _temp_dir: TempDir,
}

impl TempStore {
    /// Creates a fresh temporary location.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        Self {
            path: temp_dir.path().join("catchbin.log"),
            _temp_dir: temp_dir,
        }
    }

    /// Opens the store file.
    pub fn open(&self) -> LogStore<FileBackend> {
        LogStore::open_path(&self.path).expect("Failed to open store")
    }
}

impl Default for TempStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Waits until the engine state satisfies `predicate` and returns it.
///
/// # Panics
///
/// Panics after [`WAIT_TIMEOUT`].
pub async fn wait_for_state<S, R>(
    engine: &SyncEngine<S, R>,
    mut predicate: impl FnMut(&EngineState) -> bool,
) -> EngineState
where
    S: catchbin_storage::LocalStore,
    R: catchbin_remote::RemoteClient,
{
    let mut rx = engine.subscribe();
    let result = tokio::time::timeout(WAIT_TIMEOUT, async {
        let state = rx
            .wait_for(|state| predicate(state))
            .await
            .expect("engine state channel closed");
        state.clone()
    })
    .await;
    result.unwrap_or_else(|_| panic!("timed out waiting for engine state: {:?}", engine.state()))
}

/// Polls `condition` until it holds.
///
/// # Panics
///
/// Panics after [`WAIT_TIMEOUT`].
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + WAIT_TIMEOUT;
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met in time"
        );
        tokio::time::sleep(StdDuration::from_millis(5)).await;
    }
}

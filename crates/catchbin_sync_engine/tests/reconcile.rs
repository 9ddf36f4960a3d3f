//! Integration tests for startup loading and existence reconciliation.

use catchbin_remote::{Endpoint, MockRemote, RemoteError};
use catchbin_storage::{LocalStore, LogStore};
use catchbin_sync_engine::EngineConfig;
use catchbin_testkit::prelude::*;

/// A store that knows sessions A, B and C, each with one request, and a
/// remote that still has A and C.
async fn known_abc() -> (LogStore<catchbin_storage::InMemoryBackend>, MockRemote) {
    let store = LogStore::in_memory();
    let remote = MockRemote::new();
    for id in ["A", "B", "C"] {
        store.put_session(&session(id)).await.unwrap();
        store
            .put_request(&request(&format!("{}-r", id), id, 1))
            .await
            .unwrap();
        if id != "B" {
            remote.insert_session(session(id));
        }
    }
    (store, remote)
}

#[tokio::test]
async fn missing_sessions_are_pruned() {
    let (store, remote) = known_abc().await;
    let engine = engine_with(
        EngineConfig::default().with_reconcile_on_start(false),
        store,
        remote,
    );
    engine.load().await.unwrap();

    let pruned = engine.reconcile_known_sessions().await.unwrap();

    assert_eq!(pruned, ["B"]);
    let mut known = engine.all_session_ids();
    known.sort();
    assert_eq!(known, ["A", "C"]);
    assert!(engine.store().session("B").is_none());
    assert!(engine.store().request("B-r").is_none());
    assert!(engine.store().request("A-r").is_some());
    assert_eq!(engine.remote().calls(Endpoint::CheckSessionsExist), 1);
    assert_eq!(engine.stats().sessions_pruned, 1);
}

#[tokio::test]
async fn load_reconciles_by_default() {
    let (store, remote) = known_abc().await;
    store.set_last_used_session(Some("B")).await.unwrap();
    let engine = engine_with(EngineConfig::default(), store, remote);

    engine.load().await.unwrap();

    assert!(!engine.all_session_ids().contains(&"B".to_string()));
    assert_eq!(engine.last_used_session_id(), None);
    assert_eq!(engine.store().last_used(), None);
}

#[tokio::test]
async fn empty_store_makes_no_call() {
    let engine = test_engine();
    let pruned = engine.reconcile_known_sessions().await.unwrap();
    assert!(pruned.is_empty());
    assert_eq!(engine.remote().total_calls(), 0);
}

#[tokio::test]
async fn failed_check_keeps_everything() {
    let (store, remote) = known_abc().await;
    remote.fail(
        Endpoint::CheckSessionsExist,
        RemoteError::transport_retryable("offline"),
    );
    let engine = engine_with(
        EngineConfig::default().with_reconcile_on_start(false),
        store,
        remote,
    );
    engine.load().await.unwrap();

    let err = engine.reconcile_known_sessions().await.unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(engine.all_session_ids().len(), 3);
    assert_eq!(engine.store().stats().sessions, 3);
}

#[tokio::test]
async fn failed_startup_reconcile_still_loads() {
    let (store, remote) = known_abc().await;
    store.set_last_used_session(Some("A")).await.unwrap();
    remote.fail(
        Endpoint::CheckSessionsExist,
        RemoteError::transport_retryable("offline"),
    );
    let engine = engine_with(EngineConfig::default(), store, remote);

    engine.load().await.unwrap();

    assert_eq!(engine.remote().calls(Endpoint::CheckSessionsExist), 1);
    assert_eq!(engine.all_session_ids().len(), 3);
    assert_eq!(engine.last_used_session_id().as_deref(), Some("A"));
    assert_eq!(engine.stats().sessions_pruned, 0);
}

#[tokio::test]
async fn pruning_current_session_clears_it() {
    let (store, remote) = known_abc().await;
    let engine = engine_with(
        EngineConfig::default().with_reconcile_on_start(false),
        store,
        remote,
    );
    engine.load().await.unwrap();
    engine.remote().insert_session(session("B"));
    engine
        .switch_to_session("B", RecordingListener::new())
        .await
        .unwrap()
        .complete()
        .await
        .unwrap();
    assert_eq!(engine.remote().open_channels("B"), 1);

    engine.remote().expire_session("B");
    engine.reconcile_known_sessions().await.unwrap();

    assert_eq!(engine.session(), None);
    assert!(engine.requests().is_empty());
    assert_eq!(engine.remote().open_channels("B"), 0);
    assert_eq!(engine.push_session_id(), None);
}

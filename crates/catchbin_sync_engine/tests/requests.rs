//! Integration tests for request selection and removal.

use catchbin_model::PushEvent;
use catchbin_remote::{Endpoint, RemoteError};
use catchbin_sync_engine::SyncError;
use catchbin_testkit::prelude::*;

/// Creates a session with `count` requests on the server and switches to it.
async fn engine_with_requests(count: usize) -> (TestEngine, String) {
    let engine = test_engine();
    let session = engine.new_session(&scenario_options()).await.unwrap();
    for request in requests(&session.id, count) {
        engine.remote().insert_request(request);
    }
    engine
        .switch_to_session(&session.id, RecordingListener::new())
        .await
        .unwrap()
        .complete()
        .await
        .unwrap();
    engine.remote().reset_calls();
    (engine, session.id)
}

#[tokio::test]
async fn remove_all_is_one_remote_call() {
    let (engine, sid) = engine_with_requests(5).await;
    assert_eq!(engine.requests().len(), 5);

    let phased = engine.remove_all_requests(&sid).await.unwrap();
    assert!(engine.requests().is_empty());
    assert_eq!(engine.store().requests_for(&sid).len(), 0);
    assert_eq!(engine.remote().total_calls(), 0);

    phased.slow.await.unwrap();
    assert_eq!(engine.remote().calls(Endpoint::DeleteAllSessionRequests), 1);
    assert_eq!(engine.remote().calls(Endpoint::DeleteSessionRequest), 0);
    assert!(engine.remote().requests(&sid).is_empty());
}

#[tokio::test]
async fn selection_publishes_cached_then_full_request() {
    let (engine, sid) = engine_with_requests(2).await;

    let phased = engine.switch_to_request(&sid, Some("r1")).await.unwrap();
    let fast = phased.fast.clone().unwrap();
    assert_eq!(fast.id, "r1");
    assert!(!fast.payload.is_resolved());
    assert_eq!(engine.state().selected_request_id.as_deref(), Some("r1"));

    phased.slow.await.unwrap();
    let current = engine.request().unwrap();
    assert_eq!(current.payload.bytes(), Some(&b"body-1"[..]));
    let listed = engine.state().find_request("r1").cloned().unwrap();
    assert!(listed.payload.is_resolved());
    assert!(engine.store().request("r1").unwrap().payload.is_resolved());
}

#[tokio::test]
async fn resolved_request_needs_no_fetch() {
    let (engine, sid) = engine_with_requests(1).await;
    engine
        .switch_to_request(&sid, Some("r0"))
        .await
        .unwrap()
        .complete()
        .await
        .unwrap();
    engine.remote().reset_calls();

    engine
        .switch_to_request(&sid, Some("r0"))
        .await
        .unwrap()
        .complete()
        .await
        .unwrap();
    assert_eq!(engine.remote().total_calls(), 0);
}

#[tokio::test]
async fn uncached_request_is_fetched_and_stored() {
    let (engine, sid) = engine_with_requests(0).await;
    engine
        .remote()
        .insert_request(request_with_payload("late", &sid, 50, b"late body"));

    let phased = engine.switch_to_request(&sid, Some("late")).await.unwrap();
    assert_eq!(phased.fast, None);

    phased.slow.await.unwrap();
    assert_eq!(engine.request().map(|r| r.id), Some("late".to_string()));
    assert!(engine.store().request("late").is_some());
}

#[tokio::test]
async fn clearing_selection_is_immediate() {
    let (engine, sid) = engine_with_requests(1).await;
    engine
        .switch_to_request(&sid, Some("r0"))
        .await
        .unwrap()
        .complete()
        .await
        .unwrap();

    let phased = engine.switch_to_request(&sid, None).await.unwrap();
    assert_eq!(phased.fast, None);
    assert_eq!(engine.request(), None);
    assert_eq!(engine.state().selected_request_id, None);
}

#[tokio::test]
async fn late_fetch_does_not_replace_newer_selection() {
    let (engine, sid) = engine_with_requests(2).await;
    let gate = engine.remote().hold_request("r0");

    let first = engine.switch_to_request(&sid, Some("r0")).await.unwrap();
    let first = first.slow.spawn();
    tokio::task::yield_now().await;

    engine
        .switch_to_request(&sid, Some("r1"))
        .await
        .unwrap()
        .complete()
        .await
        .unwrap();
    assert_eq!(engine.request().map(|r| r.id), Some("r1".to_string()));

    gate.release();
    first.await.unwrap().unwrap();

    assert_eq!(engine.request().map(|r| r.id), Some("r1".to_string()));
    assert_eq!(engine.state().selected_request_id.as_deref(), Some("r1"));
    assert_eq!(engine.stats().stale_results_discarded, 1);
}

#[tokio::test]
async fn request_deleted_during_fetch_is_not_stored() {
    let (engine, sid) = engine_with_requests(0).await;
    engine
        .remote()
        .insert_request(request_with_payload("rx", &sid, 1, b"late"));
    let gate = engine.remote().hold_request("rx");

    let selected = engine.switch_to_request(&sid, Some("rx")).await.unwrap();
    assert_eq!(selected.fast, None);
    let fetch = selected.slow.spawn();
    tokio::task::yield_now().await;

    engine
        .ingest(
            &sid,
            PushEvent::Delete {
                request_id: "rx".into(),
            },
        )
        .await
        .unwrap();
    gate.release();
    fetch.await.unwrap().unwrap();

    assert!(engine.store().request("rx").is_none());
    assert_eq!(engine.request(), None);
    assert_eq!(engine.state().selected_request_id, None);
    assert_eq!(engine.stats().stale_results_discarded, 1);
}

#[tokio::test]
async fn remove_request_is_optimistic() {
    let (engine, sid) = engine_with_requests(3).await;
    engine
        .switch_to_request(&sid, Some("r1"))
        .await
        .unwrap()
        .complete()
        .await
        .unwrap();

    let phased = engine.remove_request(&sid, "r1").await.unwrap();
    assert_eq!(ids(&engine.requests()), ["r2", "r0"]);
    assert_eq!(engine.request(), None);
    assert!(engine.store().request("r1").is_none());

    phased.slow.await.unwrap();
    assert_eq!(ids(&engine.remote().requests(&sid)), ["r2", "r0"]);
}

#[tokio::test]
async fn failed_remote_remove_is_reported_not_rolled_back() {
    let (engine, sid) = engine_with_requests(2).await;
    engine.remote().fail(
        Endpoint::DeleteSessionRequest,
        RemoteError::transport_fatal("boom"),
    );

    let phased = engine.remove_request(&sid, "r0").await.unwrap();
    let err = phased.slow.await.unwrap_err();

    assert!(matches!(err, SyncError::Remote(RemoteError::Transport { .. })));
    assert_eq!(ids(&engine.requests()), ["r1"]);
    assert!(engine.store().request("r0").is_none());
}

#[tokio::test]
async fn declined_clear_is_an_error() {
    let (engine, sid) = engine_with_requests(2).await;
    engine.remote().decline(Endpoint::DeleteAllSessionRequests);

    let phased = engine.remove_all_requests(&sid).await.unwrap();
    let err = phased.slow.await.unwrap_err();

    assert!(matches!(err, SyncError::Remote(RemoteError::Rejected { .. })));
    assert!(engine.requests().is_empty());
}

#[tokio::test]
async fn empty_ids_are_rejected() {
    let (engine, sid) = engine_with_requests(0).await;
    let err = engine.remove_request(&sid, "").await.unwrap_err();
    assert!(matches!(err, SyncError::Validation(_)));
    let err = engine.switch_to_request("", Some("r0")).await.unwrap_err();
    assert!(matches!(err, SyncError::Validation(_)));
}

//! Replay, torn-tail recovery and compaction of file-backed stores.

use catchbin_model::{Header, Payload, Request, Session, SessionOptions};
use catchbin_storage::{
    FileBackend, InMemoryBackend, LocalStore, LogRecord, LogStore, StorageBackend, StorageError,
    StoreOp,
};
use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use std::io::Write;
use tempfile::tempdir;

fn request(id: &str, session_id: &str, secs: i64) -> Request {
    Request {
        id: id.into(),
        session_id: session_id.into(),
        client_address: "192.0.2.7".into(),
        method: "PUT".into(),
        url: format!("/{}", id),
        headers: vec![Header::new("Content-Type", "application/json")],
        captured_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::seconds(secs),
        payload: Payload::Pending,
    }
}

async fn populate(store: &LogStore<FileBackend>) {
    let session = SessionOptions::new()
        .with_status_code(201)
        .with_header("X-A", "1")
        .with_response_body("ok")
        .normalize()
        .unwrap()
        .into_session("s1", Utc::now());
    store.put_session(&session).await.unwrap();
    store
        .put_requests(&[request("r1", "s1", 1), request("r2", "s1", 2)])
        .await
        .unwrap();
    store.resolve_payload("r1", b"{}".to_vec()).await.unwrap();
    store.set_last_used_session(Some("s1")).await.unwrap();
}

#[tokio::test]
async fn reopen_restores_everything() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("store.log");

    {
        let store = LogStore::open_path(&path).unwrap();
        populate(&store).await;
    }

    let store = LogStore::open_path(&path).unwrap();
    let session = store.session("s1").unwrap();
    assert_eq!(session.status_code, 201);
    assert_eq!(session.response_body, b"ok");
    assert_eq!(store.last_used().as_deref(), Some("s1"));

    let requests = store.requests_for("s1");
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].id, "r2");
    assert_eq!(requests[1].payload.bytes(), Some(&b"{}"[..]));
    assert_eq!(store.stats().records, 4);
}

#[tokio::test]
async fn torn_tail_is_dropped() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("store.log");

    let good_len = {
        let store = LogStore::open_path(&path).unwrap();
        populate(&store).await;
        store.stats().log_bytes
    };

    // Simulate a crash half way through the next record.
    {
        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"CBLG\x01\x00\xff").unwrap();
    }

    let store = LogStore::open_path(&path).unwrap();
    assert_eq!(store.stats().log_bytes, good_len);
    assert_eq!(store.requests_for("s1").len(), 2);

    // The store keeps accepting writes after recovery.
    store.put_request(&request("r3", "s1", 3)).await.unwrap();
    drop(store);
    let store = LogStore::open_path(&path).unwrap();
    assert_eq!(store.requests_for("s1").len(), 3);
}

#[test]
fn damaged_record_is_corruption() {
    let mut backend = InMemoryBackend::new();
    let frame = LogRecord::new(vec![StoreOp::SetLastUsed(Some("s1".into()))])
        .encode()
        .unwrap();
    let mut damaged = frame.clone();
    let last = damaged.len() - 1;
    damaged[last] ^= 0xff;
    backend.append(&damaged).unwrap();
    backend.append(&frame).unwrap();

    assert!(matches!(
        LogStore::open(backend),
        Err(StorageError::Corrupted { offset: 0, .. })
    ));
}

#[tokio::test]
async fn compaction_keeps_contents() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("store.log");

    let store = LogStore::open_path(&path).unwrap();
    populate(&store).await;
    for i in 0..20 {
        let id = format!("tmp{}", i);
        store.put_request(&request(&id, "s1", 10 + i)).await.unwrap();
        store.delete_requests(&[id]).await.unwrap();
    }

    let expected = store.compacted_size().unwrap();
    let result = store.compact().unwrap();
    assert!(result.bytes_after < result.bytes_before);
    assert_eq!(result.bytes_after, expected);
    assert_eq!(store.stats().records, 1);
    drop(store);

    let store = LogStore::open_path(&path).unwrap();
    assert_eq!(store.stats().sessions, 1);
    assert_eq!(store.stats().requests, 2);
    assert_eq!(store.stats().resolved_payloads, 1);
    assert_eq!(store.last_used().as_deref(), Some("s1"));
}

#[test]
fn store_file_is_single_owner() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("store.log");

    let _store = LogStore::open_path(&path).unwrap();
    assert!(matches!(
        LogStore::open_path(&path),
        Err(StorageError::Locked(_))
    ));
}

fn op_strategy() -> impl Strategy<Value = StoreOp> {
    let session_id = (0..3u8).prop_map(|i| format!("s{}", i));
    let request_id = 0..6u8;
    prop_oneof![
        session_id.clone().prop_map(|id| StoreOp::PutSession(
            SessionOptions::new()
                .normalize()
                .unwrap()
                .into_session(id, Utc.timestamp_opt(1_700_000_000, 0).unwrap())
        )),
        session_id.clone().prop_map(StoreOp::DeleteSession),
        (request_id.clone(), 0i64..20, prop::option::of(prop::collection::vec(any::<u8>(), 0..8)))
            .prop_map(|(i, secs, body)| {
                let mut r = request(&format!("r{}", i), &format!("s{}", i % 3), secs);
                if let Some(body) = body {
                    r.payload = Payload::Resolved(body);
                }
                StoreOp::PutRequest(r)
            }),
        request_id.prop_map(|i| StoreOp::DeleteRequest(format!("r{}", i))),
        session_id.clone().prop_map(StoreOp::ClearRequests),
        prop::option::of(session_id).prop_map(StoreOp::SetLastUsed),
    ]
}

type Contents = (Vec<Session>, Vec<Vec<Request>>, Option<String>, usize);

fn contents(store: &LogStore<FileBackend>) -> Contents {
    let sessions = store.sessions();
    let requests = (0..3).map(|i| store.requests_for(&format!("s{}", i))).collect();
    (sessions, requests, store.last_used(), store.stats().requests)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn compaction_preserves_replayed_state(
        batches in prop::collection::vec(prop::collection::vec(op_strategy(), 1..4), 1..12)
    ) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.log");
        let mut bytes = Vec::new();
        for ops in batches {
            bytes.extend(LogRecord::new(ops).encode().unwrap());
        }
        std::fs::write(&path, bytes).unwrap();

        let before = {
            let store = LogStore::open_path(&path).unwrap();
            let before = contents(&store);
            store.compact().unwrap();
            before
        };

        let store = LogStore::open_path(&path).unwrap();
        prop_assert_eq!(store.stats().records, 1);
        prop_assert_eq!(contents(&store), before);
    }
}

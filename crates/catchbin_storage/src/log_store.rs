//! Append-only log store.

use crate::backend::StorageBackend;
use crate::error::StorageResult;
use crate::file::FileBackend;
use crate::memory::InMemoryBackend;
use crate::record::{read_record, LogRecord, ReadOutcome, StoreOp};
use crate::store::LocalStore;
use async_trait::async_trait;
use catchbin_model::{sort_newest_first, Request, Session};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{debug, info, warn};

/// Counters describing a store's contents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Number of stored sessions.
    pub sessions: usize,
    /// Number of stored requests.
    pub requests: usize,
    /// Number of requests whose payload is resolved.
    pub resolved_payloads: usize,
    /// Number of records in the log.
    pub records: u64,
    /// Size of the log in bytes.
    pub log_bytes: u64,
}

/// Result of a compaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactionResult {
    /// Log size before compaction.
    pub bytes_before: u64,
    /// Log size after compaction.
    pub bytes_after: u64,
    /// Records before compaction.
    pub records_before: u64,
}

/// In-memory indexes rebuilt from the log.
#[derive(Debug, Default)]
struct Index {
    sessions: HashMap<String, Session>,
    requests: HashMap<String, Request>,
    by_session: HashMap<String, HashSet<String>>,
    last_used: Option<String>,
}

impl Index {
    fn apply(&mut self, op: StoreOp) {
        match op {
            StoreOp::PutSession(session) => {
                self.sessions.insert(session.id.clone(), session);
            }
            StoreOp::DeleteSession(id) => {
                self.sessions.remove(&id);
                self.clear_requests(&id);
            }
            StoreOp::PutRequest(request) => {
                if let Some(old) = self.requests.get(&request.id) {
                    if old.session_id != request.session_id {
                        if let Some(ids) = self.by_session.get_mut(&old.session_id) {
                            ids.remove(&request.id);
                        }
                    }
                }
                self.by_session
                    .entry(request.session_id.clone())
                    .or_default()
                    .insert(request.id.clone());
                self.requests.insert(request.id.clone(), request);
            }
            StoreOp::DeleteRequest(id) => {
                if let Some(old) = self.requests.remove(&id) {
                    if let Some(ids) = self.by_session.get_mut(&old.session_id) {
                        ids.remove(&id);
                    }
                }
            }
            StoreOp::ClearRequests(session_id) => self.clear_requests(&session_id),
            StoreOp::SetLastUsed(id) => self.last_used = id,
        }
    }

    fn clear_requests(&mut self, session_id: &str) {
        if let Some(ids) = self.by_session.remove(session_id) {
            for id in ids {
                self.requests.remove(&id);
            }
        }
    }

    fn session_ids(&self) -> Vec<String> {
        let mut sessions: Vec<&Session> = self.sessions.values().collect();
        sessions.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        sessions.into_iter().map(|s| s.id.clone()).collect()
    }

    fn session_requests(&self, session_id: &str) -> Vec<Request> {
        let mut list: Vec<Request> = self
            .by_session
            .get(session_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.requests.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default();
        // HashSet order is arbitrary; break capture-time ties by id so
        // listings are deterministic.
        list.sort_by(|a, b| b.id.cmp(&a.id));
        sort_newest_first(&mut list);
        list
    }

    /// Operations that recreate the current contents from scratch.
    fn snapshot_ops(&self) -> Vec<StoreOp> {
        let mut ops = Vec::with_capacity(1 + self.sessions.len() + self.requests.len());
        ops.push(StoreOp::SetLastUsed(self.last_used.clone()));
        for id in self.session_ids() {
            if let Some(session) = self.sessions.get(&id) {
                ops.push(StoreOp::PutSession(session.clone()));
            }
        }
        let mut requests: Vec<&Request> = self.requests.values().collect();
        requests.sort_by(|a, b| a.captured_at.cmp(&b.captured_at).then(a.id.cmp(&b.id)));
        ops.extend(requests.into_iter().cloned().map(StoreOp::PutRequest));
        ops
    }
}

struct Inner<B> {
    backend: B,
    index: Index,
    records: u64,
    sync_on_commit: bool,
}

impl<B: StorageBackend> Inner<B> {
    /// Appends one record and applies it to the index.
    ///
    /// The index is only touched once the record is in the log. A failed
    /// append is cut back off so the log never ends in a half record.
    fn commit(&mut self, ops: Vec<StoreOp>) -> StorageResult<()> {
        if ops.is_empty() {
            return Ok(());
        }
        let record = LogRecord::new(ops);
        let frame = record.encode()?;
        let start = self.backend.size()?;

        let written = self.backend.append(&frame).and_then(|_| {
            if self.sync_on_commit {
                self.backend.sync()
            } else {
                self.backend.flush()
            }
        });
        if let Err(e) = written {
            if let Err(cut) = self.backend.truncate(start) {
                warn!(error = %cut, offset = start, "failed to cut back partial record");
            }
            return Err(e);
        }

        for op in record.ops {
            self.index.apply(op);
        }
        self.records += 1;
        Ok(())
    }
}

/// A [`LocalStore`] that appends every transaction to a byte log.
///
/// Opening a store replays the log into in-memory indexes. A record that
/// was only partially written when the process died is dropped and the log
/// is cut back to the last complete record.
///
/// ```rust
/// use catchbin_storage::LogStore;
///
/// let store = LogStore::in_memory();
/// assert_eq!(store.stats().sessions, 0);
/// ```
pub struct LogStore<B: StorageBackend> {
    inner: Mutex<Inner<B>>,
}

impl LogStore<InMemoryBackend> {
    /// Creates an empty store that lives only in memory.
    pub fn in_memory() -> Self {
        Self {
            inner: Mutex::new(Inner {
                backend: InMemoryBackend::new(),
                index: Index::default(),
                records: 0,
                sync_on_commit: false,
            }),
        }
    }
}

impl LogStore<FileBackend> {
    /// Opens (or creates) a store file and replays it.
    ///
    /// Every commit is synced to disk.
    ///
    /// # Errors
    ///
    /// Fails if the file is locked by another process, cannot be read, or
    /// holds a damaged record before its tail.
    pub fn open_path(path: &Path) -> StorageResult<Self> {
        let backend = FileBackend::open_with_create_dirs(path)?;
        let store = Self::open(backend)?;
        store.inner.lock().sync_on_commit = true;
        info!(path = %path.display(), "opened local store");
        Ok(store)
    }
}

impl<B: StorageBackend> LogStore<B> {
    /// Replays `backend` into a new store.
    pub fn open(mut backend: B) -> StorageResult<Self> {
        let mut index = Index::default();
        let mut records = 0u64;
        let mut offset = 0u64;

        loop {
            match read_record(&backend, offset)? {
                ReadOutcome::Record(record, next) => {
                    for op in record.ops {
                        index.apply(op);
                    }
                    records += 1;
                    offset = next;
                }
                ReadOutcome::End => break,
                ReadOutcome::TornTail => {
                    let size = backend.size()?;
                    warn!(offset, size, "dropping torn record at end of log");
                    backend.truncate(offset)?;
                    break;
                }
            }
        }

        debug!(
            records,
            sessions = index.sessions.len(),
            requests = index.requests.len(),
            "replayed local store"
        );

        Ok(Self {
            inner: Mutex::new(Inner {
                backend,
                index,
                records,
                sync_on_commit: false,
            }),
        })
    }

    /// Returns counters describing the store.
    pub fn stats(&self) -> StoreStats {
        let inner = self.inner.lock();
        StoreStats {
            sessions: inner.index.sessions.len(),
            requests: inner.index.requests.len(),
            resolved_payloads: inner
                .index
                .requests
                .values()
                .filter(|r| r.payload.is_resolved())
                .count(),
            records: inner.records,
            log_bytes: inner.backend.size().unwrap_or(0),
        }
    }

    /// Returns every stored session, oldest first.
    pub fn sessions(&self) -> Vec<Session> {
        let inner = self.inner.lock();
        inner
            .index
            .session_ids()
            .into_iter()
            .filter_map(|id| inner.index.sessions.get(&id).cloned())
            .collect()
    }

    /// Returns a stored session.
    pub fn session(&self, id: &str) -> Option<Session> {
        self.inner.lock().index.sessions.get(id).cloned()
    }

    /// Returns a stored request.
    pub fn request(&self, id: &str) -> Option<Request> {
        self.inner.lock().index.requests.get(id).cloned()
    }

    /// Returns a session's stored requests, newest first.
    pub fn requests_for(&self, session_id: &str) -> Vec<Request> {
        self.inner.lock().index.session_requests(session_id)
    }

    /// Returns the last-used session marker.
    pub fn last_used(&self) -> Option<String> {
        self.inner.lock().index.last_used.clone()
    }

    /// Size in bytes the log would have after [`LogStore::compact`].
    pub fn compacted_size(&self) -> StorageResult<u64> {
        let inner = self.inner.lock();
        let frame = LogRecord::new(inner.index.snapshot_ops()).encode()?;
        Ok(frame.len() as u64)
    }

    /// Rewrites the log as a single snapshot record.
    ///
    /// The log is truncated before the snapshot is written, so a crash in
    /// between loses the cache. Only run this while nothing else uses the
    /// store.
    pub fn compact(&self) -> StorageResult<CompactionResult> {
        let mut inner = self.inner.lock();
        let bytes_before = inner.backend.size()?;
        let records_before = inner.records;

        let frame = LogRecord::new(inner.index.snapshot_ops()).encode()?;
        inner.backend.truncate(0)?;
        inner.backend.append(&frame)?;
        inner.backend.sync()?;
        inner.records = 1;

        let bytes_after = inner.backend.size()?;
        info!(bytes_before, bytes_after, records_before, "compacted local store");
        Ok(CompactionResult {
            bytes_before,
            bytes_after,
            records_before,
        })
    }

    fn commit(&self, ops: Vec<StoreOp>) -> StorageResult<()> {
        self.inner.lock().commit(ops)
    }
}

#[async_trait]
impl<B: StorageBackend + 'static> LocalStore for LogStore<B> {
    async fn put_session(&self, session: &Session) -> StorageResult<()> {
        self.commit(vec![StoreOp::PutSession(session.clone())])
    }

    async fn get_session(&self, id: &str) -> StorageResult<Option<Session>> {
        Ok(self.session(id))
    }

    async fn get_session_ids(&self) -> StorageResult<Vec<String>> {
        Ok(self.inner.lock().index.session_ids())
    }

    async fn delete_sessions(&self, ids: &[String]) -> StorageResult<()> {
        self.commit(ids.iter().cloned().map(StoreOp::DeleteSession).collect())
    }

    async fn put_requests(&self, requests: &[Request]) -> StorageResult<()> {
        self.commit(requests.iter().cloned().map(StoreOp::PutRequest).collect())
    }

    async fn get_request(&self, id: &str) -> StorageResult<Option<Request>> {
        Ok(self.request(id))
    }

    async fn get_session_requests(&self, session_id: &str) -> StorageResult<Vec<Request>> {
        Ok(self.requests_for(session_id))
    }

    async fn delete_requests(&self, ids: &[String]) -> StorageResult<()> {
        self.commit(ids.iter().cloned().map(StoreOp::DeleteRequest).collect())
    }

    async fn delete_all_requests(&self, session_id: &str) -> StorageResult<()> {
        self.commit(vec![StoreOp::ClearRequests(session_id.to_string())])
    }

    async fn replace_session_requests(
        &self,
        session_id: &str,
        requests: &[Request],
    ) -> StorageResult<()> {
        let mut ops = Vec::with_capacity(requests.len() + 1);
        ops.push(StoreOp::ClearRequests(session_id.to_string()));
        ops.extend(requests.iter().cloned().map(StoreOp::PutRequest));
        self.commit(ops)
    }

    async fn resolve_payload(
        &self,
        request_id: &str,
        bytes: Vec<u8>,
    ) -> StorageResult<Option<Request>> {
        let mut inner = self.inner.lock();
        let Some(mut request) = inner.index.requests.get(request_id).cloned() else {
            return Ok(None);
        };
        if !request.payload.resolve(bytes) {
            return Ok(Some(request));
        }
        inner.commit(vec![StoreOp::PutRequest(request.clone())])?;
        Ok(Some(request))
    }

    async fn last_used_session(&self) -> StorageResult<Option<String>> {
        Ok(self.last_used())
    }

    async fn set_last_used_session(&self, id: Option<&str>) -> StorageResult<()> {
        self.commit(vec![StoreOp::SetLastUsed(id.map(str::to_string))])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catchbin_model::{Payload, SessionOptions};
    use chrono::{Duration, TimeZone, Utc};

    fn session(id: &str, secs: i64) -> Session {
        SessionOptions::new()
            .normalize()
            .unwrap()
            .into_session(id, Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap())
    }

    fn request(id: &str, session_id: &str, secs: i64) -> Request {
        Request {
            id: id.into(),
            session_id: session_id.into(),
            client_address: "10.0.0.1".into(),
            method: "POST".into(),
            url: "/hook".into(),
            headers: vec![],
            captured_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::seconds(secs),
            payload: Payload::Pending,
        }
    }

    #[tokio::test]
    async fn session_ids_oldest_first() {
        let store = LogStore::in_memory();
        store.put_session(&session("b", 2)).await.unwrap();
        store.put_session(&session("a", 1)).await.unwrap();
        assert_eq!(store.get_session_ids().await.unwrap(), ["a", "b"]);
    }

    #[tokio::test]
    async fn delete_session_cascades() {
        let store = LogStore::in_memory();
        store.put_session(&session("s1", 1)).await.unwrap();
        store
            .put_requests(&[request("r1", "s1", 1), request("r2", "s2", 2)])
            .await
            .unwrap();

        store.delete_sessions(&["s1".into()]).await.unwrap();
        assert!(store.get_session("s1").await.unwrap().is_none());
        assert!(store.get_request("r1").await.unwrap().is_none());
        assert!(store.get_request("r2").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn replace_drops_stale_requests() {
        let store = LogStore::in_memory();
        store
            .put_requests(&[request("old", "s1", 1), request("keep", "s1", 2)])
            .await
            .unwrap();
        store
            .replace_session_requests("s1", &[request("keep", "s1", 2), request("new", "s1", 3)])
            .await
            .unwrap();

        let ids: Vec<String> = store
            .get_session_requests("s1")
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, ["new", "keep"]);
        assert_eq!(store.stats().records, 2);
    }

    #[tokio::test]
    async fn resolve_payload_never_resurrects() {
        let store = LogStore::in_memory();
        store.put_request(&request("r1", "s1", 1)).await.unwrap();

        let resolved = store
            .resolve_payload("r1", b"body".to_vec())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resolved.payload.bytes(), Some(&b"body"[..]));

        store.delete_requests(&["r1".into()]).await.unwrap();
        assert!(store
            .resolve_payload("r1", b"late".to_vec())
            .await
            .unwrap()
            .is_none());
        assert!(store.get_request("r1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_all_keeps_session() {
        let store = LogStore::in_memory();
        store.put_session(&session("s1", 1)).await.unwrap();
        store
            .put_requests(&[request("r1", "s1", 1), request("r2", "s1", 2)])
            .await
            .unwrap();
        store.delete_all_requests("s1").await.unwrap();
        assert!(store.get_session_requests("s1").await.unwrap().is_empty());
        assert!(store.get_session("s1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn empty_batches_write_nothing() {
        let store = LogStore::in_memory();
        store.delete_requests(&[]).await.unwrap();
        store.put_requests(&[]).await.unwrap();
        assert_eq!(store.stats().records, 0);
        assert_eq!(store.stats().log_bytes, 0);
    }

    #[tokio::test]
    async fn last_used_marker() {
        let store = LogStore::in_memory();
        assert_eq!(store.last_used_session().await.unwrap(), None);
        store.set_last_used_session(Some("s1")).await.unwrap();
        assert_eq!(store.last_used_session().await.unwrap(), Some("s1".into()));
        store.set_last_used_session(None).await.unwrap();
        assert_eq!(store.last_used_session().await.unwrap(), None);
    }
}

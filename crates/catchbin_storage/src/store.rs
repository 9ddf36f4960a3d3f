//! The local store contract used by the sync engine.

use crate::error::StorageResult;
use async_trait::async_trait;
use catchbin_model::{Request, Session};

/// A transactional local cache of sessions and requests.
///
/// Every method is one transaction: either all of its effects are
/// persisted or none are. The store is a cache, never a second source of
/// truth; the engine overwrites it with remote data whenever they disagree.
#[async_trait]
pub trait LocalStore: Send + Sync + 'static {
    /// Inserts or replaces a session.
    async fn put_session(&self, session: &Session) -> StorageResult<()>;

    /// Looks up a session.
    async fn get_session(&self, id: &str) -> StorageResult<Option<Session>>;

    /// Returns the ids of all stored sessions, oldest first.
    async fn get_session_ids(&self) -> StorageResult<Vec<String>>;

    /// Deletes sessions together with all of their requests.
    ///
    /// Unknown ids are ignored.
    async fn delete_sessions(&self, ids: &[String]) -> StorageResult<()>;

    /// Inserts or replaces a batch of requests.
    async fn put_requests(&self, requests: &[Request]) -> StorageResult<()>;

    /// Inserts or replaces one request.
    async fn put_request(&self, request: &Request) -> StorageResult<()> {
        self.put_requests(std::slice::from_ref(request)).await
    }

    /// Looks up a request.
    async fn get_request(&self, id: &str) -> StorageResult<Option<Request>>;

    /// Returns a session's requests, newest first.
    async fn get_session_requests(&self, session_id: &str) -> StorageResult<Vec<Request>>;

    /// Deletes requests by id. Unknown ids are ignored.
    async fn delete_requests(&self, ids: &[String]) -> StorageResult<()>;

    /// Deletes every request of a session.
    async fn delete_all_requests(&self, session_id: &str) -> StorageResult<()>;

    /// Replaces a session's requests with `requests` in one transaction.
    async fn replace_session_requests(
        &self,
        session_id: &str,
        requests: &[Request],
    ) -> StorageResult<()>;

    /// Resolves the payload of a stored request.
    ///
    /// Returns the updated request, or `None` if the request is no longer
    /// stored. A deleted request is never written back. An already
    /// resolved payload is left as it is.
    async fn resolve_payload(
        &self,
        request_id: &str,
        bytes: Vec<u8>,
    ) -> StorageResult<Option<Request>>;

    /// Returns the last-used session marker.
    async fn last_used_session(&self) -> StorageResult<Option<String>>;

    /// Sets or clears the last-used session marker.
    async fn set_last_used_session(&self, id: Option<&str>) -> StorageResult<()>;
}

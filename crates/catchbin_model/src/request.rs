//! Captured requests and list ordering.

use crate::payload::Payload;
use crate::session::Header;
use crate::Timestamp;
use serde::{Deserialize, Serialize};

/// One HTTP call captured against a session's endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    /// Unique id, never reused.
    pub id: String,
    /// Owning session. The session may be absent locally.
    pub session_id: String,
    /// Address of the caller.
    pub client_address: String,
    /// HTTP method.
    pub method: String,
    /// Requested URL.
    pub url: String,
    /// Request headers in arrival order.
    pub headers: Vec<Header>,
    /// Capture time.
    pub captured_at: Timestamp,
    /// Request body, possibly not fetched yet.
    #[serde(default)]
    pub payload: Payload,
}

impl Request {
    /// Returns a copy with the payload reset to pending.
    ///
    /// Push events carry the request without its body.
    pub fn without_payload(&self) -> Self {
        Self {
            payload: Payload::Pending,
            ..self.clone()
        }
    }
}

/// Sorts requests by `captured_at`, newest first.
///
/// The sort is stable, so requests captured at the same instant keep their
/// relative order.
pub fn sort_newest_first(requests: &mut [Request]) {
    requests.sort_by(|a, b| b.captured_at.cmp(&a.captured_at));
}

/// Inserts a request into a newest-first list.
///
/// A request with the same id is replaced in place of the old entry. A new
/// request goes before every entry captured at or before its own time, so
/// in-order delivery degenerates to a prepend. Returns the index it landed at.
pub fn insert_newest_first(requests: &mut Vec<Request>, request: Request) -> usize {
    if let Some(pos) = requests.iter().position(|r| r.id == request.id) {
        requests.remove(pos);
    }
    let index = requests.partition_point(|r| r.captured_at > request.captured_at);
    requests.insert(index, request);
    index
}

//! Push event ingestion and lazy payload resolution.

use crate::config::PushOrdering;
use crate::engine::{EngineInner, SyncEngine};
use crate::error::{SyncError, SyncResult};
use crate::listener::PushListener;
use catchbin_model::{insert_newest_first, Payload, PushEvent, Request};
use catchbin_remote::{RemoteClient, RemoteResult};
use catchbin_storage::LocalStore;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

impl<S: LocalStore, R: RemoteClient> SyncEngine<S, R> {
    /// Applies a push event for `session_id`, as if it arrived on the
    /// session's push channel.
    ///
    /// The event always reaches the local store; the request list only
    /// changes if `session_id` is the current session. Applying the same
    /// event twice has the same effect as applying it once.
    pub async fn ingest(&self, session_id: &str, event: PushEvent) -> SyncResult<()> {
        self.inner.ingest(session_id, event, None).await
    }
}

impl<S: LocalStore, R: RemoteClient> EngineInner<S, R> {
    /// Applies an event, notifies `listener` and starts payload resolution.
    pub(crate) async fn ingest(
        self: &Arc<Self>,
        session_id: &str,
        event: PushEvent,
        listener: Option<&Arc<dyn PushListener>>,
    ) -> SyncResult<()> {
        trace!(session_id, action = event.action(), "push event");
        match event {
            PushEvent::Create(request) => {
                let request = self.apply_create(session_id, request).await?;
                if let Some(listener) = listener {
                    listener.on_create(&request);
                }
                if self.config.resolve_payloads && !request.payload.is_resolved() {
                    self.spawn_payload_fetch(
                        request.session_id.clone(),
                        request.id.clone(),
                        listener.cloned(),
                    );
                }
            }
            PushEvent::Delete { request_id } => {
                self.apply_delete(session_id, &request_id).await?;
                if let Some(listener) = listener {
                    listener.on_delete(&request_id);
                }
            }
            PushEvent::Clear => {
                self.apply_clear(session_id).await?;
                if let Some(listener) = listener {
                    listener.on_clear(session_id);
                }
            }
        }
        Ok(())
    }

    async fn apply_create(&self, session_id: &str, mut request: Request) -> SyncResult<Request> {
        if request.session_id.is_empty() {
            request.session_id = session_id.to_string();
        }
        if let Some(stored) = self.store.get_request(&request.id).await? {
            keep_payload(&mut request, &stored);
        }
        self.store.put_request(&request).await?;

        let ordering = self.config.push_ordering;
        let listed = request.clone();
        let applied = self.update_if(|state| {
            if !state.is_current_session(session_id) {
                return false;
            }
            let mut listed = listed;
            if let Some(existing) = state.find_request(&listed.id) {
                keep_payload(&mut listed, existing);
            }
            match ordering {
                PushOrdering::InsertSorted => {
                    insert_newest_first(&mut state.requests, listed);
                }
                PushOrdering::TrustChannel => {
                    state.requests.retain(|r| r.id != listed.id);
                    state.requests.insert(0, listed);
                }
            }
            true
        });
        self.count_event(session_id, applied);
        Ok(request)
    }

    async fn apply_delete(&self, session_id: &str, request_id: &str) -> SyncResult<()> {
        self.store.delete_requests(&[request_id.to_string()]).await?;
        let applied = self.update_if(|state| {
            if !state.is_current_session(session_id) {
                return false;
            }
            state.requests.retain(|r| r.id != request_id);
            if state.selected_request_id.as_deref() == Some(request_id) {
                state.clear_request();
            }
            true
        });
        self.count_event(session_id, applied);
        Ok(())
    }

    async fn apply_clear(&self, session_id: &str) -> SyncResult<()> {
        self.store.delete_all_requests(session_id).await?;
        let applied = self.update_if(|state| {
            if !state.is_current_session(session_id) {
                return false;
            }
            state.requests.clear();
            state.clear_request();
            true
        });
        self.count_event(session_id, applied);
        Ok(())
    }

    fn count_event(&self, session_id: &str, applied: bool) {
        if applied {
            self.record(|s| s.push_events_applied += 1);
        } else {
            self.record(|s| s.push_events_stale += 1);
            debug!(session_id, "push event for a non-current session, list untouched");
        }
    }

    fn spawn_payload_fetch(
        self: &Arc<Self>,
        session_id: String,
        request_id: String,
        listener: Option<Arc<dyn PushListener>>,
    ) {
        let engine = Arc::downgrade(self);
        tokio::spawn(async move {
            let Some(inner) = engine.upgrade() else {
                return;
            };
            if let Err(error) = inner.resolve_payload(&session_id, &request_id).await {
                inner.record(|s| s.payload_failures += 1);
                warn!(
                    session_id = %session_id,
                    request_id = %request_id,
                    error = %error,
                    "payload resolution failed"
                );
                if let Some(listener) = listener {
                    listener.on_error(&error);
                }
            }
        });
    }

    /// Fetches a request's payload and stores it.
    ///
    /// Returns false if there was nothing to store: the server sent no
    /// body, or the request was deleted while the fetch was in flight.
    pub(crate) async fn resolve_payload(
        &self,
        session_id: &str,
        request_id: &str,
    ) -> SyncResult<bool> {
        let fetched = self
            .remote
            .get_session_request(session_id, request_id)
            .await?;
        let Payload::Resolved(bytes) = fetched.payload else {
            debug!(session_id, request_id, "server returned no payload");
            return Ok(false);
        };
        let Some(stored) = self.store.resolve_payload(request_id, bytes).await? else {
            self.record(|s| s.stale_results_discarded += 1);
            debug!(session_id, request_id, "request deleted before its payload arrived");
            return Ok(false);
        };
        self.publish_payload(&stored);
        self.record(|s| s.payloads_resolved += 1);
        debug!(session_id, request_id, "payload resolved");
        Ok(true)
    }

    /// Copies a resolved payload into the list entry and the current
    /// request, where they still show it pending.
    pub(crate) fn publish_payload(&self, stored: &Request) {
        if !stored.payload.is_resolved() {
            return;
        }
        self.update_if(|state| {
            let mut changed = false;
            if let Some(entry) = state.requests.iter_mut().find(|r| r.id == stored.id) {
                if !entry.payload.is_resolved() {
                    entry.payload = stored.payload.clone();
                    changed = true;
                }
            }
            if let Some(current) = state.request.as_mut().filter(|r| r.id == stored.id) {
                if !current.payload.is_resolved() {
                    current.payload = stored.payload.clone();
                    changed = true;
                }
            }
            changed
        });
    }
}

/// Drains a push channel into the engine, in channel order.
///
/// Stops when the channel ends or the engine is gone.
pub(crate) async fn run_channel<S: LocalStore, R: RemoteClient>(
    engine: Weak<EngineInner<S, R>>,
    session_id: String,
    mut events: mpsc::Receiver<RemoteResult<PushEvent>>,
    listener: Arc<dyn PushListener>,
) {
    while let Some(item) = events.recv().await {
        let Some(inner) = engine.upgrade() else {
            break;
        };
        let result = match item {
            Ok(event) => inner.ingest(&session_id, event, Some(&listener)).await,
            Err(error) => {
                inner.record(|s| s.push_errors += 1);
                Err(SyncError::from(error))
            }
        };
        if let Err(error) = result {
            warn!(session_id = %session_id, error = %error, "push event not applied");
            listener.on_error(&error);
        }
    }
    debug!(session_id = %session_id, "push channel ended");
}

/// Carries locally resolved payloads over to a fresh list from the server.
pub(crate) fn keep_resolved_payloads(mut fetched: Vec<Request>, cached: &[Request]) -> Vec<Request> {
    let resolved: HashMap<&str, &Request> = cached
        .iter()
        .filter(|r| r.payload.is_resolved())
        .map(|r| (r.id.as_str(), r))
        .collect();
    for request in &mut fetched {
        if let Some(stored) = resolved.get(request.id.as_str()) {
            keep_payload(request, stored);
        }
    }
    fetched
}

/// Keeps `existing`'s payload if it is resolved and `request`'s is not.
fn keep_payload(request: &mut Request, existing: &Request) {
    if !request.payload.is_resolved() && existing.payload.is_resolved() {
        request.payload = existing.payload.clone();
    }
}

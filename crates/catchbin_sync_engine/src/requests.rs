//! Request operations.

use crate::engine::{EngineInner, SyncEngine};
use crate::error::{SyncError, SyncResult};
use crate::phase::{Phased, SlowPhase};
use catchbin_model::{ModelError, Request};
use catchbin_remote::RemoteClient;
use catchbin_storage::LocalStore;
use std::sync::Arc;
use tracing::{debug, warn};

impl<S: LocalStore, R: RemoteClient> SyncEngine<S, R> {
    /// Selects a request of `session_id`, or clears the selection with `None`.
    ///
    /// The fast phase publishes the cached request. If it is missing or its
    /// payload is pending, the slow phase fetches the full request, stores
    /// it, and publishes it only if it is still the selected request. An
    /// uncached request that was deleted or deselected meanwhile is not
    /// stored.
    pub async fn switch_to_request(
        &self,
        session_id: &str,
        request_id: Option<&str>,
    ) -> SyncResult<Phased<Option<Request>>> {
        let inner = &self.inner;
        let Some(request_id) = request_id else {
            inner.update(|state| state.clear_request());
            return Ok(Phased::done(None));
        };
        ModelError::check_id("session", session_id)?;
        ModelError::check_id("request", request_id)?;

        inner.update(|state| state.selected_request_id = Some(request_id.to_string()));
        let cached = inner.store.get_request(request_id).await?;
        let published = cached.clone();
        inner.update_if(|state| {
            if state.selected_request_id.as_deref() != Some(request_id) {
                return false;
            }
            state.request = published;
            true
        });

        if cached.as_ref().is_some_and(|r| r.payload.is_resolved()) {
            return Ok(Phased::done(cached));
        }

        let slow = SlowPhase::new(fetch_selected(
            Arc::clone(inner),
            session_id.to_string(),
            request_id.to_string(),
            cached.is_some(),
        ));
        Ok(Phased { fast: cached, slow })
    }

    /// Removes one request.
    ///
    /// The fast phase deletes it locally and from the list; the slow phase
    /// deletes it remotely. A remote failure is reported, not rolled back.
    pub async fn remove_request(&self, session_id: &str, request_id: &str) -> SyncResult<Phased<()>> {
        ModelError::check_id("session", session_id)?;
        ModelError::check_id("request", request_id)?;
        let inner = &self.inner;

        inner.store.delete_requests(&[request_id.to_string()]).await?;
        inner.update_if(|state| {
            let before = state.requests.len();
            state.requests.retain(|r| r.id != request_id);
            let mut changed = state.requests.len() != before;
            if state.selected_request_id.as_deref() == Some(request_id) {
                state.clear_request();
                changed = true;
            }
            changed
        });
        debug!(session_id, request_id, "request removed locally");

        let remote_inner = Arc::clone(inner);
        let (sid, rid) = (session_id.to_string(), request_id.to_string());
        let slow = SlowPhase::new(async move {
            if remote_inner.remote.delete_session_request(&sid, &rid).await? {
                Ok(())
            } else {
                warn!(session_id = %sid, request_id = %rid, "server declined request delete");
                Err(SyncError::declined("delete request"))
            }
        });
        Ok(Phased { fast: (), slow })
    }

    /// Removes every request of a session.
    ///
    /// The fast phase empties the list and the local store; the slow phase
    /// clears the session remotely.
    pub async fn remove_all_requests(&self, session_id: &str) -> SyncResult<Phased<()>> {
        ModelError::check_id("session", session_id)?;
        let inner = &self.inner;

        inner.store.delete_all_requests(session_id).await?;
        inner.update_if(|state| {
            if !state.is_current_session(session_id) {
                return false;
            }
            state.requests.clear();
            state.clear_request();
            true
        });
        debug!(session_id, "requests cleared locally");

        let remote_inner = Arc::clone(inner);
        let sid = session_id.to_string();
        let slow = SlowPhase::new(async move {
            if remote_inner.remote.delete_all_session_requests(&sid).await? {
                Ok(())
            } else {
                warn!(session_id = %sid, "server declined clearing requests");
                Err(SyncError::declined("delete all requests"))
            }
        });
        Ok(Phased { fast: (), slow })
    }
}

/// Slow phase of a request switch.
async fn fetch_selected<S: LocalStore, R: RemoteClient>(
    inner: Arc<EngineInner<S, R>>,
    session_id: String,
    request_id: String,
    was_cached: bool,
) -> SyncResult<()> {
    let full = inner
        .remote
        .get_session_request(&session_id, &request_id)
        .await?;

    let stored = if was_cached {
        match full.payload.bytes() {
            Some(bytes) => inner.store.resolve_payload(&request_id, bytes.to_vec()).await?,
            None => inner.store.get_request(&request_id).await?,
        }
    } else if inner.read(|s| s.selected_request_id.as_deref() == Some(request_id.as_str())) {
        inner.store.put_request(&full).await?;
        Some(full)
    } else {
        None
    };

    let Some(stored) = stored else {
        inner.record(|s| s.stale_results_discarded += 1);
        debug!(
            session_id = %session_id,
            request_id = %request_id,
            "request deleted or deselected during fetch"
        );
        return Ok(());
    };
    inner.publish_payload(&stored);

    let selected = inner.update_if(|state| {
        if state.selected_request_id.as_deref() != Some(request_id.as_str()) {
            return false;
        }
        state.request = Some(stored);
        true
    });
    if !selected {
        inner.record(|s| s.stale_results_discarded += 1);
        debug!(
            session_id = %session_id,
            request_id = %request_id,
            "selection moved on, discarding fetched request"
        );
    }
    Ok(())
}

//! Session operations.

use crate::channel::OpenChannel;
use crate::engine::{EngineInner, SyncEngine};
use crate::error::{SyncError, SyncResult};
use crate::ingest::{keep_resolved_payloads, run_channel};
use crate::listener::PushListener;
use crate::phase::{Phased, SlowPhase};
use catchbin_model::{ModelError, Session, SessionOptions};
use catchbin_remote::{PushSubscription, RemoteClient};
use catchbin_storage::LocalStore;
use std::sync::Arc;
use tracing::{debug, info, warn};

impl<S: LocalStore, R: RemoteClient> SyncEngine<S, R> {
    /// Creates a session on the server and stores it locally.
    ///
    /// The options are validated and normalized before anything is sent.
    /// No session exists locally unless the server confirmed it.
    pub async fn new_session(&self, options: &SessionOptions) -> SyncResult<Session> {
        let options = options.normalize()?;
        let inner = &self.inner;

        let session = inner.remote.create_session(&options).await?;
        inner.store.put_session(&session).await?;
        inner.update(|state| state.remember_session(&session.id));

        info!(session_id = %session.id, "session created");
        Ok(session)
    }

    /// Makes `session_id` the current session.
    ///
    /// The fast phase publishes the cached session and its cached requests,
    /// or `None` when the session is not stored locally. The slow phase
    /// fetches a missing session, replaces the request list with the
    /// server's, then opens the session's push channel after closing the
    /// previous one. Events on the channel are reported to `listener`.
    ///
    /// A failing slow phase clears the last-used marker.
    pub async fn switch_to_session(
        &self,
        session_id: &str,
        listener: Arc<dyn PushListener>,
    ) -> SyncResult<Phased<Option<Session>>> {
        ModelError::check_id("session", session_id)?;
        let inner = &self.inner;
        let epoch = inner.begin_switch(session_id);

        let cached = inner.store.get_session(session_id).await?;
        let cached_requests = match cached {
            Some(_) => inner.store.get_session_requests(session_id).await?,
            None => Vec::new(),
        };

        if inner.is_latest_switch(epoch) {
            inner.store.set_last_used_session(Some(session_id)).await?;
            let session = cached.clone();
            inner.update(|state| {
                if session.is_some() {
                    state.remember_session(session_id);
                }
                state.session = session;
                state.requests = cached_requests;
                state.clear_request();
                state.last_used_session_id = Some(session_id.to_string());
            });
        }
        debug!(session_id, cached = cached.is_some(), "switching session");

        let slow = SlowPhase::new(finish_switch(
            Arc::clone(inner),
            session_id.to_string(),
            cached.is_none(),
            epoch,
            listener,
        ));
        Ok(Phased { fast: cached, slow })
    }

    /// Destroys a session.
    ///
    /// The fast phase deletes the session and its requests locally and
    /// forgets it; if it was current, its push channel is closed. A switch
    /// to it that is still running writes nothing afterwards. The slow
    /// phase deletes it remotely. A remote failure does not restore the
    /// local copy.
    pub async fn destroy_session(&self, session_id: &str) -> SyncResult<Phased<()>> {
        ModelError::check_id("session", session_id)?;
        let inner = &self.inner;

        inner.store.delete_sessions(&[session_id.to_string()]).await?;
        if inner.store.last_used_session().await?.as_deref() == Some(session_id) {
            inner.store.set_last_used_session(None).await?;
        }

        inner.invalidate_switches_to(&[session_id.to_string()]);
        inner.push.close_for(session_id);
        inner.update(|state| state.forget_sessions(&[session_id.to_string()]));
        info!(session_id, "session destroyed locally");

        let remote_inner = Arc::clone(inner);
        let id = session_id.to_string();
        let slow = SlowPhase::new(async move {
            if remote_inner.remote.delete_session(&id).await? {
                Ok(())
            } else {
                warn!(session_id = %id, "server declined session delete");
                Err(SyncError::declined("delete session"))
            }
        });
        Ok(Phased { fast: (), slow })
    }
}

/// Slow phase of a session switch.
async fn finish_switch<S: LocalStore, R: RemoteClient>(
    inner: Arc<EngineInner<S, R>>,
    session_id: String,
    fetch_session: bool,
    epoch: u64,
    listener: Arc<dyn PushListener>,
) -> SyncResult<()> {
    let result = sync_session(&inner, &session_id, fetch_session, epoch, listener).await;
    if let Err(error) = &result {
        warn!(session_id = %session_id, error = %error, "session switch failed");
        inner.clear_last_used(&session_id).await;
    }
    result
}

async fn sync_session<S: LocalStore, R: RemoteClient>(
    inner: &Arc<EngineInner<S, R>>,
    session_id: &str,
    fetch_session: bool,
    epoch: u64,
    listener: Arc<dyn PushListener>,
) -> SyncResult<()> {
    if fetch_session {
        let session = inner.remote.get_session(session_id).await?;
        if superseded(inner, session_id, epoch) {
            return Ok(());
        }
        inner.store.put_session(&session).await?;
        inner.update(|state| {
            state.remember_session(&session.id);
            state.session = Some(session);
        });
    }

    let fetched = inner.remote.get_session_requests(session_id).await?;
    let cached = inner.store.get_session_requests(session_id).await?;
    if superseded(inner, session_id, epoch) {
        return Ok(());
    }
    let requests = keep_resolved_payloads(fetched, &cached);
    inner
        .store
        .replace_session_requests(session_id, &requests)
        .await?;
    debug!(session_id, count = requests.len(), "request list replaced");

    if superseded(inner, session_id, epoch) {
        return Ok(());
    }
    inner.update_if(|state| {
        if !state.is_current_session(session_id) {
            return false;
        }
        state.requests = requests;
        true
    });

    open_channel(inner, session_id, epoch, listener).await
}

/// Returns true, counting a discarded result, if a later switch or a
/// destroy of `session_id` made the switch at `epoch` stale.
fn superseded<S: LocalStore, R: RemoteClient>(
    inner: &EngineInner<S, R>,
    session_id: &str,
    epoch: u64,
) -> bool {
    if inner.is_latest_switch(epoch) {
        return false;
    }
    inner.record(|s| s.stale_results_discarded += 1);
    debug!(session_id, "switch superseded, discarding fetched state");
    true
}

/// Opens the push channel for `session_id`, closing the previous one first.
async fn open_channel<S: LocalStore, R: RemoteClient>(
    inner: &Arc<EngineInner<S, R>>,
    session_id: &str,
    epoch: u64,
    listener: Arc<dyn PushListener>,
) -> SyncResult<()> {
    inner.push.close();
    let PushSubscription {
        session_id: channel_session,
        events,
        closer,
    } = inner
        .remote
        .subscribe_to_session_requests(session_id)
        .await?;

    let task = tokio::spawn(run_channel(
        Arc::downgrade(inner),
        channel_session.clone(),
        events,
        listener,
    ));
    let channel = OpenChannel {
        session_id: channel_session,
        task,
        closer,
    };

    if inner.push.install_if(channel, || inner.is_latest_switch(epoch)) {
        inner.record(|s| s.channels_opened += 1);
        info!(session_id, "push channel opened");
    } else {
        inner.record(|s| s.stale_results_discarded += 1);
        debug!(session_id, "switch superseded, push channel dropped");
    }
    Ok(())
}

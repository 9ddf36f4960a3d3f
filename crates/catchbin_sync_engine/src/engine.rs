//! The sync engine.

use crate::channel::PushSlot;
use crate::config::EngineConfig;
use crate::error::SyncResult;
use crate::state::{EngineState, EngineStats};
use catchbin_model::{Request, Session};
use catchbin_remote::RemoteClient;
use catchbin_storage::LocalStore;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// Shared engine internals.
///
/// Push channel tasks and payload fetches hold a `Weak` to this, so an
/// engine that is dropped stops ingesting.
pub(crate) struct EngineInner<S, R> {
    pub config: EngineConfig,
    pub store: S,
    pub remote: R,
    pub state: watch::Sender<EngineState>,
    pub push: PushSlot,
    pub stats: Mutex<EngineStats>,
    /// Bumped by every session switch, destroy or prune of a session a
    /// switch involves, and close.
    switch_epoch: AtomicU64,
    /// Session the latest switch targets.
    switch_target: Mutex<Option<String>>,
}

impl<S: LocalStore, R: RemoteClient> EngineInner<S, R> {
    /// Applies a state change and publishes it.
    pub fn update(&self, f: impl FnOnce(&mut EngineState)) {
        self.state.send_modify(f);
    }

    /// Applies a state change, publishing only if `f` returns true.
    pub fn update_if(&self, f: impl FnOnce(&mut EngineState) -> bool) -> bool {
        self.state.send_if_modified(f)
    }

    /// Reads the current state.
    pub fn read<T>(&self, f: impl FnOnce(&EngineState) -> T) -> T {
        f(&*self.state.borrow())
    }

    /// Updates the statistics.
    pub fn record(&self, f: impl FnOnce(&mut EngineStats)) {
        f(&mut self.stats.lock());
    }

    /// Starts a new session switch to `session_id` and returns its epoch.
    pub fn begin_switch(&self, session_id: &str) -> u64 {
        let mut target = self.switch_target.lock();
        *target = Some(session_id.to_string());
        self.switch_epoch.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Returns true if no switch started after the one at `epoch`.
    pub fn is_latest_switch(&self, epoch: u64) -> bool {
        self.switch_epoch.load(Ordering::SeqCst) == epoch
    }

    /// Makes every in-flight switch stale.
    pub fn invalidate_switches(&self) {
        self.switch_epoch.fetch_add(1, Ordering::SeqCst);
    }

    /// Makes in-flight switches stale if any of `ids` is the current
    /// session, the last-used session or the target of the latest switch.
    ///
    /// Returns true if switches were invalidated.
    pub fn invalidate_switches_to(&self, ids: &[String]) -> bool {
        let involved = |id: &str| ids.iter().any(|i| i == id);
        let target = self.switch_target.lock();
        let hit = target.as_deref().is_some_and(involved)
            || self.read(|s| {
                s.session_id().is_some_and(involved)
                    || s.last_used_session_id.as_deref().is_some_and(involved)
            });
        if hit {
            self.invalidate_switches();
        }
        hit
    }

    /// Clears the last-used marker if it still names `session_id`.
    ///
    /// Failures are logged; the caller is already reporting an error.
    pub async fn clear_last_used(&self, session_id: &str) {
        let cleared = self.update_if(|state| {
            if state.last_used_session_id.as_deref() != Some(session_id) {
                return false;
            }
            state.last_used_session_id = None;
            true
        });
        if !cleared {
            return;
        }
        if let Err(error) = self.store.set_last_used_session(None).await {
            warn!(session_id, error = %error, "failed to clear last-used session");
        }
    }
}

/// Keeps sessions and captured requests in sync between the local store,
/// the remote API and the push channel.
///
/// Cloning an engine shares its state.
pub struct SyncEngine<S: LocalStore, R: RemoteClient> {
    pub(crate) inner: Arc<EngineInner<S, R>>,
}

impl<S: LocalStore, R: RemoteClient> Clone for SyncEngine<S, R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: LocalStore, R: RemoteClient> SyncEngine<S, R> {
    /// Creates a new engine. Call [`SyncEngine::load`] before use.
    pub fn new(config: EngineConfig, store: S, remote: R) -> Self {
        let (state, _) = watch::channel(EngineState::default());
        Self {
            inner: Arc::new(EngineInner {
                config,
                store,
                remote,
                state,
                push: PushSlot::default(),
                stats: Mutex::new(EngineStats::default()),
                switch_epoch: AtomicU64::new(0),
                switch_target: Mutex::new(None),
            }),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Returns the local store.
    pub fn store(&self) -> &S {
        &self.inner.store
    }

    /// Returns the remote client.
    pub fn remote(&self) -> &R {
        &self.inner.remote
    }

    /// Returns a snapshot of the current state.
    pub fn state(&self) -> EngineState {
        self.inner.read(EngineState::clone)
    }

    /// Subscribes to state changes.
    pub fn subscribe(&self) -> watch::Receiver<EngineState> {
        self.inner.state.subscribe()
    }

    /// The current session.
    pub fn session(&self) -> Option<Session> {
        self.inner.read(|s| s.session.clone())
    }

    /// The current request.
    pub fn request(&self) -> Option<Request> {
        self.inner.read(|s| s.request.clone())
    }

    /// Requests of the current session, newest first.
    pub fn requests(&self) -> Vec<Request> {
        self.inner.read(|s| s.requests.clone())
    }

    /// Ids of every locally known session.
    pub fn all_session_ids(&self) -> Vec<String> {
        self.inner.read(|s| s.all_session_ids.clone())
    }

    /// The last-used session marker.
    pub fn last_used_session_id(&self) -> Option<String> {
        self.inner.read(|s| s.last_used_session_id.clone())
    }

    /// Returns a snapshot of the statistics.
    pub fn stats(&self) -> EngineStats {
        self.inner.stats.lock().clone()
    }

    /// Session of the open push channel, if any.
    pub fn push_session_id(&self) -> Option<String> {
        self.inner.push.session_id()
    }

    /// Restores the known session ids and the last-used marker from the
    /// local store, then reconciles with the server if configured to.
    ///
    /// Only local store failures fail the load. A failed reconciliation is
    /// logged and every known session is kept.
    pub async fn load(&self) -> SyncResult<()> {
        let inner = &self.inner;
        let ids = inner.store.get_session_ids().await?;
        let last_used = inner.store.last_used_session().await?;
        let count = ids.len();
        inner.update(|state| {
            state.all_session_ids = ids;
            state.last_used_session_id = last_used;
        });
        info!(sessions = count, "engine state loaded");

        if inner.config.reconcile_on_start {
            if let Err(error) = self.reconcile_known_sessions().await {
                warn!(error = %error, "startup reconciliation failed, keeping known sessions");
            }
        }
        Ok(())
    }

    /// Closes the push channel. In-flight session switches will not open
    /// a new one.
    pub fn close(&self) {
        self.inner.invalidate_switches();
        if self.inner.push.close() {
            info!("engine closed");
        }
    }
}

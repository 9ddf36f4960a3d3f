//! Startup reconciliation of locally known sessions.

use crate::engine::SyncEngine;
use crate::error::SyncResult;
use catchbin_remote::RemoteClient;
use catchbin_storage::LocalStore;
use tracing::{debug, info};

impl<S: LocalStore, R: RemoteClient> SyncEngine<S, R> {
    /// Prunes sessions the server no longer knows.
    ///
    /// Issues one batched existence check for every locally known session.
    /// Sessions reported missing are deleted locally with their requests
    /// and forgotten. Sessions the server did not answer for are kept.
    /// Returns the pruned ids.
    pub async fn reconcile_known_sessions(&self) -> SyncResult<Vec<String>> {
        let inner = &self.inner;
        let ids = inner.store.get_session_ids().await?;
        if ids.is_empty() {
            debug!("no known sessions to reconcile");
            return Ok(Vec::new());
        }

        let exists = inner.remote.check_sessions_exist(&ids).await?;
        let missing: Vec<String> = ids
            .iter()
            .filter(|id| exists.get(id.as_str()) == Some(&false))
            .cloned()
            .collect();

        if !missing.is_empty() {
            inner.store.delete_sessions(&missing).await?;
            if let Some(last_used) = inner.store.last_used_session().await? {
                if missing.contains(&last_used) {
                    inner.store.set_last_used_session(None).await?;
                }
            }
            inner.invalidate_switches_to(&missing);
            for id in &missing {
                inner.push.close_for(id);
            }
        }

        inner.update(|state| {
            state.forget_sessions(&missing);
            for id in ids.iter().filter(|id| !missing.contains(id)) {
                state.remember_session(id);
            }
        });
        inner.record(|s| s.sessions_pruned += missing.len() as u64);
        info!(
            known = ids.len(),
            pruned = missing.len(),
            "known sessions reconciled"
        );
        Ok(missing)
    }
}

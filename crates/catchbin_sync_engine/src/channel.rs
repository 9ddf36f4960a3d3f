//! The push channel slot.
//!
//! The engine keeps at most one push channel open. The slot owns the
//! channel's closer and the task draining it; replacing or clearing the
//! slot closes the old channel before anything else happens.

use catchbin_remote::PushCloser;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

/// An open push channel.
pub(crate) struct OpenChannel {
    pub session_id: String,
    pub task: JoinHandle<()>,
    pub closer: PushCloser,
}

impl OpenChannel {
    fn shut(self) {
        let OpenChannel {
            session_id,
            task,
            closer,
        } = self;
        closer.close();
        task.abort();
        debug!(session_id = %session_id, "push channel closed");
    }
}

/// Holds at most one open push channel.
#[derive(Default)]
pub(crate) struct PushSlot {
    current: Mutex<Option<OpenChannel>>,
}

impl PushSlot {
    /// Installs a channel if `still_wanted` holds, closing the previous one.
    ///
    /// The check runs under the slot lock, so two racing installs cannot
    /// both succeed for an outdated switch. A rejected channel is closed.
    pub fn install_if(&self, channel: OpenChannel, still_wanted: impl FnOnce() -> bool) -> bool {
        let mut current = self.current.lock();
        if !still_wanted() {
            drop(current);
            channel.shut();
            return false;
        }
        let previous = current.replace(channel);
        drop(current);
        if let Some(previous) = previous {
            previous.shut();
        }
        true
    }

    /// Closes the open channel. Returns false if none was open.
    pub fn close(&self) -> bool {
        let previous = self.current.lock().take();
        match previous {
            Some(channel) => {
                channel.shut();
                true
            }
            None => false,
        }
    }

    /// Closes the open channel if it belongs to `session_id`.
    pub fn close_for(&self, session_id: &str) -> bool {
        let previous = {
            let mut current = self.current.lock();
            if current.as_ref().is_some_and(|c| c.session_id == session_id) {
                current.take()
            } else {
                None
            }
        };
        match previous {
            Some(channel) => {
                channel.shut();
                true
            }
            None => false,
        }
    }

    /// Session of the open channel.
    pub fn session_id(&self) -> Option<String> {
        self.current.lock().as_ref().map(|c| c.session_id.clone())
    }
}

impl Drop for PushSlot {
    fn drop(&mut self) {
        if let Some(channel) = self.current.get_mut().take() {
            channel.shut();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn channel(session_id: &str, closed: &Arc<AtomicUsize>) -> OpenChannel {
        let closed = Arc::clone(closed);
        OpenChannel {
            session_id: session_id.into(),
            task: tokio::spawn(std::future::pending()),
            closer: PushCloser::new(move || {
                closed.fetch_add(1, Ordering::SeqCst);
            }),
        }
    }

    #[tokio::test]
    async fn install_closes_previous() {
        let closed = Arc::new(AtomicUsize::new(0));
        let slot = PushSlot::default();

        assert!(slot.install_if(channel("a", &closed), || true));
        assert_eq!(closed.load(Ordering::SeqCst), 0);
        assert!(slot.install_if(channel("b", &closed), || true));
        assert_eq!(closed.load(Ordering::SeqCst), 1);
        assert_eq!(slot.session_id().as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn unwanted_channel_is_closed() {
        let closed = Arc::new(AtomicUsize::new(0));
        let slot = PushSlot::default();
        slot.install_if(channel("a", &closed), || true);

        assert!(!slot.install_if(channel("b", &closed), || false));
        assert_eq!(closed.load(Ordering::SeqCst), 1);
        assert_eq!(slot.session_id().as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn close_for_other_session_is_noop() {
        let closed = Arc::new(AtomicUsize::new(0));
        let slot = PushSlot::default();
        slot.install_if(channel("a", &closed), || true);

        assert!(!slot.close_for("b"));
        assert!(slot.close_for("a"));
        assert!(!slot.close());
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn drop_closes_channel() {
        let closed = Arc::new(AtomicUsize::new(0));
        {
            let slot = PushSlot::default();
            slot.install_if(channel("a", &closed), || true);
        }
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }
}

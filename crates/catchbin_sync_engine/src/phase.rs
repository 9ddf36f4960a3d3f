//! The two-phase completion contract.
//!
//! Every engine operation that talks to the server answers in two steps.
//! The fast phase runs against the local store and returns as soon as the
//! cached answer is published. The slow phase is a future that performs
//! the remote calls and finalizes local state; nothing happens until it
//! is awaited or spawned.

use crate::error::SyncResult;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// The remote half of an operation.
#[must_use = "the slow phase does nothing unless awaited or spawned"]
pub struct SlowPhase {
    inner: BoxFuture<'static, SyncResult<()>>,
}

impl SlowPhase {
    /// Wraps a future.
    pub fn new<F>(future: F) -> Self
    where
        F: Future<Output = SyncResult<()>> + Send + 'static,
    {
        Self {
            inner: future.boxed(),
        }
    }

    /// A slow phase with nothing left to do.
    pub fn done() -> Self {
        Self::new(futures::future::ready(Ok(())))
    }

    /// Runs the slow phase on the tokio runtime.
    pub fn spawn(self) -> tokio::task::JoinHandle<SyncResult<()>> {
        tokio::spawn(self)
    }
}

impl Future for SlowPhase {
    type Output = SyncResult<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.as_mut().poll(cx)
    }
}

impl std::fmt::Debug for SlowPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SlowPhase")
    }
}

/// Result of an operation's fast phase plus its slow phase.
#[derive(Debug)]
#[must_use = "the slow phase does nothing unless awaited or spawned"]
pub struct Phased<T> {
    /// Answer from the local store.
    pub fast: T,
    /// Remote completion.
    pub slow: SlowPhase,
}

impl<T> Phased<T> {
    /// A fast result with nothing left to do remotely.
    pub fn done(fast: T) -> Self {
        Self {
            fast,
            slow: SlowPhase::done(),
        }
    }

    /// Awaits the slow phase and returns the fast result.
    pub async fn complete(self) -> SyncResult<T> {
        self.slow.await?;
        Ok(self.fast)
    }
}

//! # catchbin Sync Engine
//!
//! Keeps sessions and captured requests consistent between a local store,
//! the remote API and a live push channel, while answering the UI from
//! the local store first.
//!
//! ## Two-phase operations
//!
//! Operations that involve the server return a [`Phased`] value:
//!
//! - `fast` - the answer from the local store, already published
//! - `slow` - a [`SlowPhase`] future performing the remote calls
//!
//! A failing slow phase is reported through its result and never rolls
//! back an optimistic local change.
//!
//! ## State
//!
//! [`EngineState`] holds the current session, current request, request
//! list, known session ids and the last-used marker. Observers receive
//! whole snapshots through [`SyncEngine::subscribe`].
//!
//! ## Key Invariants
//!
//! - At most one push channel is open; the old one closes before a new one opens
//! - The request list is ordered by capture time, newest first
//! - Push events are applied in channel order and are idempotent
//! - A payload resolves at most once and never resurrects a deleted request
//! - Results for a request that is no longer selected are discarded
//! - The server is authoritative; the local store is a cache

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod channel;
mod config;
mod engine;
mod error;
mod ingest;
mod listener;
mod phase;
mod reconcile;
mod requests;
mod sessions;
mod state;

pub use config::{EngineConfig, PushOrdering};
pub use engine::SyncEngine;
pub use error::{SyncError, SyncResult};
pub use listener::{NoopListener, PushListener};
pub use phase::{Phased, SlowPhase};
pub use state::{EngineState, EngineStats};

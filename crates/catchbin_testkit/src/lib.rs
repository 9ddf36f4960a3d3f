//! # catchbin Testkit
//!
//! Test utilities for catchbin.
//!
//! This crate provides:
//! - Fixtures for sessions, requests and ready-to-use engines
//! - Property-based test generators using proptest
//! - A push listener that records what it was told
//! - Helpers for waiting on asynchronous engine state
//!
//! ## Usage
//!
//! ```rust,ignore
//! use catchbin_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn switch_uses_cache() {
//!     let engine = test_engine();
//!     let session = engine.new_session(&scenario_options()).await.unwrap();
//!     let phased = engine
//!         .switch_to_session(&session.id, RecordingListener::new())
//!         .await
//!         .unwrap();
//!     assert_eq!(phased.fast, Some(session));
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod listener;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::listener::*;
}

pub use fixtures::*;
pub use generators::*;
pub use listener::*;

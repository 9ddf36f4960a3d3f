//! # catchbin model
//!
//! Entity types shared by every catchbin crate.
//!
//! A [`Session`] is a capture endpoint with a configured HTTP response.
//! A [`Request`] is one HTTP call captured against a session's endpoint.
//! Requests announced over the push channel arrive without their body, so
//! [`Request::payload`] is a [`Payload`] that starts out pending and is
//! resolved at most once.
//!
//! ## Ordering
//!
//! Requests belonging to a session are ordered by `captured_at`, newest
//! first. [`sort_newest_first`] and [`insert_newest_first`] maintain that
//! order for lists held by the sync engine and returned by stores.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod event;
mod payload;
mod request;
mod session;

pub use error::{ModelError, ModelResult};
pub use event::PushEvent;
pub use payload::Payload;
pub use request::{insert_newest_first, sort_newest_first, Request};
pub use session::{
    Header, Session, SessionOptions, DEFAULT_STATUS_CODE, MAX_DELAY_SECONDS,
    MAX_RESPONSE_BODY_SIZE, MAX_STATUS_CODE, MIN_STATUS_CODE,
};

/// Timestamp type used for `created_at` and `captured_at`.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

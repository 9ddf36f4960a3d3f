//! # catchbin remote
//!
//! Client side of the catchbin API.
//!
//! [`RemoteClient`] is the contract the sync engine programs against:
//! request/response calls for sessions and captured requests, plus a push
//! channel per session that announces created, deleted and cleared
//! requests.
//!
//! ## Implementations
//!
//! - [`HttpRemote`] - JSON over HTTP, with push frames over a socket. The
//!   HTTP and socket libraries plug in through [`HttpClient`] and
//!   [`SocketConnector`].
//! - [`MockRemote`] - an in-memory server for tests.
//!
//! ## Retries
//!
//! Only idempotent calls (fetches and the existence check) are retried,
//! following [`RetryConfig`]. Creates and deletes are attempted once.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod client;
mod config;
mod error;
mod http;
mod mock;
mod wire;

pub use client::{PushCloser, PushSubscription, RemoteClient};
pub use config::{RemoteConfig, RetryConfig};
pub use error::{RemoteError, RemoteResult};
pub use http::{HttpClient, HttpMethod, HttpRemote, HttpRequest, HttpResponse, SocketConnector, SocketStream};
pub use mock::{Endpoint, MockRemote, RequestGate};

//! # catchbin storage
//!
//! The local persistent cache behind the sync engine.
//!
//! [`LocalStore`] is the contract the engine programs against: bulk
//! put/get/delete of sessions and requests, each call one transaction.
//! [`LogStore`] implements it on top of an append-only byte log:
//!
//! - every transaction is one CRC-checked record holding a CBOR batch
//! - opening a store replays the log into in-memory indexes
//! - a torn record at the end of the log is dropped on open
//! - [`LogStore::compact`] rewrites the log as one snapshot record
//!
//! ## Backends
//!
//! - [`InMemoryBackend`] - for tests and ephemeral clients
//! - [`FileBackend`] - one file, exclusively locked by its owner
//!
//! ## Example
//!
//! ```rust
//! use catchbin_storage::{LocalStore, LogStore};
//!
//! # tokio_test_block_on(async {
//! let store = LogStore::in_memory();
//! store.set_last_used_session(Some("3f2a9c")).await.unwrap();
//! assert_eq!(store.last_used().as_deref(), Some("3f2a9c"));
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod log_store;
mod memory;
mod record;
mod store;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use log_store::{CompactionResult, LogStore, StoreStats};
pub use memory::InMemoryBackend;
pub use record::{compute_crc32, read_record, LogRecord, ReadOutcome, StoreOp, LOG_MAGIC, LOG_VERSION};
pub use store::LocalStore;

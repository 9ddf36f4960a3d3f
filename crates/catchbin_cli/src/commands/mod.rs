//! CLI command implementations.

pub mod compact;
pub mod inspect;
pub mod requests;
pub mod sessions;

use catchbin_storage::{FileBackend, LogStore};
use std::path::Path;
use tracing::debug;

/// Opens an existing store file. Unlike [`LogStore::open_path`], a
/// missing file is an error rather than a new store.
pub fn open_store(path: &Path) -> Result<LogStore<FileBackend>, Box<dyn std::error::Error>> {
    if !path.is_file() {
        return Err(format!("No store found at {:?}", path).into());
    }
    debug!(path = %path.display(), "opening store");
    Ok(LogStore::open_path(path)?)
}

/// Formats a byte count for display.
pub fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} bytes", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

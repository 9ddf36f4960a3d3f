//! Sessions command implementation.

use super::open_store;
use catchbin_model::Timestamp;
use std::path::Path;

/// One row of the session listing.
#[derive(Debug, PartialEq, Eq)]
pub struct SessionRow {
    /// Session id.
    pub id: String,
    /// Configured status code.
    pub status_code: u16,
    /// Configured delay in seconds.
    pub delay_seconds: u32,
    /// Creation time.
    pub created_at: Timestamp,
    /// Cached requests.
    pub requests: usize,
    /// Whether this is the last-used session.
    pub last_used: bool,
}

/// Lists the sessions in the store at `path`, oldest first.
pub fn list(path: &Path) -> Result<Vec<SessionRow>, Box<dyn std::error::Error>> {
    let store = open_store(path)?;
    let last_used = store.last_used();
    Ok(store
        .sessions()
        .into_iter()
        .map(|session| SessionRow {
            requests: store.requests_for(&session.id).len(),
            last_used: last_used.as_deref() == Some(session.id.as_str()),
            id: session.id,
            status_code: session.status_code,
            delay_seconds: session.delay_seconds,
            created_at: session.created_at,
        })
        .collect())
}

/// Runs the sessions command.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let rows = list(path)?;
    if rows.is_empty() {
        println!("No sessions");
        return Ok(());
    }
    for row in &rows {
        println!(
            "{} {:<34} status {} delay {}s  {} requests  created {}",
            if row.last_used { "*" } else { " " },
            row.id,
            row.status_code,
            row.delay_seconds,
            row.requests,
            row.created_at.to_rfc3339(),
        );
    }
    Ok(())
}

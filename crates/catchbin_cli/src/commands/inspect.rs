//! Inspect command implementation.

use super::{format_size, open_store};
use serde::Serialize;
use std::path::Path;

/// Store inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Store path.
    pub path: String,
    /// Log size in bytes.
    pub log_bytes: u64,
    /// Number of log records.
    pub records: u64,
    /// Log size after compaction.
    pub compacted_bytes: u64,
    /// Number of cached sessions.
    pub sessions: usize,
    /// Number of cached requests.
    pub requests: usize,
    /// Requests whose payload has been fetched.
    pub resolved_payloads: usize,
    /// Requests whose payload is still pending.
    pub pending_payloads: usize,
    /// The last-used session marker.
    pub last_used_session: Option<String>,
}

/// Collects statistics for the store at `path`.
pub fn inspect(path: &Path) -> Result<InspectResult, Box<dyn std::error::Error>> {
    let store = open_store(path)?;
    let stats = store.stats();
    Ok(InspectResult {
        path: path.display().to_string(),
        log_bytes: stats.log_bytes,
        records: stats.records,
        compacted_bytes: store.compacted_size()?,
        sessions: stats.sessions,
        requests: stats.requests,
        resolved_payloads: stats.resolved_payloads,
        pending_payloads: stats.requests - stats.resolved_payloads,
        last_used_session: store.last_used(),
    })
}

/// Runs the inspect command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let result = inspect(path)?;
    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }
    Ok(())
}

fn print_text_output(result: &InspectResult) {
    println!("catchbin Store Inspection");
    println!("=========================");
    println!();
    println!("Path: {}", result.path);
    println!();
    println!("Log:");
    println!("  Size:            {}", format_size(result.log_bytes));
    println!("  Records:         {}", result.records);
    println!("  After compact:   {}", format_size(result.compacted_bytes));
    println!();
    println!("Contents:");
    println!("  Sessions:          {}", result.sessions);
    println!("  Requests:          {}", result.requests);
    println!("  Resolved payloads: {}", result.resolved_payloads);
    println!("  Pending payloads:  {}", result.pending_payloads);
    println!(
        "  Last used:         {}",
        result.last_used_session.as_deref().unwrap_or("-")
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::sample_store;

    #[tokio::test]
    async fn reports_contents() {
        let (_dir, path) = sample_store().await;
        let result = inspect(&path).unwrap();

        assert_eq!(result.sessions, 2);
        assert_eq!(result.requests, 2);
        assert_eq!(result.resolved_payloads, 1);
        assert_eq!(result.pending_payloads, 1);
        assert_eq!(result.last_used_session.as_deref(), Some("s1"));
        assert_eq!(result.records, 7);
        assert!(result.compacted_bytes < result.log_bytes);
    }

    #[tokio::test]
    async fn serializes_to_json() {
        let (_dir, path) = sample_store().await;
        let result = inspect(&path).unwrap();
        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&result).unwrap()).unwrap();
        assert_eq!(json["sessions"], 2);
        assert_eq!(json["last_used_session"], "s1");
    }
}

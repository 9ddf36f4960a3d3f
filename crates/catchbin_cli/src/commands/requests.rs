//! Requests command implementation.

use super::open_store;
use catchbin_model::Request;
use std::path::Path;

/// Lists the cached requests of a session, newest first.
pub fn list(path: &Path, session_id: &str) -> Result<Vec<Request>, Box<dyn std::error::Error>> {
    let store = open_store(path)?;
    if store.session(session_id).is_none() {
        return Err(format!("Session {} not found", session_id).into());
    }
    Ok(store.requests_for(session_id))
}

/// Runs the requests command.
pub fn run(path: &Path, session_id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let requests = list(path, session_id)?;
    if requests.is_empty() {
        println!("No requests for session {}", session_id);
        return Ok(());
    }
    for request in &requests {
        println!(
            "{}  {:<7} {:<40} from {:<15} {}  {}",
            request.captured_at.to_rfc3339(),
            request.method,
            request.url,
            request.client_address,
            request.id,
            describe_payload(request),
        );
    }
    Ok(())
}

fn describe_payload(request: &Request) -> String {
    match request.payload.bytes() {
        Some(bytes) => format!("{} byte body", bytes.len()),
        None => "body pending".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::sample_store;

    #[tokio::test]
    async fn lists_newest_first() {
        let (_dir, path) = sample_store().await;
        let requests = list(&path, "s1").unwrap();

        let ids: Vec<_> = requests.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["r2", "r1"]);
        assert_eq!(describe_payload(&requests[0]), "5 byte body");
        assert_eq!(describe_payload(&requests[1]), "body pending");
    }

    #[tokio::test]
    async fn unknown_session_is_an_error() {
        let (_dir, path) = sample_store().await;
        assert!(list(&path, "gone").is_err());
    }
}

//! Property-based test generators using proptest.
//!
//! Provides strategies for generating session options, captured requests
//! and push event sequences that keep the model's invariants.

use crate::fixtures::{request, timestamp};
use catchbin_model::{Header, Payload, PushEvent, Request, SessionOptions};
use proptest::prelude::*;

/// Strategy for generating valid header names (HTTP tokens).
pub fn header_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Za-z][A-Za-z0-9-]{0,15}").expect("Invalid regex")
}

/// Strategy for generating headers with printable values.
pub fn header_strategy() -> impl Strategy<Value = Header> {
    (
        header_name_strategy(),
        prop::string::string_regex("[ -~]{0,32}").expect("Invalid regex"),
    )
        .prop_map(|(name, value)| Header::new(name, value))
}

/// Strategy for generating session options that normalize successfully.
///
/// Status codes and delays range past their limits to exercise clamping.
pub fn session_options_strategy() -> impl Strategy<Value = SessionOptions> {
    (
        prop::option::of(0u16..1000),
        prop::option::of(prop::collection::vec(header_strategy(), 0..4)),
        prop::option::of(0u32..60),
        prop::option::of(prop::collection::vec(any::<u8>(), 0..256)),
    )
        .prop_map(
            |(status_code, headers, delay_seconds, response_body)| SessionOptions {
                status_code,
                headers,
                delay_seconds,
                response_body,
            },
        )
}

/// Strategy for generating request ids.
pub fn request_id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z0-9]{12}").expect("Invalid regex")
}

/// Strategy for generating a request of `session_id`, payload pending or resolved.
pub fn request_strategy(session_id: &str) -> impl Strategy<Value = Request> {
    let session_id = session_id.to_string();
    (
        request_id_strategy(),
        0i64..10_000,
        prop::option::of(prop::collection::vec(any::<u8>(), 0..128)),
    )
        .prop_map(move |(id, secs, body)| Request {
            payload: body.map_or(Payload::Pending, Payload::Resolved),
            ..request(&id, &session_id, secs)
        })
}

/// Strategy for generating capture times, in seconds, for `1..max` requests.
///
/// Times may repeat, as they do when requests arrive within one tick.
pub fn capture_times_strategy(max: usize) -> impl Strategy<Value = Vec<i64>> {
    prop::collection::vec(0i64..100, 1..max.max(2))
}

/// Strategy for generating push events for `session_id` over a small
/// pool of requests, so creates repeat and deletes hit existing ids.
///
/// Creates carry pending payloads, the way the push channel delivers them.
pub fn push_events_strategy(session_id: &str) -> impl Strategy<Value = Vec<PushEvent>> {
    let session_id = session_id.to_string();
    (prop::collection::vec(0i64..50, 1..8), 1usize..24).prop_flat_map(move |(times, len)| {
        let pool = times.len();
        let session_id = session_id.clone();
        prop::collection::vec((0u8..10, 0..pool), len).prop_map(move |steps| {
            steps
                .into_iter()
                .map(|(kind, index)| {
                    let id = format!("r{}", index);
                    match kind {
                        0 => PushEvent::Clear,
                        1..=3 => PushEvent::Delete { request_id: id },
                        _ => PushEvent::Create(request(&id, &session_id, times[index])),
                    }
                })
                .collect::<Vec<_>>()
        })
    })
}

/// Replays push events against a plain list, as a reference model.
pub fn replay_events(events: &[PushEvent]) -> Vec<Request> {
    let mut list = Vec::new();
    for event in events {
        match event {
            PushEvent::Create(request) => {
                catchbin_model::insert_newest_first(&mut list, request.clone());
            }
            PushEvent::Delete { request_id } => list.retain(|r| &r.id != request_id),
            PushEvent::Clear => list.clear(),
        }
    }
    list
}

/// Builds pending requests `r0..` for the given capture times.
pub fn requests_at(session_id: &str, times: &[i64]) -> Vec<Request> {
    times
        .iter()
        .enumerate()
        .map(|(i, secs)| request(&format!("r{}", i), session_id, *secs))
        .collect()
}

/// Returns true if `requests` is ordered newest first.
pub fn is_newest_first(requests: &[Request]) -> bool {
    requests
        .windows(2)
        .all(|pair| pair[0].captured_at >= pair[1].captured_at)
}

/// The time a fixture request captured at `secs` carries.
pub fn captured_at(secs: i64) -> catchbin_model::Timestamp {
    timestamp(secs)
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn generated_headers_are_valid(header in header_strategy()) {
            prop_assert!(header.has_valid_name());
        }

        #[test]
        fn generated_options_normalize(options in session_options_strategy()) {
            let normalized = options.normalize();
            prop_assert!(normalized.is_ok());
        }

        #[test]
        fn replay_keeps_order(events in push_events_strategy("s1")) {
            let list = replay_events(&events);
            prop_assert!(is_newest_first(&list));
            let mut ids: Vec<_> = list.iter().map(|r| r.id.clone()).collect();
            ids.sort();
            ids.dedup();
            prop_assert_eq!(ids.len(), list.len());
        }

        #[test]
        fn requests_at_uses_given_times(times in capture_times_strategy(10)) {
            let list = requests_at("s1", &times);
            prop_assert_eq!(list.len(), times.len());
            for (request, secs) in list.iter().zip(&times) {
                prop_assert_eq!(request.captured_at, captured_at(*secs));
            }
        }
    }
}

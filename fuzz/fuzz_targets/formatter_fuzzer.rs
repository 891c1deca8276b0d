//! Fuzz target for the payload formatter pipeline
//!
//! Webhook payloads are attacker-controlled JSON; the formatters must
//! degrade gracefully instead of panicking.
//!
//! # Strategy
//!
//! - Arbitrary JSON documents: objects, arrays, scalars, deep nesting
//! - Arbitrary `X-GitHub-Event` header values
//! - Every formatter applied to every input
//!
//! # Invariants
//!
//! - NEVER panic on any input
//! - A set `body` field is always a string
//! - Non-object payloads pass through untouched

#![no_main]

use std::str::FromStr;

use arbitrary::Arbitrary;
use axum::http::HeaderMap;
use libfuzzer_sys::fuzz_target;
use skald_gateway::formatters::Formatter;

#[derive(Debug, Clone, Arbitrary)]
struct FuzzInput {
    /// Selects the formatter under test.
    formatter: u8,
    /// Raw value for the `X-GitHub-Event` header, when parseable.
    event_header: Option<String>,
    /// Raw payload; runs are skipped when it is not valid JSON.
    payload: String,
}

const FORMATTERS: [&str; 5] =
    ["grafana", "grafana9", "github", "gitlab_gchat", "gitlab_teams"];

fuzz_target!(|input: FuzzInput| {
    let Ok(mut data) = serde_json::from_str::<serde_json::Value>(&input.payload) else {
        return;
    };
    let was_object = data.is_object();
    let original = data.clone();

    let name = FORMATTERS[usize::from(input.formatter) % FORMATTERS.len()];
    let formatter = Formatter::from_str(name).unwrap();

    let mut headers = HeaderMap::new();
    if let Some(event) = &input.event_header {
        if let Ok(value) = event.parse() {
            headers.insert("x-github-event", value);
        }
    }

    formatter.apply(&mut data, &headers);

    if let Some(body) = data.get("body") {
        if original.get("body") != Some(body) {
            assert!(body.is_string(), "formatters only ever set a string body");
        }
    }
    if !was_object {
        assert_eq!(data, original, "non-object payloads must pass through untouched");
    }
});

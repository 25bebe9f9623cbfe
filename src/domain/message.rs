//! Interpretation of raw job queue bodies.
//!
//! A body is either an S3 event notification or a bare object key that was
//! enqueued by hand. Both become a [`JobIntent`].

use super::jobs::JobIntent;
use serde::Deserialize;

/// Marker carried by the probe S3 sends when a notification target is configured.
pub const TEST_EVENT_MARKER: &str = "s3:TestEvent";

#[derive(Debug, Deserialize)]
struct EventEnvelope {
    #[serde(rename = "Records", default)]
    records: Vec<EventRecord>,
}

#[derive(Debug, Deserialize)]
struct EventRecord {
    s3: Option<S3Entity>,
}

#[derive(Debug, Deserialize)]
struct S3Entity {
    object: Option<S3Object>,
}

#[derive(Debug, Deserialize)]
struct S3Object {
    key: Option<String>,
}

pub fn interpret(body: &str) -> JobIntent {
    if body.contains(TEST_EVENT_MARKER) {
        return JobIntent::Ignore;
    }

    let object_key = envelope_key(body).unwrap_or_else(|| body.to_string());
    if object_key.is_empty() {
        JobIntent::Ignore
    } else {
        JobIntent::Process { object_key }
    }
}

/// Key of the first record, if `body` is an event envelope that carries one.
fn envelope_key(body: &str) -> Option<String> {
    let envelope: EventEnvelope = serde_json::from_str(body).ok()?;
    envelope
        .records
        .into_iter()
        .next()?
        .s3?
        .object?
        .key
        .filter(|key| !key.is_empty())
}

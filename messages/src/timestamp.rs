//! Timestamp parsing for submissions.

use chrono::{DateTime, NaiveDateTime, Utc};

/// Parse an ISO-8601 timestamp.
///
/// Accepts RFC 3339 (`2024-05-01T12:00:00Z`, `...+02:00`) and naive
/// timestamps without an offset, which are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

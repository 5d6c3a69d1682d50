//! Timestamp utilities.

use chrono::{DateTime, Utc};

/// A UTC timestamp used on task state mutations.
pub type Timestamp = DateTime<Utc>;

/// Returns the current UTC timestamp.
#[must_use]
pub fn now_utc() -> Timestamp {
    Utc::now()
}

/// Returns the current UTC time as an ISO 8601 formatted string:
/// `YYYY-MM-DDTHH:MM:SS.ffffff+00:00`.
#[must_use]
pub fn iso_timestamp() -> String {
    format_iso8601(&now_utc())
}

/// Formats a timestamp as an ISO 8601 string.
#[must_use]
pub fn format_iso8601(timestamp: &Timestamp) -> String {
    timestamp.format("%Y-%m-%dT%H:%M:%S%.6f+00:00").to_string()
}

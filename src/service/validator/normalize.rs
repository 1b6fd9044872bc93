//! Rewrites legacy field shapes before a document is submitted
//!
//! Each rule applies only when its field is present and still in the legacy
//! shape, so running the rules on their own output changes nothing.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;

use crate::model::document::{PID_FIELDS, TIME_FIELD, VERSION_FIELD};
use crate::model::CandidateDocument;

/// OCSF schema version every submitted document is pinned to
pub const PINNED_SCHEMA_VERSION: &str = "1.3.0";

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

#[derive(Debug, thiserror::Error)]
pub enum NormalizationError {
    #[error("malformed timestamp in `time`: '{0}'")]
    MalformedTimestamp(String),

    #[error("malformed hexadecimal pid at `{field}`: '{value}'")]
    MalformedPid { field: &'static str, value: String },
}

/// Produce the submission form of a document
pub fn normalize(document: &CandidateDocument) -> Result<CandidateDocument, NormalizationError> {
    let mut normalized = document.clone();

    if let Some(Value::String(raw)) = normalized.get(TIME_FIELD) {
        let millis = parse_timestamp_millis(raw)?;
        normalized = normalized.with_field(TIME_FIELD, Value::from(millis));
    }

    for &field in PID_FIELDS {
        if let Some(Value::String(raw)) = normalized.get(field) {
            if let Some(pid) = parse_hex_pid(field, raw)? {
                normalized = normalized.with_field(field, Value::from(pid));
            }
        }
    }

    if normalized.get(VERSION_FIELD).is_some() {
        normalized = normalized.with_field(VERSION_FIELD, Value::from(PINNED_SCHEMA_VERSION));
    }

    Ok(normalized)
}

/// Parse an ISO-8601 timestamp into epoch milliseconds
///
/// Offsets and `Z` are honored; naive timestamps are read as UTC.
pub fn parse_timestamp_millis(raw: &str) -> Result<i64, NormalizationError> {
    let trimmed = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.timestamp_millis());
    }

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(naive.and_utc().timestamp_millis());
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(midnight.and_utc().timestamp_millis());
        }
    }

    Err(NormalizationError::MalformedTimestamp(raw.to_string()))
}

/// Parse a `0x`-prefixed pid, `None` for anything not in that shape
fn parse_hex_pid(field: &'static str, raw: &str) -> Result<Option<u64>, NormalizationError> {
    let Some(digits) = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) else {
        return Ok(None);
    };

    u64::from_str_radix(digits, 16)
        .map(Some)
        .map_err(|_| NormalizationError::MalformedPid {
            field: field.trim_start_matches('/'),
            value: raw.to_string(),
        })
}

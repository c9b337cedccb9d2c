//! Lenient timestamp decoding.
//!
//! The analysis backend stamps updates with naive ISO-8601 strings
//! (no offset), other deployments send RFC 3339 or numeric epochs.
//! [`TimestampRepr`] accepts all of them and [`TimestampRepr::resolve`]
//! normalises to UTC.

use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::types::Timestamp;

/// Epoch values at or above this magnitude are read as milliseconds.
const EPOCH_MILLIS_THRESHOLD: f64 = 1e11;

const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// A timestamp as it appeared on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimestampRepr {
    Text(String),
    Epoch(f64),
}

impl TimestampRepr {
    /// Normalise to a UTC instant, or `None` if the value is not a
    /// recognisable timestamp.
    pub fn resolve(&self) -> Option<Timestamp> {
        match self {
            TimestampRepr::Text(text) => parse_text(text.trim()),
            TimestampRepr::Epoch(value) => parse_epoch(*value),
        }
    }
}

impl From<Timestamp> for TimestampRepr {
    fn from(ts: Timestamp) -> Self {
        TimestampRepr::Text(ts.to_rfc3339())
    }
}

impl fmt::Display for TimestampRepr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimestampRepr::Text(text) => write!(f, "{text:?}"),
            TimestampRepr::Epoch(value) => write!(f, "{value}"),
        }
    }
}

fn parse_text(text: &str) -> Option<Timestamp> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .map(|naive| naive.and_utc())
}

fn parse_epoch(value: f64) -> Option<Timestamp> {
    if !value.is_finite() {
        return None;
    }
    if value.abs() >= EPOCH_MILLIS_THRESHOLD {
        return DateTime::from_timestamp_millis(value as i64);
    }
    let secs = value.floor();
    let nanos = ((value - secs) * 1e9) as u32;
    DateTime::from_timestamp(secs as i64, nanos)
}

/// `deserialize_with` helper for optional timestamps that should not fail
/// the surrounding payload when unrecognisable.
pub fn deserialize_lenient<'de, D>(deserializer: D) -> Result<Option<Timestamp>, D::Error>
where
    D: Deserializer<'de>,
{
    let repr = Option::<TimestampRepr>::deserialize(deserializer)?;
    Ok(repr.and_then(|r| r.resolve()))
}

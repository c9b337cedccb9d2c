//! Parser for live-channel text frames.
//!
//! Frames carry a JSON-encoded update such as
//! `{"document_id": "...", "progress": 0.4, "status": "analyzing", ...}`.
//! Some backends serialize the update to a string and then send that string
//! as JSON, so one level of string wrapping is unwrapped.

use docsight_core::update::RawUpdate;

/// Parse a text frame into a [`RawUpdate`].
///
/// Returns `Err` for malformed JSON or a non-object payload. Callers
/// should log and keep reading.
pub fn parse_update(text: &str) -> Result<RawUpdate, serde_json::Error> {
    match serde_json::from_str::<serde_json::Value>(text)? {
        serde_json::Value::String(inner) => serde_json::from_str(&inner),
        value => serde_json::from_value(value),
    }
}

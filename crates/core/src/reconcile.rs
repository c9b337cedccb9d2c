//! The status reconciler: the only place a [`StatusRecord`] is derived.
//!
//! Rules:
//! - an incoming update older than the current record is discarded;
//! - otherwise its status and timestamp are adopted;
//! - its progress is adopted only when positive, so placeholders and
//!   synthesized error markers never rewind the progress bar;
//! - a result, once attached, is never replaced.
//!
//! Every function returns a fresh record; inputs are never mutated.

use crate::status::{JobStatus, ResultPayload, StatusRecord};
use crate::update::Update;

/// Whether `incoming` would be accepted on top of `current`.
pub fn accepts(current: Option<&StatusRecord>, incoming: &Update) -> bool {
    current.map_or(true, |c| c.timestamp <= incoming.timestamp)
}

/// Fold `incoming` into `current`, producing the successor record.
pub fn merge(current: Option<&StatusRecord>, incoming: &Update) -> StatusRecord {
    let Some(current) = current else {
        return StatusRecord {
            job_id: incoming.job_id.clone(),
            status: incoming.status.unwrap_or(JobStatus::Processing),
            progress: incoming.meaningful_progress().unwrap_or(0.0),
            timestamp: incoming.timestamp,
            message: incoming.message.clone(),
            result: incoming.result.clone(),
        };
    };

    if !accepts(Some(current), incoming) {
        return current.clone();
    }

    StatusRecord {
        job_id: current.job_id.clone(),
        status: incoming.status.unwrap_or(current.status),
        progress: incoming.meaningful_progress().unwrap_or(current.progress),
        timestamp: incoming.timestamp,
        message: incoming.message.clone(),
        result: current.result.clone().or_else(|| incoming.result.clone()),
    }
}

/// Attach the final result fetched after completion.
///
/// Marks the record `complete` at full progress. A record that already
/// carries a result is returned unchanged.
pub fn attach_result(current: &StatusRecord, result: ResultPayload) -> StatusRecord {
    if current.result.is_some() {
        return current.clone();
    }
    StatusRecord {
        status: JobStatus::Complete,
        progress: 1.0,
        result: Some(result),
        ..current.clone()
    }
}

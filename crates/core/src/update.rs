//! Raw, unvalidated status events and their typed counterpart.
//!
//! Both the live channel and the polling fallback produce [`RawUpdate`]s.
//! They are only trusted after [`RawUpdate::into_update`] has checked the
//! status and resolved the timestamp.

use serde::{Deserialize, Serialize};

use crate::status::{JobStatus, ResultPayload};
use crate::timestamp::TimestampRepr;
use crate::types::{JobId, Timestamp};

/// Progress value carried by synthesized error markers.
pub const SYNTHETIC_PROGRESS: f64 = -1.0;

/// A status event exactly as received from a channel frame or a status
/// query. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawUpdate {
    pub document_id: Option<String>,
    pub status: Option<String>,
    pub progress: Option<f64>,
    pub message: Option<String>,
    pub timestamp: Option<TimestampRepr>,
    pub result: Option<ResultPayload>,
    #[serde(skip)]
    synthetic: bool,
}

/// Why a [`RawUpdate`] was rejected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MalformedUpdate {
    #[error("update has no status")]
    MissingStatus,

    #[error("unknown status {0:?}")]
    UnknownStatus(String),

    #[error("update has no progress")]
    MissingProgress,

    #[error("progress is not a finite number")]
    InvalidProgress,

    #[error("unrecognised timestamp {0}")]
    InvalidTimestamp(String),
}

impl RawUpdate {
    /// Locally generated `{status: error, progress: -1}` marker.
    ///
    /// Used for a stalled live channel and for degraded polling. It has no
    /// timestamp of its own; the receiver stamps it on arrival.
    pub fn synthetic_error(job_id: &str) -> Self {
        Self {
            document_id: Some(job_id.to_string()),
            status: Some(JobStatus::Error.as_str().to_string()),
            progress: Some(SYNTHETIC_PROGRESS),
            synthetic: true,
            ..Default::default()
        }
    }

    pub fn is_synthetic(&self) -> bool {
        self.synthetic
    }

    /// Parsed status, ignoring unknown values.
    pub fn job_status(&self) -> Option<JobStatus> {
        self.status.as_deref().and_then(JobStatus::parse)
    }

    /// Require both `status` and `progress`, as a status query response must
    /// carry them. An empty status or a zero progress counts as missing.
    pub fn check_required(&self) -> Result<JobStatus, MalformedUpdate> {
        let status = parse_status(self.status.as_deref())?.ok_or(MalformedUpdate::MissingStatus)?;
        match self.progress {
            None => Err(MalformedUpdate::MissingProgress),
            Some(p) if p == 0.0 => Err(MalformedUpdate::MissingProgress),
            Some(p) if !p.is_finite() => Err(MalformedUpdate::InvalidProgress),
            Some(_) => Ok(status),
        }
    }

    /// Validate into an [`Update`] for `job_id`.
    ///
    /// Missing status or progress is allowed (partial update); an unknown
    /// status, a non-finite progress or an unreadable timestamp is not.
    /// Updates without a timestamp are stamped with `received_at`.
    pub fn into_update(self, job_id: &str, received_at: Timestamp) -> Result<Update, MalformedUpdate> {
        let status = parse_status(self.status.as_deref())?;
        if matches!(self.progress, Some(p) if !p.is_finite()) {
            return Err(MalformedUpdate::InvalidProgress);
        }
        let timestamp = match &self.timestamp {
            None => received_at,
            Some(repr) => repr
                .resolve()
                .ok_or_else(|| MalformedUpdate::InvalidTimestamp(repr.to_string()))?,
        };

        Ok(Update {
            job_id: self.document_id.unwrap_or_else(|| job_id.to_string()),
            status,
            progress: self.progress,
            timestamp,
            message: self.message,
            result: self.result,
            synthetic: self.synthetic,
        })
    }
}

fn parse_status(raw: Option<&str>) -> Result<Option<JobStatus>, MalformedUpdate> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => JobStatus::parse(s)
            .map(Some)
            .ok_or_else(|| MalformedUpdate::UnknownStatus(s.to_string())),
    }
}

/// A validated update, ready for [`crate::reconcile::merge`].
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub job_id: JobId,
    /// `None` for progress-only updates.
    pub status: Option<JobStatus>,
    /// `None`, zero or negative means "unknown".
    pub progress: Option<f64>,
    pub timestamp: Timestamp,
    pub message: Option<String>,
    pub result: Option<ResultPayload>,
    pub synthetic: bool,
}

impl Update {
    /// Progress worth showing, clamped to 1.
    pub fn meaningful_progress(&self) -> Option<f64> {
        self.progress.filter(|p| *p > 0.0).map(|p| p.min(1.0))
    }

    /// A real (non-synthetic) update that ends the job.
    pub fn is_terminal(&self) -> bool {
        !self.synthetic && self.status.is_some_and(|s| s.is_terminal())
    }
}

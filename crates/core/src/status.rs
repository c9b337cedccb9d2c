//! Job status, result payload and the reconciled [`StatusRecord`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::timestamp::deserialize_lenient;
use crate::types::{JobId, Timestamp};

// ---------------------------------------------------------------------------
// JobStatus
// ---------------------------------------------------------------------------

/// Lifecycle stage reported by the analysis service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Processing,
    Analyzing,
    Complete,
    Error,
}

impl JobStatus {
    /// Wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Processing => "processing",
            JobStatus::Analyzing => "analyzing",
            JobStatus::Complete => "complete",
            JobStatus::Error => "error",
        }
    }

    /// Parse the wire representation. Unknown values yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "processing" => Some(JobStatus::Processing),
            "analyzing" => Some(JobStatus::Analyzing),
            "complete" => Some(JobStatus::Complete),
            "error" => Some(JobStatus::Error),
            _ => None,
        }
    }

    /// `complete` and `error` end the job on the server side.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Complete | JobStatus::Error)
    }

    /// Heading shown next to the progress bar.
    pub fn label(&self) -> &'static str {
        match self {
            JobStatus::Processing => "Processing Document",
            JobStatus::Analyzing => "Analyzing Content",
            JobStatus::Complete => "Analysis Complete",
            JobStatus::Error => "Processing Error",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ResultPayload
// ---------------------------------------------------------------------------

/// One finding extracted from the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub text: String,
    /// Model confidence in `[0, 1]`.
    pub confidence: f64,
    #[serde(default)]
    pub category: Option<String>,
}

/// Final analysis output, fetched once the job reports `complete`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultPayload {
    #[serde(default)]
    pub document_id: Option<String>,
    pub filename: String,
    pub word_count: u64,
    pub processing_time_seconds: f64,
    #[serde(default)]
    pub key_insights: Vec<Insight>,
    #[serde(default)]
    pub sentiment_score: Option<f64>,
    #[serde(default)]
    pub topics: Option<Vec<String>>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default, deserialize_with = "deserialize_lenient")]
    pub completed_at: Option<Timestamp>,
}

// ---------------------------------------------------------------------------
// StatusRecord
// ---------------------------------------------------------------------------

/// The single authoritative view of one job's progress.
///
/// Only [`crate::reconcile`] builds successor records; everything else
/// reads through the accessors.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusRecord {
    pub(crate) job_id: JobId,
    pub(crate) status: JobStatus,
    pub(crate) progress: f64,
    pub(crate) timestamp: Timestamp,
    pub(crate) message: Option<String>,
    pub(crate) result: Option<ResultPayload>,
}

impl StatusRecord {
    /// Record created right after submission, before any update arrived.
    pub fn initial(job_id: impl Into<JobId>, status: JobStatus, timestamp: Timestamp) -> Self {
        Self {
            job_id: job_id.into(),
            status,
            progress: 0.0,
            timestamp,
            message: None,
            result: None,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    /// Progress in `[0, 1]`.
    pub fn progress(&self) -> f64 {
        self.progress.clamp(0.0, 1.0)
    }

    /// Progress as a whole percentage, for display.
    pub fn percent(&self) -> u8 {
        (self.progress() * 100.0).round() as u8
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn result(&self) -> Option<&ResultPayload> {
        self.result.as_ref()
    }
}

//! REST client for the document-analysis HTTP endpoints.
//!
//! Wraps submission (`POST /api/documents`), status queries
//! (`GET /api/documents/{id}`) and the health probe using [`reqwest`].
//! [`JobService`] is the seam the session and polling driver depend on.

use std::time::Duration;

use async_trait::async_trait;
use docsight_core::document::Document;
use docsight_core::status::{JobStatus, StatusRecord};
use docsight_core::timestamp::deserialize_lenient;
use docsight_core::types::{JobId, Timestamp};
use docsight_core::update::RawUpdate;
use serde::Deserialize;

/// Submission and status queries for analysis jobs.
#[async_trait]
pub trait JobService: Send + Sync {
    /// Upload a document and start a job.
    async fn submit(&self, document: &Document) -> Result<SubmitResponse, ApiError>;

    /// Current status of a job, with its result once finished.
    async fn query(&self, job_id: &str) -> Result<RawUpdate, ApiError>;
}

/// HTTP client for one analysis service.
pub struct HttpJobService {
    client: reqwest::Client,
    api_url: String,
}

/// Response returned by `POST /api/documents`.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitResponse {
    pub document_id: JobId,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default, deserialize_with = "deserialize_lenient")]
    pub started_at: Option<Timestamp>,
}

impl SubmitResponse {
    /// Record to show before the first update arrives.
    ///
    /// Without a server start time it is stamped at the earliest instant so
    /// any real update supersedes it.
    pub fn initial_record(&self) -> StatusRecord {
        let status = self
            .status
            .as_deref()
            .and_then(JobStatus::parse)
            .unwrap_or(JobStatus::Processing);
        let timestamp = self.started_at.unwrap_or(chrono::DateTime::<chrono::Utc>::MIN_UTC);
        StatusRecord::initial(self.document_id.clone(), status, timestamp)
    }
}

/// Body of the `GET /` health probe.
#[derive(Debug, Clone, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    #[serde(default)]
    pub service: Option<String>,
}

/// Errors from the REST layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The service does not know the job.
    #[error("Job {job_id} not found")]
    NotFound { job_id: JobId },

    /// The service returned another non-2xx status code.
    #[error("Analysis service error ({status}): {body}")]
    Status { status: u16, body: String },

    /// The body could not be decoded.
    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl ApiError {
    /// Network-level failure, as opposed to a reply we did not like.
    pub fn is_transport(&self) -> bool {
        matches!(self, ApiError::Request(_))
    }

    pub fn user_message(&self) -> String {
        match self {
            ApiError::Request(_) => "Could not reach the analysis service".to_string(),
            ApiError::NotFound { .. } => "Document not found".to_string(),
            ApiError::Status { status, .. } => {
                format!("The analysis service returned an error ({status})")
            }
            ApiError::Malformed(_) => {
                "The analysis service sent an unreadable response".to_string()
            }
        }
    }
}

impl HttpJobService {
    /// Create a client for the service at `api_url` (e.g.
    /// `http://host:8000`) with a per-request timeout.
    pub fn new(api_url: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, api_url))
    }

    /// Create a client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, api_url: impl Into<String>) -> Self {
        let api_url = api_url.into().trim_end_matches('/').to_string();
        Self { client, api_url }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Probe `GET /`.
    pub async fn health(&self) -> Result<HealthResponse, ApiError> {
        let response = self.client.get(format!("{}/", self.api_url)).send().await?;
        let body = Self::ensure_success(response).await?.text().await?;
        decode(&body)
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code, mapping failures to
    /// [`ApiError::Status`] with the body text.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl JobService for HttpJobService {
    async fn submit(&self, document: &Document) -> Result<SubmitResponse, ApiError> {
        let part = reqwest::multipart::Part::bytes(document.bytes().to_vec())
            .file_name(document.filename().to_string())
            .mime_str(document.content_type())?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(format!("{}/api/documents", self.api_url))
            .multipart(form)
            .send()
            .await?;

        let body = Self::ensure_success(response).await?.text().await?;
        let submitted: SubmitResponse = decode(&body)?;

        tracing::info!(
            job_id = %submitted.document_id,
            filename = document.filename(),
            size = document.size(),
            "Document submitted",
        );
        Ok(submitted)
    }

    async fn query(&self, job_id: &str) -> Result<RawUpdate, ApiError> {
        let response = self
            .client
            .get(format!("{}/api/documents/{}", self.api_url, job_id))
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound {
                job_id: job_id.to_string(),
            });
        }

        let body = Self::ensure_success(response).await?.text().await?;
        decode(&body)
    }
}

fn decode<T: serde::de::DeserializeOwned>(body: &str) -> Result<T, ApiError> {
    serde_json::from_str(body).map_err(|e| ApiError::Malformed(e.to_string()))
}

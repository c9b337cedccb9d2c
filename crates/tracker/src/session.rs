//! Job session controller.
//!
//! [`JobSession`] owns the job identifier and the reconciled
//! [`StatusRecord`]. It drives the live channel and the polling fallback,
//! folds every update through [`reconcile::merge`], fetches the final
//! result once, and publishes a [`SessionView`] for the presentation layer.
//!
//! ```text
//! NoJob -> Uploading -> Tracking(Connected | Polling) -> Terminal(Complete | Error)
//!   ^__________________________ reset() ___________________________|
//! ```
//!
//! The session is driven by calling [`JobSession::next_event`] (or
//! [`JobSession::run_until_settled`]) from a single task; the channel and
//! polling tasks only ever send it events.

use std::sync::Arc;

use docsight_core::document::Document;
use docsight_core::error::CoreError;
use docsight_core::reconcile;
use docsight_core::status::{JobStatus, StatusRecord};
use docsight_core::types::{JobId, Timestamp};
use docsight_core::update::RawUpdate;
use serde::Serialize;
use tokio::sync::{mpsc, watch};

use crate::api::{ApiError, JobService};
use crate::channel::{ChannelState, UpdateChannelManager};
use crate::client::ChannelConnector;
use crate::config::TrackerConfig;
use crate::events::{ChannelEvent, PollEvent};
use crate::polling::PollingDriver;

const UPLOAD_FAILED: &str = "Failed to upload document. Please try again.";
const JOB_FAILED: &str = "Document processing failed";
const MISSING_RESULT: &str = "Analysis finished but no result was returned";
const CHANNEL_ABANDONED: &str = "Live updates unavailable, checking status periodically";

// ---------------------------------------------------------------------------
// Phase and view
// ---------------------------------------------------------------------------

/// Where updates are coming from while tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TrackingMode {
    Connected,
    Polling,
}

/// How a tracked job ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Outcome {
    Complete,
    Error,
}

/// Lifecycle of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionPhase {
    NoJob,
    Uploading,
    Tracking(TrackingMode),
    Terminal(Outcome),
}

impl SessionPhase {
    pub fn is_tracking(&self) -> bool {
        matches!(self, SessionPhase::Tracking(_))
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionPhase::Terminal(_))
    }
}

/// Everything the presentation layer renders.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionView {
    pub phase: SessionPhase,
    pub job_id: Option<JobId>,
    pub record: Option<StatusRecord>,
    /// Live channel connectivity indicator.
    pub connected: bool,
    /// The live channel gave up and polling carries the session.
    pub channel_abandoned: bool,
    /// Short human-readable error, if any.
    pub error: Option<String>,
}

impl Default for SessionView {
    fn default() -> Self {
        Self {
            phase: SessionPhase::NoJob,
            job_id: None,
            record: None,
            connected: false,
            channel_abandoned: false,
            error: None,
        }
    }
}

/// Errors surfaced by [`JobSession::submit`].
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The document failed the pre-submission checks.
    #[error("Document rejected: {0}")]
    Rejected(#[from] CoreError),

    /// The submission service failed.
    #[error("Submission failed: {0}")]
    Submit(#[from] ApiError),
}

impl SessionError {
    pub fn user_message(&self) -> String {
        match self {
            SessionError::Rejected(e) => e.user_message(),
            SessionError::Submit(_) => UPLOAD_FAILED.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// JobSession
// ---------------------------------------------------------------------------

/// Tracks one document-analysis job at a time.
pub struct JobSession {
    service: Arc<dyn JobService>,
    channel: UpdateChannelManager,
    poller: PollingDriver,

    job_id: Option<JobId>,
    record: Option<StatusRecord>,
    phase: SessionPhase,
    connected: bool,
    channel_abandoned: bool,
    error: Option<String>,
    result_requested: bool,

    channel_events: Option<mpsc::UnboundedReceiver<ChannelEvent>>,
    poll_events: Option<mpsc::UnboundedReceiver<PollEvent>>,
    view: watch::Sender<SessionView>,
}

/// One inbound event, tagged by source.
enum Inbound {
    Channel(Option<ChannelEvent>),
    Poll(Option<PollEvent>),
}

impl JobSession {
    pub fn new(
        service: Arc<dyn JobService>,
        connector: Arc<dyn ChannelConnector>,
        config: &TrackerConfig,
    ) -> Self {
        let (view, _) = watch::channel(SessionView::default());
        Self {
            channel: UpdateChannelManager::new(connector, config.channel),
            poller: PollingDriver::new(Arc::clone(&service), config.polling),
            service,
            job_id: None,
            record: None,
            phase: SessionPhase::NoJob,
            connected: false,
            channel_abandoned: false,
            error: None,
            result_requested: false,
            channel_events: None,
            poll_events: None,
            view,
        }
    }

    /// Receive a fresh [`SessionView`] on every change.
    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.view.subscribe()
    }

    pub fn view(&self) -> SessionView {
        self.snapshot()
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn job_id(&self) -> Option<&str> {
        self.job_id.as_deref()
    }

    pub fn record(&self) -> Option<&StatusRecord> {
        self.record.as_ref()
    }

    pub fn channel_state(&self) -> ChannelState {
        self.channel.state()
    }

    /// Whether the fallback is currently querying (running and not
    /// suspended by a live connection).
    pub fn is_polling(&self) -> bool {
        self.poller.is_running() && !self.poller.is_suspended()
    }

    /// Validate raw file contents and submit them.
    pub async fn submit_file(
        &mut self,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<JobId, SessionError> {
        match Document::new(filename, bytes) {
            Ok(document) => self.submit(&document).await,
            Err(e) => {
                tracing::warn!(filename, error = %e, "Document rejected");
                self.reset();
                self.error = Some(e.user_message());
                self.publish();
                Err(SessionError::Rejected(e))
            }
        }
    }

    /// Submit a document and start tracking it.
    ///
    /// Whatever job was being tracked is torn down first, so its channel is
    /// closed before the new one opens.
    pub async fn submit(&mut self, document: &Document) -> Result<JobId, SessionError> {
        self.clear();
        self.phase = SessionPhase::Uploading;
        self.publish();

        let submitted = match self.service.submit(document).await {
            Ok(submitted) => submitted,
            Err(e) => {
                tracing::error!(filename = document.filename(), error = %e, "Upload failed");
                self.phase = SessionPhase::NoJob;
                self.error = Some(UPLOAD_FAILED.to_string());
                self.publish();
                return Err(SessionError::Submit(e));
            }
        };

        let job_id = submitted.document_id.clone();
        self.record = Some(submitted.initial_record());
        self.job_id = Some(job_id.clone());
        self.phase = SessionPhase::Tracking(TrackingMode::Polling);

        self.channel_events = Some(self.channel.subscribe(&job_id));
        self.poll_events = Some(self.poller.start(&job_id));

        tracing::info!(job_id = %job_id, "Tracking job");
        self.publish();
        Ok(job_id)
    }

    /// Forget the current job and cancel all channel and polling work.
    /// Always legal and idempotent.
    pub fn reset(&mut self) {
        if let Some(job_id) = &self.job_id {
            tracing::info!(job_id = %job_id, "Session reset");
        }
        self.clear();
        self.publish();
    }

    /// Wait for and handle one event from the channel or the poller.
    ///
    /// Returns `false` when nothing is left to wait for.
    pub async fn next_event(&mut self) -> bool {
        if self.channel_events.is_none() && self.poll_events.is_none() {
            return false;
        }

        let inbound = tokio::select! {
            event = recv_from(&mut self.channel_events) => Inbound::Channel(event),
            event = recv_from(&mut self.poll_events) => Inbound::Poll(event),
        };

        match inbound {
            Inbound::Channel(Some(event)) => self.on_channel_event(event).await,
            Inbound::Channel(None) => self.channel_events = None,
            Inbound::Poll(Some(event)) => self.on_poll_event(event).await,
            Inbound::Poll(None) => {
                // The run is over even if its task has not been reaped yet.
                self.poller.stop();
                self.poll_events = None;
                // A discarded terminal response stops the poller without
                // ending the session; keep the fallback alive.
                if !self.connected {
                    self.ensure_polling();
                }
            }
        }
        true
    }

    /// Handle events until the job is terminal or the session is idle.
    pub async fn run_until_settled(&mut self) -> SessionPhase {
        while self.next_event().await {}
        self.phase
    }

    // ---- event handling ----

    async fn on_channel_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Connected => {
                self.connected = true;
                self.channel_abandoned = false;
                self.error = None;
                self.poller.suspend();
                if self.phase.is_tracking() {
                    self.phase = SessionPhase::Tracking(TrackingMode::Connected);
                }
                self.publish();
            }
            ChannelEvent::Disconnected { reason } => {
                self.connected = false;
                if let Some(message) = reason.user_message() {
                    self.error = Some(message);
                }
                if self.phase.is_tracking() {
                    self.phase = SessionPhase::Tracking(TrackingMode::Polling);
                }
                self.ensure_polling();
                self.publish();
            }
            ChannelEvent::Update(raw) => self.apply(raw).await,
            ChannelEvent::Abandoned { attempts } => {
                tracing::warn!(job_id = ?self.job_id, attempts, "Falling back to polling only");
                self.connected = false;
                self.channel_abandoned = true;
                self.error = Some(CHANNEL_ABANDONED.to_string());
                self.ensure_polling();
                self.publish();
            }
        }
    }

    async fn on_poll_event(&mut self, event: PollEvent) {
        match event {
            PollEvent::Update(raw) => self.apply(raw).await,
            PollEvent::Degraded { failures, error } => {
                tracing::warn!(job_id = ?self.job_id, failures, error = %error, "Status check failed");
                self.mark_error();
                self.error = Some(error.user_message());
                self.publish();
            }
            PollEvent::MissingResult(raw) => {
                tracing::error!(
                    job_id = ?self.job_id,
                    status = ?raw.status,
                    "Job reported finished without a result",
                );
                let message = raw
                    .message
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| MISSING_RESULT.to_string());
                self.mark_error();
                self.finish(Outcome::Error, Some(message));
            }
            PollEvent::Exhausted { failures, error } => {
                tracing::error!(
                    job_id = ?self.job_id,
                    failures,
                    error = %error,
                    "Giving up on job after repeated status failures",
                );
                self.mark_error();
                self.abandon_job(format!(
                    "Lost track of the document: {}",
                    error.user_message()
                ));
            }
        }
    }

    /// Validate, reconcile and react to one update.
    async fn apply(&mut self, raw: RawUpdate) {
        let Some(job_id) = self.job_id.clone() else {
            return;
        };
        if !self.phase.is_tracking() {
            return;
        }
        if let Some(other) = raw.document_id.as_deref().filter(|id| *id != job_id) {
            tracing::warn!(job_id = %job_id, other, "Dropping update for another job");
            return;
        }

        let update = match raw.into_update(&job_id, self.receipt_time()) {
            Ok(update) => update,
            Err(e) => {
                tracing::warn!(job_id = %job_id, error = %e, "Dropping malformed update");
                return;
            }
        };

        if !reconcile::accepts(self.record.as_ref(), &update) {
            tracing::debug!(
                job_id = %job_id,
                incoming = %update.timestamp,
                "Discarding out-of-order update",
            );
            return;
        }

        self.record = Some(reconcile::merge(self.record.as_ref(), &update));
        if !update.synthetic && !update.is_terminal() {
            self.error = None;
        }
        self.publish();

        if !update.is_terminal() {
            return;
        }
        match update.status {
            Some(JobStatus::Complete) => self.complete(&job_id).await,
            Some(JobStatus::Error) => {
                let message = update
                    .message
                    .or_else(|| update.result.and_then(|r| r.error))
                    .unwrap_or_else(|| JOB_FAILED.to_string());
                self.finish(Outcome::Error, Some(message));
            }
            _ => {}
        }
    }

    /// The job reported `complete`: make sure a result is attached, fetching
    /// it at most once.
    async fn complete(&mut self, job_id: &str) {
        if self.record.as_ref().is_some_and(|r| r.result().is_some()) {
            self.finish(Outcome::Complete, None);
            return;
        }
        if self.result_requested {
            return;
        }
        self.result_requested = true;

        tracing::info!(job_id, "Job complete, fetching result");
        match self.service.query(job_id).await {
            Ok(RawUpdate {
                result: Some(result),
                ..
            }) => {
                self.record = self
                    .record
                    .as_ref()
                    .map(|record| reconcile::attach_result(record, result));
                self.finish(Outcome::Complete, None);
            }
            Ok(_) => {
                tracing::error!(job_id, "Result fetch returned no result");
                self.mark_error();
                self.finish(Outcome::Error, Some(MISSING_RESULT.to_string()));
            }
            Err(e) => {
                tracing::error!(job_id, error = %e, "Result fetch failed");
                self.mark_error();
                self.finish(Outcome::Error, Some(e.user_message()));
            }
        }
    }

    // ---- state helpers ----

    /// Merge a synthesized error marker into the record.
    fn mark_error(&mut self) {
        let Some(job_id) = self.job_id.clone() else {
            return;
        };
        let received_at = self.receipt_time();
        if let Ok(marker) = RawUpdate::synthetic_error(&job_id).into_update(&job_id, received_at) {
            self.record = Some(reconcile::merge(self.record.as_ref(), &marker));
        }
    }

    /// Timestamp for updates that carry none: concurrent with the current
    /// record, so they are accepted without moving the clock forward.
    fn receipt_time(&self) -> Timestamp {
        self.record
            .as_ref()
            .map_or_else(chrono::Utc::now, |record| record.timestamp())
    }

    /// Resume the suspended poller, or start a new run if none is alive.
    fn ensure_polling(&mut self) {
        if !self.phase.is_tracking() {
            return;
        }
        if self.poller.is_running() {
            self.poller.resume();
            return;
        }
        if let Some(job_id) = &self.job_id {
            self.poll_events = Some(self.poller.start(job_id));
        }
    }

    /// Enter a terminal phase; no further updates are needed.
    fn finish(&mut self, outcome: Outcome, error: Option<String>) {
        self.teardown();
        self.phase = SessionPhase::Terminal(outcome);
        self.error = error;
        match outcome {
            Outcome::Complete => tracing::info!(job_id = ?self.job_id, "Job complete"),
            Outcome::Error => {
                tracing::warn!(job_id = ?self.job_id, error = ?self.error, "Job failed")
            }
        }
        self.publish();
    }

    /// Fatal failure: drop the job identifier but keep the last known record
    /// on screen with the error.
    fn abandon_job(&mut self, error: String) {
        self.teardown();
        self.job_id = None;
        self.phase = SessionPhase::NoJob;
        self.result_requested = false;
        self.error = Some(error);
        self.publish();
    }

    fn teardown(&mut self) {
        self.channel.close();
        self.poller.stop();
        self.channel_events = None;
        self.poll_events = None;
        self.connected = false;
    }

    fn clear(&mut self) {
        self.teardown();
        self.job_id = None;
        self.record = None;
        self.phase = SessionPhase::NoJob;
        self.channel_abandoned = false;
        self.error = None;
        self.result_requested = false;
    }

    fn snapshot(&self) -> SessionView {
        SessionView {
            phase: self.phase,
            job_id: self.job_id.clone(),
            record: self.record.clone(),
            connected: self.connected,
            channel_abandoned: self.channel_abandoned,
            error: self.error.clone(),
        }
    }

    fn publish(&self) {
        self.view.send_replace(self.snapshot());
    }
}

/// Receive from an optional channel; pending forever when absent.
async fn recv_from<T>(rx: &mut Option<mpsc::UnboundedReceiver<T>>) -> Option<T> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

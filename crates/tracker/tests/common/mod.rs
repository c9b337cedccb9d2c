//! Scripted fakes for the job service and the live channel connector.
//!
//! Both fakes record what the code under test did with them so tests can
//! assert on call counts and on the order channels were opened and closed.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use docsight_core::document::Document;
use docsight_core::update::RawUpdate;
use docsight_tracker::api::{ApiError, JobService, SubmitResponse};
use docsight_tracker::client::{ChannelConnector, ChannelError, Frame, FrameStream};
use docsight_tracker::TrackerConfig;
use futures::channel::mpsc;
use futures::{Stream, StreamExt};
use serde_json::{json, Value};

/// Default config; tests run on paused time so the real intervals are fine.
pub fn test_config() -> TrackerConfig {
    TrackerConfig::default()
}

/// RFC 3339 timestamp `secs` seconds after a fixed epoch.
pub fn ts(secs: i64) -> String {
    let base = Utc
        .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .single()
        .expect("valid base time");
    (base + chrono::Duration::seconds(secs)).to_rfc3339()
}

/// A minimal finished-analysis payload.
pub fn sample_result(filename: &str) -> Value {
    json!({
        "filename": filename,
        "word_count": 1200,
        "processing_time_seconds": 4.5,
        "key_insights": [
            {"text": "Revenue grew", "confidence": 0.9, "category": "finance"}
        ],
        "sentiment_score": 0.4,
        "topics": ["finance"],
        "completed_at": ts(60),
    })
}

/// Let spawned tasks run and paused time move a little.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

// ---------------------------------------------------------------------------
// FakeConnector
// ---------------------------------------------------------------------------

enum Script {
    Open(mpsc::UnboundedReceiver<Result<Frame, ChannelError>>),
    Fail,
}

/// Connector whose connection attempts follow a script. Once the script
/// runs out every attempt fails.
#[derive(Default)]
pub struct FakeConnector {
    scripts: Mutex<VecDeque<Script>>,
    log: Arc<Mutex<Vec<String>>>,
    attempts: AtomicUsize,
}

/// Sending side of one scripted open channel. Dropping it ends the stream.
pub struct FrameFeed {
    tx: mpsc::UnboundedSender<Result<Frame, ChannelError>>,
}

impl FrameFeed {
    pub fn text(&self, text: impl Into<String>) {
        let _ = self.tx.unbounded_send(Ok(Frame::Text(text.into())));
    }

    pub fn update(&self, value: Value) {
        self.text(value.to_string());
    }

    pub fn ping(&self) {
        let _ = self.tx.unbounded_send(Ok(Frame::Control));
    }

    pub fn close(&self) {
        let _ = self.tx.unbounded_send(Ok(Frame::Close));
    }

    pub fn fail(&self, reason: &str) {
        let _ = self
            .tx
            .unbounded_send(Err(ChannelError::Protocol(reason.to_string())));
    }
}

impl FakeConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Script the next attempt to succeed, returning the frame feed.
    pub fn open(&self) -> FrameFeed {
        let (tx, rx) = mpsc::unbounded();
        self.push(Script::Open(rx));
        FrameFeed { tx }
    }

    /// Script the next attempt to fail.
    pub fn fail(&self) {
        self.push(Script::Fail);
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// `open {id}` / `close {id}` entries in the order they happened.
    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn push(&self, script: Script) {
        self.scripts.lock().unwrap().push_back(script);
    }
}

#[async_trait]
impl ChannelConnector for FakeConnector {
    async fn connect(&self, job_id: &str) -> Result<FrameStream, ChannelError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let script = self.scripts.lock().unwrap().pop_front();
        match script {
            Some(Script::Open(rx)) => {
                self.log.lock().unwrap().push(format!("open {job_id}"));
                Ok(LoggedStream {
                    inner: rx,
                    job_id: job_id.to_string(),
                    log: Arc::clone(&self.log),
                }
                .boxed())
            }
            Some(Script::Fail) | None => Err(ChannelError::Connection(format!(
                "scripted failure for {job_id}"
            ))),
        }
    }
}

/// Frame stream that logs `close {id}` when the channel drops it.
struct LoggedStream {
    inner: mpsc::UnboundedReceiver<Result<Frame, ChannelError>>,
    job_id: String,
    log: Arc<Mutex<Vec<String>>>,
}

impl Stream for LoggedStream {
    type Item = Result<Frame, ChannelError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl Drop for LoggedStream {
    fn drop(&mut self) {
        if let Ok(mut log) = self.log.lock() {
            log.push(format!("close {}", self.job_id));
        }
    }
}

// ---------------------------------------------------------------------------
// FakeService
// ---------------------------------------------------------------------------

/// Scripted reply to one status query.
pub enum Reply {
    Json(Value),
    NotFound,
    Unavailable,
}

/// Job service whose replies follow a script. Once the query script runs
/// out every query answers 503.
#[derive(Default)]
pub struct FakeService {
    submits: Mutex<VecDeque<Option<String>>>,
    replies: Mutex<VecDeque<Reply>>,
    submit_calls: AtomicUsize,
    query_calls: AtomicUsize,
}

impl FakeService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Next submission is accepted as job `job_id`.
    pub fn accept(&self, job_id: &str) {
        self.submits
            .lock()
            .unwrap()
            .push_back(Some(job_id.to_string()));
    }

    /// Next submission fails with a server error.
    pub fn refuse(&self) {
        self.submits.lock().unwrap().push_back(None);
    }

    pub fn reply(&self, reply: Reply) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn reply_json(&self, value: Value) {
        self.reply(Reply::Json(value));
    }

    pub fn submits(&self) -> usize {
        self.submit_calls.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> usize {
        self.query_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobService for FakeService {
    async fn submit(&self, document: &Document) -> Result<SubmitResponse, ApiError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.submits.lock().unwrap().pop_front().flatten();
        match next {
            Some(job_id) => serde_json::from_value(json!({
                "document_id": job_id,
                "status": "processing",
                "progress": 0.0,
                "filename": document.filename(),
                "started_at": ts(0),
            }))
            .map_err(|e| ApiError::Malformed(e.to_string())),
            None => Err(ApiError::Status {
                status: 500,
                body: "upload rejected".into(),
            }),
        }
    }

    async fn query(&self, job_id: &str) -> Result<RawUpdate, ApiError> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.replies.lock().unwrap().pop_front();
        match next {
            Some(Reply::Json(value)) => {
                serde_json::from_value(value).map_err(|e| ApiError::Malformed(e.to_string()))
            }
            Some(Reply::NotFound) => Err(ApiError::NotFound {
                job_id: job_id.to_string(),
            }),
            Some(Reply::Unavailable) | None => Err(ApiError::Status {
                status: 503,
                body: "unavailable".into(),
            }),
        }
    }
}

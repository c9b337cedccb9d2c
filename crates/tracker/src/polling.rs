//! Polling fallback for when the live channel is not connected.
//!
//! [`PollingDriver`] queries the job status on a fixed interval, one
//! request at a time. Consecutive failures (transport errors or responses
//! missing `status`/`progress`) trip a circuit breaker after
//! [`PollingConfig::max_failures`]. A terminal status stops polling.
//!
//! While the live channel is connected the run is suspended rather than
//! stopped. Suspended ticks keep their schedule but send no query.

use std::sync::Arc;
use std::time::Duration;

use docsight_core::types::JobId;
use docsight_core::update::MalformedUpdate;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::api::{ApiError, JobService};
use crate::events::PollEvent;

/// Interval and breaker settings for the polling fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollingConfig {
    pub interval: Duration,
    /// Consecutive failures that end the session.
    pub max_failures: u32,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_failures: 3,
        }
    }
}

/// Why a single poll counted as a failure.
#[derive(Debug, thiserror::Error)]
pub enum PollFailure {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Malformed status response: {0}")]
    Malformed(#[from] MalformedUpdate),
}

impl PollFailure {
    pub fn user_message(&self) -> String {
        match self {
            PollFailure::Api(e) => e.user_message(),
            PollFailure::Malformed(_) => {
                "Received an invalid status from the analysis service".to_string()
            }
        }
    }
}

/// Drives periodic status queries for one job at a time.
pub struct PollingDriver {
    service: Arc<dyn JobService>,
    config: PollingConfig,
    active: Option<ActivePoll>,
}

struct ActivePoll {
    job_id: JobId,
    cancel: CancellationToken,
    task: JoinHandle<()>,
    suspended: watch::Sender<bool>,
}

/// Mutable state of one polling run.
#[derive(Debug, Default)]
struct PollState {
    failures: u32,
}

impl PollingDriver {
    pub fn new(service: Arc<dyn JobService>, config: PollingConfig) -> Self {
        Self {
            service,
            config,
            active: None,
        }
    }

    /// Start polling `job_id`, replacing any previous run. The first query
    /// goes out one interval from now and the failure count starts at zero.
    pub fn start(&mut self, job_id: &str) -> mpsc::UnboundedReceiver<PollEvent> {
        self.stop();

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let (suspended, suspended_rx) = watch::channel(false);
        let task = tokio::spawn(run_polling(
            Arc::clone(&self.service),
            job_id.to_string(),
            self.config,
            event_tx,
            suspended_rx,
            cancel.clone(),
        ));

        tracing::info!(job_id, interval_ms = self.config.interval.as_millis() as u64, "Polling started");

        self.active = Some(ActivePoll {
            job_id: job_id.to_string(),
            cancel,
            task,
            suspended,
        });
        event_rx
    }

    /// Skip queries until [`resume`](Self::resume), keeping the tick
    /// schedule and the failure count.
    pub fn suspend(&mut self) {
        if let Some(poll) = &self.active {
            if !poll.suspended.send_replace(true) {
                tracing::debug!(job_id = %poll.job_id, "Polling suspended");
            }
        }
    }

    /// Query again from the next scheduled tick.
    pub fn resume(&mut self) {
        if let Some(poll) = &self.active {
            if poll.suspended.send_replace(false) {
                tracing::debug!(job_id = %poll.job_id, "Polling resumed");
            }
        }
    }

    pub fn is_suspended(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|poll| *poll.suspended.borrow())
    }

    /// Stop polling. Idempotent.
    pub fn stop(&mut self) {
        if let Some(poll) = self.active.take() {
            poll.cancel.cancel();
            poll.task.abort();
            tracing::info!(job_id = %poll.job_id, "Polling stopped");
        }
    }

    /// Whether a polling task is alive.
    pub fn is_running(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|poll| !poll.task.is_finished())
    }
}

impl Drop for PollingDriver {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_polling(
    service: Arc<dyn JobService>,
    job_id: JobId,
    config: PollingConfig,
    events: mpsc::UnboundedSender<PollEvent>,
    suspended: watch::Receiver<bool>,
    cancel: CancellationToken,
) {
    let mut state = PollState::default();
    let mut ticker = tokio::time::interval_at(Instant::now() + config.interval, config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }
        if *suspended.borrow() {
            continue;
        }

        let response = tokio::select! {
            _ = cancel.cancelled() => return,
            response = service.query(&job_id) => response,
        };

        let checked = response
            .map_err(PollFailure::from)
            .and_then(|raw| match raw.check_required() {
                Ok(status) => Ok((status, raw)),
                Err(e) => Err(PollFailure::from(e)),
            });

        match checked {
            Ok((status, raw)) => {
                state.failures = 0;

                if status.is_terminal() && raw.result.is_none() {
                    tracing::error!(
                        job_id = %job_id,
                        status = %status,
                        "Job finished without a result",
                    );
                    let _ = events.send(PollEvent::MissingResult(raw));
                    return;
                }

                tracing::debug!(job_id = %job_id, status = %status, "Polled status");
                if events.send(PollEvent::Update(raw)).is_err() {
                    return;
                }
                if status.is_terminal() {
                    tracing::info!(job_id = %job_id, status = %status, "Job finished, polling done");
                    return;
                }
            }
            Err(error) => {
                state.failures += 1;
                let failures = state.failures;

                if failures >= config.max_failures {
                    tracing::error!(
                        job_id = %job_id,
                        failures,
                        error = %error,
                        "Polling circuit breaker open",
                    );
                    let _ = events.send(PollEvent::Exhausted { failures, error });
                    return;
                }

                tracing::warn!(job_id = %job_id, failures, error = %error, "Poll failed");
                if events.send(PollEvent::Degraded { failures, error }).is_err() {
                    return;
                }
            }
        }
    }
}

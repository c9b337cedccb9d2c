//! Live update channel manager.
//!
//! [`UpdateChannelManager`] owns at most one subscription at a time. Each
//! subscription runs as a task that connects, forwards decoded updates,
//! watches for idle connections, and reconnects within a fixed attempt
//! budget:
//!
//! ```text
//! Idle -> Connecting -> Connected -> (Disconnected -> Connecting)* -> Abandoned | Closed
//! ```
//!
//! Events are delivered on an unbounded mpsc channel returned by
//! [`UpdateChannelManager::subscribe`]. Errors are reported as events and
//! never escape the task.

use std::sync::Arc;
use std::time::Duration;

use docsight_core::types::JobId;
use docsight_core::update::RawUpdate;
use futures::StreamExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::client::{ChannelConnector, Frame, FrameStream};
use crate::events::{ChannelEvent, DisconnectReason};
use crate::messages::parse_update;
use crate::reconnect::{backoff, ReconnectBudget, ReconnectConfig};

/// Liveness and reconnect settings for the live channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Maximum quiet period on an open channel before it is considered
    /// stale.
    pub idle_timeout: Duration,
    pub reconnect: ReconnectConfig,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(30),
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// Connection state of the current subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Idle,
    Connecting,
    Connected,
    Disconnected,
    /// Reconnect budget exhausted.
    Abandoned,
    /// Closed on request.
    Closed,
}

impl ChannelState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ChannelState::Connected)
    }
}

/// Owns the live update subscription for the current job.
pub struct UpdateChannelManager {
    connector: Arc<dyn ChannelConnector>,
    config: ChannelConfig,
    active: Option<Subscription>,
    /// State reported when there is no active subscription.
    last_state: ChannelState,
}

/// Bookkeeping for one running subscription task.
struct Subscription {
    job_id: JobId,
    cancel: CancellationToken,
    task: JoinHandle<()>,
    state: watch::Receiver<ChannelState>,
}

impl UpdateChannelManager {
    pub fn new(connector: Arc<dyn ChannelConnector>, config: ChannelConfig) -> Self {
        Self {
            connector,
            config,
            active: None,
            last_state: ChannelState::Idle,
        }
    }

    /// Open a live channel for `job_id`.
    ///
    /// Any existing subscription is closed first, so there is never more
    /// than one channel open.
    pub fn subscribe(&mut self, job_id: &str) -> mpsc::UnboundedReceiver<ChannelEvent> {
        self.close();

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ChannelState::Connecting);
        let cancel = CancellationToken::new();

        let task = tokio::spawn(run_subscription(
            Arc::clone(&self.connector),
            job_id.to_string(),
            self.config,
            event_tx,
            state_tx,
            cancel.clone(),
        ));

        tracing::debug!(job_id, "Live update subscription started");

        self.active = Some(Subscription {
            job_id: job_id.to_string(),
            cancel,
            task,
            state: state_rx,
        });
        event_rx
    }

    /// Close the current subscription, cancelling its idle timer and any
    /// pending reconnect. No-op when nothing is open.
    pub fn close(&mut self) {
        if let Some(sub) = self.active.take() {
            sub.cancel.cancel();
            sub.task.abort();
            tracing::info!(job_id = %sub.job_id, "Live update channel closed");
            self.last_state = ChannelState::Closed;
        }
    }

    pub fn state(&self) -> ChannelState {
        self.active
            .as_ref()
            .map_or(self.last_state, |sub| *sub.state.borrow())
    }

    /// Job the current subscription is bound to.
    pub fn job_id(&self) -> Option<&str> {
        self.active.as_ref().map(|sub| sub.job_id.as_str())
    }
}

impl Drop for UpdateChannelManager {
    fn drop(&mut self) {
        self.close();
    }
}

/// How one open connection ended.
enum SessionEnd {
    Cancelled,
    IdleTimeout,
    ClosedByServer,
    Failed(crate::client::ChannelError),
}

/// Connect -> pump -> reconnect loop for one job.
///
/// Runs until cancelled or until the reconnect budget is exhausted.
async fn run_subscription(
    connector: Arc<dyn ChannelConnector>,
    job_id: JobId,
    config: ChannelConfig,
    events: mpsc::UnboundedSender<ChannelEvent>,
    state: watch::Sender<ChannelState>,
    cancel: CancellationToken,
) {
    let mut budget = ReconnectBudget::new(config.reconnect);

    loop {
        state.send_replace(ChannelState::Connecting);

        let connected = tokio::select! {
            _ = cancel.cancelled() => break,
            result = connector.connect(&job_id) => result,
        };

        let reason = match connected {
            Ok(mut frames) => {
                state.send_replace(ChannelState::Connected);
                tracing::info!(job_id = %job_id, "Live updates connected");
                if events.send(ChannelEvent::Connected).is_err() {
                    break;
                }

                let (end, delivered) =
                    pump(&mut frames, &job_id, config.idle_timeout, &events, &cancel).await;

                // An open only counts as a success once it carried an update.
                if delivered > 0 {
                    budget.reset();
                } else if !matches!(end, SessionEnd::Cancelled) {
                    let attempt = budget.record_failure();
                    tracing::warn!(
                        job_id = %job_id,
                        attempt,
                        "Live channel ended before any update",
                    );
                }

                match end {
                    SessionEnd::Cancelled => break,
                    SessionEnd::IdleTimeout => {
                        tracing::warn!(
                            job_id = %job_id,
                            idle_secs = config.idle_timeout.as_secs(),
                            "Live channel idle, marking stale",
                        );
                        let marker = RawUpdate::synthetic_error(&job_id);
                        if events.send(ChannelEvent::Update(marker)).is_err() {
                            break;
                        }
                        DisconnectReason::IdleTimeout
                    }
                    SessionEnd::ClosedByServer => DisconnectReason::ClosedByServer,
                    SessionEnd::Failed(e) => {
                        tracing::warn!(job_id = %job_id, error = %e, "Live channel dropped");
                        DisconnectReason::Dropped(e)
                    }
                }
            }
            Err(e) => {
                let attempt = budget.record_failure();
                tracing::warn!(
                    job_id = %job_id,
                    attempt,
                    error = %e,
                    "Live channel connect attempt {attempt} failed",
                );
                DisconnectReason::ConnectFailed(e)
            }
        };

        state.send_replace(ChannelState::Disconnected);
        if events
            .send(ChannelEvent::Disconnected { reason })
            .is_err()
        {
            break;
        }

        if budget.is_exhausted() {
            let attempts = budget.failures();
            tracing::warn!(
                job_id = %job_id,
                attempts,
                "Live channel abandoned, relying on polling",
            );
            state.send_replace(ChannelState::Abandoned);
            let _ = events.send(ChannelEvent::Abandoned { attempts });
            return;
        }

        if !backoff(budget.delay(), &cancel).await {
            break;
        }
    }

    state.send_replace(ChannelState::Closed);
}

/// Forward frames from one open connection until it ends.
///
/// The idle deadline is armed on entry and pushed back on every text frame.
/// Returns how the connection ended and how many updates it delivered.
async fn pump(
    frames: &mut FrameStream,
    job_id: &str,
    idle_timeout: Duration,
    events: &mpsc::UnboundedSender<ChannelEvent>,
    cancel: &CancellationToken,
) -> (SessionEnd, u64) {
    let idle = tokio::time::sleep(idle_timeout);
    tokio::pin!(idle);
    let mut delivered = 0;

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => return (SessionEnd::Cancelled, delivered),
            _ = &mut idle => return (SessionEnd::IdleTimeout, delivered),
            next = frames.next() => next,
        };

        match next {
            Some(Ok(Frame::Text(text))) => {
                idle.as_mut().reset(Instant::now() + idle_timeout);
                match parse_update(&text) {
                    Ok(update) => {
                        delivered += 1;
                        tracing::debug!(
                            job_id,
                            status = ?update.status,
                            progress = ?update.progress,
                            "Live update",
                        );
                        if events.send(ChannelEvent::Update(update)).is_err() {
                            return (SessionEnd::Cancelled, delivered);
                        }
                    }
                    Err(e) => {
                        tracing::warn!(
                            job_id,
                            error = %e,
                            raw_message = %text,
                            "Failed to parse live update",
                        );
                    }
                }
            }
            Some(Ok(Frame::Control)) => {}
            Some(Ok(Frame::Close)) | None => {
                tracing::info!(job_id, "Live channel closed by server");
                return (SessionEnd::ClosedByServer, delivered);
            }
            Some(Err(e)) => return (SessionEnd::Failed(e), delivered),
        }
    }
}

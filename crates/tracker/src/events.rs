//! Events emitted by the live channel and the polling driver.
//!
//! Both producers run as background tasks and hand their events to the
//! session over unbounded mpsc channels. Neither writes the status record
//! itself.

use docsight_core::update::RawUpdate;

use crate::client::ChannelError;
use crate::polling::PollFailure;

/// Something the live update channel observed.
#[derive(Debug)]
pub enum ChannelEvent {
    /// A connection was established.
    Connected,

    /// The connection attempt failed or the open connection ended.
    Disconnected { reason: DisconnectReason },

    /// A frame decoded into an update, or the synthesized staleness marker
    /// after the idle timeout fired.
    Update(RawUpdate),

    /// The reconnect budget is spent; polling is the only source from now
    /// on.
    Abandoned { attempts: u32 },
}

/// Why the live channel is not connected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Opening the channel failed.
    ConnectFailed(ChannelError),
    /// The transport failed while open.
    Dropped(ChannelError),
    /// No update arrived within the idle timeout.
    IdleTimeout,
    /// The server closed the channel.
    ClosedByServer,
}

impl DisconnectReason {
    /// Message for the user, if this disconnect is worth mentioning.
    pub fn user_message(&self) -> Option<String> {
        match self {
            DisconnectReason::ConnectFailed(_) | DisconnectReason::Dropped(_) => {
                Some("Failed to connect to document updates".to_string())
            }
            DisconnectReason::IdleTimeout => {
                Some("Live updates stalled, reconnecting".to_string())
            }
            DisconnectReason::ClosedByServer => None,
        }
    }
}

/// Something the polling driver observed.
#[derive(Debug)]
pub enum PollEvent {
    /// A well-formed status response.
    Update(RawUpdate),

    /// A query failed but the breaker is still closed.
    Degraded { failures: u32, error: PollFailure },

    /// The job reported a terminal status with no result attached. Polling
    /// has stopped.
    MissingResult(RawUpdate),

    /// Consecutive failures reached the limit. Polling has stopped.
    Exhausted { failures: u32, error: PollFailure },
}

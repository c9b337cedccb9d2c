//! Job tracking client for the document-analysis service.
//!
//! Provides the HTTP job service, the live WebSocket update channel with
//! idle detection and bounded reconnection, the polling fallback with a
//! circuit breaker, and the [`session::JobSession`] controller that
//! reconciles both sources into one status record.

pub mod api;
pub mod channel;
pub mod client;
pub mod config;
pub mod events;
pub mod messages;
pub mod polling;
pub mod reconnect;
pub mod session;

pub use api::{HttpJobService, JobService};
pub use channel::{ChannelConfig, ChannelState, UpdateChannelManager};
pub use client::{ChannelConnector, WsConnector};
pub use config::TrackerConfig;
pub use events::{ChannelEvent, DisconnectReason, PollEvent};
pub use polling::{PollingConfig, PollingDriver};
pub use session::{JobSession, SessionPhase, SessionView};

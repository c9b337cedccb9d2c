//! WebSocket connector for the per-job live update channel.
//!
//! [`WsConnector`] holds the base URL of the live update endpoint. Each
//! call to [`ChannelConnector::connect`] opens one receive-only socket at
//! `{ws_url}/ws/documents/{job_id}` and exposes it as a stream of
//! [`Frame`]s.

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

/// What the update channel cares about in an inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A text payload, expected to be a JSON-encoded update.
    Text(String),
    /// The server closed the socket.
    Close,
    /// Ping, pong or undecodable binary data.
    Control,
}

/// Inbound frames of one open channel.
pub type FrameStream = BoxStream<'static, Result<Frame, ChannelError>>;

/// Opens live update channels. Implemented over WebSocket by
/// [`WsConnector`] and by scripted fakes in tests.
#[async_trait]
pub trait ChannelConnector: Send + Sync {
    async fn connect(&self, job_id: &str) -> Result<FrameStream, ChannelError>;
}

/// WebSocket implementation of [`ChannelConnector`].
pub struct WsConnector {
    ws_url: String,
}

impl WsConnector {
    /// * `ws_url` - WebSocket base URL, e.g. `ws://host:8000`.
    pub fn new(ws_url: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    /// Endpoint for one job's updates.
    pub fn url_for(&self, job_id: &str) -> String {
        format!("{}/ws/documents/{}", self.ws_url, job_id)
    }
}

#[async_trait]
impl ChannelConnector for WsConnector {
    async fn connect(&self, job_id: &str) -> Result<FrameStream, ChannelError> {
        let url = self.url_for(job_id);

        let (ws_stream, _response) = connect_async(&url)
            .await
            .map_err(|e| ChannelError::Connection(format!("Failed to connect to {url}: {e}")))?;

        tracing::info!(job_id, url = %url, "Live update channel open");

        Ok(ws_stream.map(to_frame).boxed())
    }
}

fn to_frame(
    msg: Result<Message, tokio_tungstenite::tungstenite::Error>,
) -> Result<Frame, ChannelError> {
    match msg {
        Ok(Message::Text(text)) => Ok(Frame::Text(text)),
        Ok(Message::Binary(bytes)) => Ok(String::from_utf8(bytes)
            .map(Frame::Text)
            .unwrap_or(Frame::Control)),
        Ok(Message::Close(_)) => Ok(Frame::Close),
        Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => Ok(Frame::Control),
        Err(e) => Err(ChannelError::Protocol(e.to_string())),
    }
}

/// Errors that can occur on the live update channel.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    /// Failed to establish the connection.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A protocol-level error on an established connection.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

//! Tracker configuration loaded from `DOCSIGHT_*` environment variables.

use std::str::FromStr;
use std::time::Duration;

use crate::channel::ChannelConfig;
use crate::polling::PollingConfig;
use crate::reconnect::ReconnectConfig;

/// Tracker configuration loaded from environment variables.
///
/// All fields have defaults suitable for a local analysis service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerConfig {
    /// HTTP base URL of the analysis service.
    pub api_url: String,
    /// WebSocket base URL of the live update endpoint.
    pub ws_url: String,
    /// Per-request HTTP timeout.
    pub request_timeout: Duration,
    pub channel: ChannelConfig,
    pub polling: PollingConfig,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8000".into(),
            ws_url: "ws://localhost:8000".into(),
            request_timeout: Duration::from_secs(30),
            channel: ChannelConfig::default(),
            polling: PollingConfig::default(),
        }
    }
}

impl TrackerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                           | Default                 |
    /// |-----------------------------------|-------------------------|
    /// | `DOCSIGHT_API_URL`                | `http://localhost:8000` |
    /// | `DOCSIGHT_WS_URL`                 | `ws://localhost:8000`   |
    /// | `DOCSIGHT_REQUEST_TIMEOUT_SECS`   | `30`                    |
    /// | `DOCSIGHT_IDLE_TIMEOUT_SECS`      | `30`                    |
    /// | `DOCSIGHT_RECONNECT_DELAY_MS`     | `1000`                  |
    /// | `DOCSIGHT_MAX_RECONNECT_ATTEMPTS` | `3`                     |
    /// | `DOCSIGHT_POLL_INTERVAL_MS`       | `2000`                  |
    /// | `DOCSIGHT_MAX_POLL_FAILURES`      | `3`                     |
    ///
    /// Unparsable values are logged and replaced by the default. Zero
    /// timeouts and budgets are raised to one unit.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let api_url = lookup("DOCSIGHT_API_URL").unwrap_or(defaults.api_url);
        let ws_url = lookup("DOCSIGHT_WS_URL").unwrap_or(defaults.ws_url);

        let request_timeout_secs: u64 = parse_or(&lookup, "DOCSIGHT_REQUEST_TIMEOUT_SECS", 30);
        let idle_timeout_secs: u64 = parse_or(&lookup, "DOCSIGHT_IDLE_TIMEOUT_SECS", 30);
        let reconnect_delay_ms: u64 = parse_or(&lookup, "DOCSIGHT_RECONNECT_DELAY_MS", 1000);
        let max_attempts: u32 = parse_or(&lookup, "DOCSIGHT_MAX_RECONNECT_ATTEMPTS", 3);
        let poll_interval_ms: u64 = parse_or(&lookup, "DOCSIGHT_POLL_INTERVAL_MS", 2000);
        let max_failures: u32 = parse_or(&lookup, "DOCSIGHT_MAX_POLL_FAILURES", 3);

        Self {
            api_url,
            ws_url,
            request_timeout: Duration::from_secs(request_timeout_secs.max(1)),
            channel: ChannelConfig {
                // A zero deadline would mark every fresh channel stale at once.
                idle_timeout: Duration::from_secs(idle_timeout_secs.max(1)),
                reconnect: ReconnectConfig {
                    delay: Duration::from_millis(reconnect_delay_ms),
                    max_attempts: max_attempts.max(1),
                },
            },
            polling: PollingConfig {
                interval: Duration::from_millis(poll_interval_ms.max(1)),
                max_failures: max_failures.max(1),
            },
        }
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Display,
{
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, default = %default, "Ignoring invalid setting");
            default
        }),
    }
}

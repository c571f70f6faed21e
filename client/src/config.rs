//! Configuration management for the queue client.
//!
//! Loads configuration from environment variables with sensible defaults.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Client configuration loaded from environment variables.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientConfig {
    /// REST API configuration
    pub api: ApiConfig,
    /// Realtime channel configuration
    pub realtime: RealtimeConfig,
    /// Session persistence configuration
    pub storage: StorageConfig,
}

/// REST API configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiConfig {
    /// Base URL every endpoint path is appended to
    pub base_url: String,
    /// Request timeout in milliseconds
    pub request_timeout_ms: u64,
}

/// Realtime channel configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RealtimeConfig {
    /// WebSocket endpoint (the token is appended as a query parameter)
    pub url: String,
    /// Fixed delay between reconnect attempts in milliseconds
    pub reconnect_delay_ms: u64,
    /// Heartbeat the client wants to receive, in milliseconds (0 disables)
    pub heartbeat_incoming_ms: u64,
    /// Heartbeat the client promises to send, in milliseconds (0 disables)
    pub heartbeat_outgoing_ms: u64,
    /// Per-principal destination for ticket updates
    pub destination: String,
}

/// Session persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StorageConfig {
    /// File holding the persisted session
    pub path: PathBuf,
}

impl ClientConfig {
    /// Load configuration from environment variables.
    ///
    /// Unset or unparsable values fall back to their defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            api: ApiConfig {
                base_url: env::var("QUEUEPASS_API_BASE_URL")
                    .unwrap_or(defaults.api.base_url),
                request_timeout_ms: env::var("QUEUEPASS_REQUEST_TIMEOUT_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.api.request_timeout_ms),
            },
            realtime: RealtimeConfig {
                url: env::var("QUEUEPASS_WS_URL").unwrap_or(defaults.realtime.url),
                reconnect_delay_ms: env::var("QUEUEPASS_RECONNECT_DELAY_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.realtime.reconnect_delay_ms),
                heartbeat_incoming_ms: env::var("QUEUEPASS_HEARTBEAT_INCOMING_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.realtime.heartbeat_incoming_ms),
                heartbeat_outgoing_ms: env::var("QUEUEPASS_HEARTBEAT_OUTGOING_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.realtime.heartbeat_outgoing_ms),
                destination: defaults.realtime.destination,
            },
            storage: StorageConfig {
                path: env::var_os("QUEUEPASS_SESSION_FILE")
                    .map_or(defaults.storage.path, PathBuf::from),
            },
        }
    }

    /// Override the REST base URL.
    #[must_use]
    pub fn with_api_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.api.base_url = base_url.into();
        self
    }

    /// Override the WebSocket endpoint.
    #[must_use]
    pub fn with_ws_url(mut self, url: impl Into<String>) -> Self {
        self.realtime.url = url.into();
        self
    }

    /// Override the request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.api.request_timeout_ms = duration_ms(timeout);
        self
    }

    /// Override the reconnect delay.
    #[must_use]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.realtime.reconnect_delay_ms = duration_ms(delay);
        self
    }

    /// Override both heartbeat intervals.
    #[must_use]
    pub fn with_heartbeats(mut self, incoming: Duration, outgoing: Duration) -> Self {
        self.realtime.heartbeat_incoming_ms = duration_ms(incoming);
        self.realtime.heartbeat_outgoing_ms = duration_ms(outgoing);
        self
    }

    /// Override the session file.
    #[must_use]
    pub fn with_session_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage.path = path.into();
        self
    }
}

impl ApiConfig {
    /// Request timeout as a [`Duration`].
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl RealtimeConfig {
    /// Reconnect delay as a [`Duration`].
    #[must_use]
    pub const fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig {
                base_url: "http://localhost:8080/api".to_string(),
                request_timeout_ms: 30_000,
            },
            realtime: RealtimeConfig {
                url: "ws://localhost:8080/ws".to_string(),
                reconnect_delay_ms: 3_000,
                heartbeat_incoming_ms: 4_000,
                heartbeat_outgoing_ms: 4_000,
                destination: "/user/queue/tickets".to_string(),
            },
            storage: StorageConfig {
                path: PathBuf::from(".queuepass/auth-storage.json"),
            },
        }
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

//! Realtime ticket updates over STOMP.
//!
//! [`RealtimeChannel`] keeps one authenticated subscription to the user's
//! ticket destination alive, reconnecting after a fixed delay, and fans
//! decoded updates out to registered callbacks.

pub mod channel;
pub mod observers;
pub mod stomp;
pub mod transport;

pub use channel::{ChannelSettings, RealtimeChannel};
pub use observers::{Observers, Subscription};
pub use transport::{Connection, Transport, WsConnection, WsTransport};

use thiserror::Error;

/// Realtime channel failures.
///
/// These are reported to `on_error` callbacks; the channel itself keeps
/// reconnecting.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// Socket could not be opened or failed mid-stream
    #[error("WebSocket connection error: {0}")]
    Transport(String),

    /// Malformed frame from the broker
    #[error("STOMP protocol error: {0}")]
    Protocol(String),

    /// Broker sent an ERROR frame
    #[error("{0}")]
    Server(String),

    /// Nothing arrived within the negotiated heartbeat window
    #[error("Heartbeat timeout")]
    HeartbeatTimeout,

    /// Peer closed the connection
    #[error("Connection closed")]
    Closed,

    /// Channel configuration is unusable
    #[error("Invalid realtime configuration: {0}")]
    Config(String),
}

/// Connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No supervisor running
    #[default]
    Disconnected,
    /// Supervisor running, not subscribed yet (or between attempts)
    Connecting,
    /// Subscribed and receiving
    Connected,
}

//! # QueuePass Client
//!
//! Client library for a border-crossing queue: sign in, take a place in the
//! queue, and follow the ticket's position as the server pushes updates.
//!
//! ## Components
//!
//! - **Session** ([`session`]): token, profile and ticket in a
//!   [`queuepass_runtime::Store`], persisted to local storage
//! - **Gateway** ([`gateway`]): typed REST calls with bearer injection and a
//!   single 401 policy
//! - **Realtime** ([`realtime`]): STOMP subscription with heartbeats and
//!   automatic reconnect
//! - **View model** ([`view_model`]): countdown metrics for the ticket card
//! - **Client** ([`QueueClient`]): composition root driving the user flows
//!
//! ## Example
//!
//! ```ignore
//! use queuepass_client::{ClientConfig, QueueClient, realtime::WsTransport, session::FileStorage};
//! use std::sync::Arc;
//!
//! let config = ClientConfig::from_env();
//! let storage = Arc::new(FileStorage::new(&config.storage.path));
//! let client = QueueClient::start(config, storage, WsTransport).await?;
//!
//! client.sign_in("+77001234567", "Secret#123").await?;
//! client.take_place().await?;
//! ```

pub mod app;
pub mod config;
pub mod error;
pub mod gateway;
#[cfg(any(test, feature = "test-utils"))]
pub mod mocks;
pub mod realtime;
pub mod session;
pub mod validation;
pub mod view_model;

pub use app::QueueClient;
pub use config::ClientConfig;
pub use error::{ClientError, Notice, NoticeKind, Result};
pub use realtime::{ChannelError, ConnectionState, RealtimeChannel, Subscription};
pub use session::{SessionHandle, Ticket, TicketStatus, TicketUpdate, User, UserPatch};
pub use view_model::{TicketMetrics, TicketViewModel};

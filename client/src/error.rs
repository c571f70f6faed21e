//! Error types for client operations.

use crate::realtime::ChannelError;
use crate::validation::ValidationError;
use queuepass_runtime::StoreError;
use thiserror::Error;

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Every failure a client flow can end in.
///
/// Validation errors never reach the network. Network and server errors
/// surface to the flow that started the request. Channel errors are passive
/// and never tear down the session.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ClientError {
    // ═══════════════════════════════════════════════════════════
    // Before dispatch
    // ═══════════════════════════════════════════════════════════

    /// Input rejected locally.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    // ═══════════════════════════════════════════════════════════
    // HTTP
    // ═══════════════════════════════════════════════════════════

    /// No response was received (connect failure, timeout).
    #[error("Network error: {0}")]
    Network(String),

    /// A response arrived with an error status.
    #[error("Server responded with {status}: {message}")]
    Server {
        /// HTTP status code
        status: u16,
        /// Server message, or the raw body when it carried none
        message: String,
    },

    /// The server answered 2xx but refused the operation.
    #[error("Request rejected: {0}")]
    Rejected(String),

    /// A 2xx body that does not match the expected shape.
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    // ═══════════════════════════════════════════════════════════
    // Realtime
    // ═══════════════════════════════════════════════════════════

    /// Transport or subscription failure.
    #[error(transparent)]
    Channel(#[from] ChannelError),

    // ═══════════════════════════════════════════════════════════
    // Local
    // ═══════════════════════════════════════════════════════════

    /// The store runtime refused the action.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ClientError {
    /// Whether the server answered 401.
    #[must_use]
    pub const fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Server { status: 401, .. })
    }

    /// Whether the request never got a response.
    #[must_use]
    pub const fn is_network(&self) -> bool {
        matches!(self, Self::Network(_))
    }

    /// Render the error as a dismissible notification.
    #[must_use]
    pub fn notice(&self) -> Notice {
        match self {
            Self::Validation(err) => Notice::warning("Check your input", err.to_string()),
            Self::Network(_) => Notice::error(
                "Connection problem",
                "The server could not be reached. Check your connection and try again.",
            ),
            Self::Server { status: 401, .. } => Notice::error(
                "Session expired",
                "Please sign in again.",
            ),
            Self::Server { status: 403, .. } => Notice::error(
                "Access denied",
                "You do not have permission to perform this action.",
            ),
            Self::Server { status: 404, message } => Notice::error("Not found", message.clone()),
            Self::Server { status, message } if *status >= 500 => Notice::error(
                "Server error",
                if message.is_empty() {
                    "Something went wrong on our side. Please try again later.".to_string()
                } else {
                    message.clone()
                },
            ),
            Self::Server { message, .. } | Self::Rejected(message) => {
                Notice::error("Request failed", message.clone())
            },
            Self::UnexpectedResponse(_) => Notice::error(
                "Unexpected response",
                "The server sent something we did not understand.",
            ),
            Self::Channel(err) => Notice::warning("Live updates unavailable", err.to_string()),
            Self::Store(err) => Notice::error("Client unavailable", err.to_string()),
        }
    }
}

/// Severity of a [`Notice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    /// The operation failed
    Error,
    /// Degraded but usable
    Warning,
}

/// A user-facing notification derived from a [`ClientError`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    /// Short headline
    pub title: String,
    /// Longer explanation
    pub description: String,
    /// Severity
    pub kind: NoticeKind,
}

impl Notice {
    fn error(title: &str, description: impl Into<String>) -> Self {
        Self {
            title: title.to_string(),
            description: description.into(),
            kind: NoticeKind::Error,
        }
    }

    fn warning(title: &str, description: impl Into<String>) -> Self {
        Self {
            title: title.to_string(),
            description: description.into(),
            kind: NoticeKind::Warning,
        }
    }
}

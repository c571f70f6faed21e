//! Typed REST gateway.
//!
//! Every call attaches the current bearer token (when there is one) and
//! classifies failures in one place. A 401 on a protected endpoint tears the
//! session down through [`SessionGate::session_rejected`], whichever call
//! site triggered it.

pub mod types;

pub use types::{
    CreateTicketResponse, GetCodeRequest, GetCodeResponse, RequestResetRequest,
    ResetPasswordRequest, SignInRequest, SignUpRequest, SignUpResponse, TokenResponse,
    VerifyCodeRequest,
};

use crate::config::ApiConfig;
use crate::error::{ClientError, Result};
use crate::session::Ticket;
use reqwest::{Method, StatusCode, header};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;

/// Token source and 401 sink for the gateway.
///
/// The session store implements this; the gateway never sees the store itself.
pub trait SessionGate: Send + Sync {
    /// Token to attach, if any.
    fn bearer_token(&self) -> impl Future<Output = Option<String>> + Send;

    /// A protected request carrying `token` was answered with 401.
    fn session_rejected(&self, token: &str) -> impl Future<Output = ()> + Send;
}

/// Whether an endpoint needs a valid session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Auth and verification endpoints; 401 is an ordinary failure
    Public,
    /// Everything else; 401 ends the session
    Protected,
}

/// A REST endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    /// Path below the base URL
    pub path: &'static str,
    /// Access class
    pub access: Access,
}

/// The endpoints the client talks to.
pub mod endpoints {
    use super::{Access, Endpoint};

    /// Create an account.
    pub const SIGN_UP: Endpoint = Endpoint { path: "/auth/sign-up", access: Access::Public };
    /// Exchange credentials for a token.
    pub const SIGN_IN: Endpoint = Endpoint { path: "/auth/sign-in", access: Access::Public };
    /// Send a password reset link.
    pub const REQUEST_RESET: Endpoint =
        Endpoint { path: "/auth/request-reset", access: Access::Public };
    /// Set a new password.
    pub const RESET: Endpoint = Endpoint { path: "/auth/reset", access: Access::Public };
    /// Text a verification code.
    pub const GET_CODE: Endpoint =
        Endpoint { path: "/verification/get-code", access: Access::Public };
    /// Check a verification code.
    pub const VERIFY_CODE: Endpoint =
        Endpoint { path: "/verification/verify-code", access: Access::Public };
    /// The caller's ticket.
    pub const TICKETS: Endpoint = Endpoint { path: "/tickets", access: Access::Protected };
}

/// REST client for the queue API.
pub struct Gateway<G> {
    http: reqwest::Client,
    base_url: String,
    gate: G,
}

impl<G: SessionGate> Gateway<G> {
    /// Build a gateway with the configured base URL and timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Network`] if the HTTP client cannot be built.
    pub fn new(config: &ApiConfig, gate: G) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ClientError::Network(e.to_string()))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            gate,
        })
    }

    /// Create an account. The server texts a verification code.
    ///
    /// # Errors
    ///
    /// Network, server or decode failures.
    #[tracing::instrument(skip(self, request), fields(phone = %request.phone_number))]
    pub async fn sign_up(&self, request: &SignUpRequest) -> Result<SignUpResponse> {
        let body = self.execute(Method::POST, endpoints::SIGN_UP, Some(request)).await?;
        decode(&body)
    }

    /// Exchange credentials for a bearer token.
    ///
    /// # Errors
    ///
    /// [`ClientError::Rejected`] when the server answers without a token,
    /// otherwise network, server or decode failures.
    #[tracing::instrument(skip(self, request), fields(phone = %request.phone_number))]
    pub async fn sign_in(&self, request: &SignInRequest) -> Result<String> {
        let body = self.execute(Method::POST, endpoints::SIGN_IN, Some(request)).await?;
        token_from(decode(&body)?, "Invalid phone number or password")
    }

    /// Ask for a password reset link.
    ///
    /// # Errors
    ///
    /// Network or server failures.
    #[tracing::instrument(skip(self, request))]
    pub async fn request_reset(&self, request: &RequestResetRequest) -> Result<()> {
        self.execute(Method::POST, endpoints::REQUEST_RESET, Some(request)).await?;
        Ok(())
    }

    /// Set a new password with a reset token.
    ///
    /// # Errors
    ///
    /// Network or server failures.
    #[tracing::instrument(skip(self, request))]
    pub async fn reset_password(&self, request: &ResetPasswordRequest) -> Result<()> {
        self.execute(Method::POST, endpoints::RESET, Some(request)).await?;
        Ok(())
    }

    /// Text a verification code.
    ///
    /// # Errors
    ///
    /// [`ClientError::Rejected`] when the server reports failure, otherwise
    /// network, server or decode failures.
    #[tracing::instrument(skip(self, request), fields(phone = %request.phone_number))]
    pub async fn get_code(&self, request: &GetCodeRequest) -> Result<GetCodeResponse> {
        let body = self.execute(Method::POST, endpoints::GET_CODE, Some(request)).await?;
        let response: GetCodeResponse = decode(&body)?;
        if response.success {
            Ok(response)
        } else {
            Err(ClientError::Rejected(non_empty_or(
                response.message,
                "Could not send a verification code",
            )))
        }
    }

    /// Check a verification code and obtain a bearer token.
    ///
    /// # Errors
    ///
    /// [`ClientError::Rejected`] for a wrong code, otherwise network, server
    /// or decode failures.
    #[tracing::instrument(skip(self, request), fields(phone = %request.phone_number))]
    pub async fn verify_code(&self, request: &VerifyCodeRequest) -> Result<String> {
        let body = self.execute(Method::POST, endpoints::VERIFY_CODE, Some(request)).await?;
        let response: TokenResponse = decode(&body)?;
        if !response.success {
            return Err(ClientError::Rejected(non_empty_or(
                response.message,
                "Invalid verification code",
            )));
        }
        token_from(response, "Invalid verification code")
    }

    /// The caller's ticket, `None` when there is none.
    ///
    /// An empty body, `null` and 404 all mean "no ticket".
    ///
    /// # Errors
    ///
    /// Network, server or decode failures.
    #[tracing::instrument(skip(self))]
    pub async fn get_ticket(&self) -> Result<Option<Ticket>> {
        let body = match self.execute::<()>(Method::GET, endpoints::TICKETS, None).await {
            Ok(body) => body,
            Err(ClientError::Server { status: 404, .. }) => return Ok(None),
            Err(e) => return Err(e),
        };

        if body.trim().is_empty() {
            return Ok(None);
        }
        decode(&body)
    }

    /// Take a place in the queue.
    ///
    /// # Errors
    ///
    /// Network, server or decode failures.
    #[tracing::instrument(skip(self))]
    pub async fn create_ticket(&self) -> Result<Ticket> {
        let empty = serde_json::Map::new();
        let body = self.execute(Method::POST, endpoints::TICKETS, Some(&empty)).await?;
        decode::<CreateTicketResponse>(&body).map(Ticket::from)
    }

    /// Mark the ticket as completed.
    ///
    /// # Errors
    ///
    /// Network or server failures.
    #[tracing::instrument(skip(self))]
    pub async fn complete_ticket(&self) -> Result<()> {
        self.execute::<()>(Method::PATCH, endpoints::TICKETS, None).await?;
        Ok(())
    }

    /// Give up the ticket.
    ///
    /// # Errors
    ///
    /// Network or server failures.
    #[tracing::instrument(skip(self))]
    pub async fn delete_ticket(&self) -> Result<()> {
        self.execute::<()>(Method::DELETE, endpoints::TICKETS, None).await?;
        Ok(())
    }

    /// Send one request and classify the outcome.
    async fn execute<B>(&self, method: Method, endpoint: Endpoint, body: Option<&B>) -> Result<String>
    where
        B: Serialize + ?Sized + Sync,
    {
        let token = self.gate.bearer_token().await;
        let url = format!("{}{}", self.base_url, endpoint.path);

        let mut request = self
            .http
            .request(method.clone(), &url)
            .header(header::ACCEPT, "application/json");
        if let Some(token) = &token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        metrics::counter!("gateway.requests", "path" => endpoint.path).increment(1);

        let response = request.send().await.map_err(|e| {
            tracing::warn!(%method, path = endpoint.path, error = %e, "No response from server");
            metrics::counter!("gateway.network_errors", "path" => endpoint.path).increment(1);
            ClientError::Network(e.to_string())
        })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;

        if status.is_success() {
            tracing::debug!(%method, path = endpoint.path, status = status.as_u16(), "Request succeeded");
            return Ok(text);
        }

        self.on_error_status(status, endpoint, token.as_deref(), &text).await;

        Err(ClientError::Server {
            status: status.as_u16(),
            message: server_message(&text),
        })
    }

    async fn on_error_status(&self, status: StatusCode, endpoint: Endpoint, token: Option<&str>, body: &str) {
        metrics::counter!("gateway.error_responses", "path" => endpoint.path).increment(1);

        match status {
            StatusCode::UNAUTHORIZED => match (endpoint.access, token) {
                (Access::Protected, Some(token)) => {
                    tracing::warn!(path = endpoint.path, "Unauthorized, ending session");
                    self.gate.session_rejected(token).await;
                },
                (Access::Protected, None) => {
                    tracing::warn!(path = endpoint.path, "Unauthorized without a session");
                },
                (Access::Public, _) => {
                    tracing::info!(path = endpoint.path, body, "Authentication failed");
                },
            },
            StatusCode::FORBIDDEN => tracing::warn!(path = endpoint.path, "Access forbidden"),
            StatusCode::NOT_FOUND => tracing::debug!(path = endpoint.path, "Resource not found"),
            StatusCode::INTERNAL_SERVER_ERROR => {
                tracing::error!(path = endpoint.path, "Internal server error");
            },
            other => tracing::warn!(path = endpoint.path, status = other.as_u16(), "Request failed"),
        }
    }
}

impl<G> std::fmt::Debug for Gateway<G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

fn decode<T: DeserializeOwned>(body: &str) -> Result<T> {
    serde_json::from_str(body).map_err(|e| ClientError::UnexpectedResponse(e.to_string()))
}

fn token_from(response: TokenResponse, fallback: &str) -> Result<String> {
    match response.token.filter(|token| !token.is_empty()) {
        Some(token) => Ok(token),
        None => Err(ClientError::Rejected(non_empty_or(response.message, fallback))),
    }
}

fn non_empty_or(message: String, fallback: &str) -> String {
    if message.trim().is_empty() {
        fallback.to_string()
    } else {
        message
    }
}

/// The JSON `message` field when present, otherwise the raw body.
fn server_message(body: &str) -> String {
    serde_json::from_str::<types::ErrorBody>(body)
        .ok()
        .and_then(|parsed| parsed.message)
        .unwrap_or_else(|| body.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_message_prefers_json_field() {
        assert_eq!(server_message(r#"{"message":"Ticket not found"}"#), "Ticket not found");
        assert_eq!(server_message("Bad Gateway\n"), "Bad Gateway");
        assert_eq!(server_message(r#"{"error":"x"}"#), r#"{"error":"x"}"#);
    }

    #[test]
    fn test_token_from_requires_token() {
        let accepted = TokenResponse {
            success: true,
            message: String::new(),
            token: Some("jwt".to_string()),
        };
        assert_eq!(token_from(accepted, "fallback"), Ok("jwt".to_string()));

        let refused = TokenResponse {
            success: false,
            message: String::new(),
            token: None,
        };
        assert_eq!(
            token_from(refused, "fallback"),
            Err(ClientError::Rejected("fallback".to_string()))
        );
    }

    #[test]
    fn test_protected_endpoints() {
        assert_eq!(endpoints::TICKETS.access, Access::Protected);
        assert_eq!(endpoints::SIGN_IN.access, Access::Public);
        assert_eq!(endpoints::VERIFY_CODE.access, Access::Public);
    }
}

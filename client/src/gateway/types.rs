//! Request and response bodies of the REST API.

use crate::session::{Ticket, TicketStatus, UserRole};
use serde::{Deserialize, Serialize};

/// `POST /auth/sign-up`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignUpRequest {
    /// Display name (trimmed)
    pub name: String,
    /// `dd.MM.yyyy`
    pub birth_date: String,
    /// Phone number
    pub phone_number: String,
    /// Password
    pub password: String,
}

/// User record returned by sign-up.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SignUpResponse {
    /// Server identifier
    pub id: Option<serde_json::Value>,
    /// Display name
    pub name: Option<String>,
    /// Birth date
    pub birth_date: Option<String>,
    /// Phone number
    pub phone_number: Option<String>,
    /// Whether the phone is already verified
    pub is_phone_verified: bool,
    /// Account status
    pub status: Option<String>,
    /// Assigned category
    pub role: Option<UserRole>,
    /// Creation timestamp
    pub created_at: Option<String>,
}

/// `POST /auth/sign-in`
#[derive(Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInRequest {
    /// Phone number
    pub phone_number: String,
    /// Password
    pub password: String,
}

impl std::fmt::Debug for SignInRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignInRequest")
            .field("phone_number", &self.phone_number)
            .finish_non_exhaustive()
    }
}

/// Outcome of sign-in or code verification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TokenResponse {
    /// Whether the server accepted the request
    pub success: bool,
    /// Human-readable outcome
    pub message: String,
    /// Bearer token on success
    pub token: Option<String>,
}

/// `POST /auth/request-reset`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestResetRequest {
    /// Phone number the reset link goes to
    pub number: String,
}

/// `POST /auth/reset`
#[derive(Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    /// Token from the reset link
    pub token: String,
    /// New password
    pub new_password: String,
}

impl std::fmt::Debug for ResetPasswordRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResetPasswordRequest").finish_non_exhaustive()
    }
}

/// `POST /verification/get-code`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetCodeRequest {
    /// Phone number to text
    pub phone_number: String,
}

/// Outcome of a code request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GetCodeResponse {
    /// Whether a code was sent
    pub success: bool,
    /// Human-readable outcome
    pub message: String,
}

/// `POST /verification/verify-code`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyCodeRequest {
    /// Phone number being verified
    pub phone_number: String,
    /// Six-character code
    pub code: String,
}

/// `POST /tickets` response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTicketResponse {
    /// Initial status
    pub status: TicketStatus,
    /// Creation timestamp
    pub created_at: String,
}

impl From<CreateTicketResponse> for Ticket {
    fn from(response: CreateTicketResponse) -> Self {
        Self::new(response.status, response.created_at)
    }
}

/// Server-side error body.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    pub message: Option<String>,
}

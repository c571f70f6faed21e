//! Session state and the domain types it owns.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a queue ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketStatus {
    /// In line
    Waiting,
    /// Told to proceed to the checkpoint
    Called,
    /// Being processed at the checkpoint
    Active,
    /// Crossed
    Completed,
    /// Withdrawn
    Cancelled,
}

impl TicketStatus {
    /// Whether the ticket reached the end of its lifecycle.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

/// Category the traveller registered under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    /// Adult traveller
    Ordinary,
    /// Minor
    Children,
    /// Senior
    Elderly,
    /// No profile attached
    Anonymous,
}

/// A user's claim to a place in the physical queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    /// Current status
    pub status: TicketStatus,
    /// Creation timestamp as sent by the server
    pub created_at: String,
    /// 1-based position, 0 when at the front
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_position: Option<u32>,
    /// Server estimate in minutes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waiting_time: Option<u32>,
}

impl Ticket {
    /// A freshly created ticket with no position yet.
    #[must_use]
    pub fn new(status: TicketStatus, created_at: impl Into<String>) -> Self {
        Self {
            status,
            created_at: created_at.into(),
            queue_position: None,
            waiting_time: None,
        }
    }

    /// Merge a realtime push into this ticket.
    ///
    /// Only status, position and waiting time are taken from the update, and
    /// only when present. `created_at` always stays as stored.
    pub fn apply(&mut self, update: &TicketUpdate) {
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(position) = update.queue_position {
            self.queue_position = Some(position);
        }
        if let Some(waiting_time) = update.waiting_time {
            self.waiting_time = Some(waiting_time);
        }
    }
}

/// Realtime ticket update as pushed by the server.
///
/// Every field may be absent. It is never stored as-is, only merged into a
/// [`Ticket`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketUpdate {
    /// New status
    #[serde(default)]
    pub status: Option<TicketStatus>,
    /// New position
    #[serde(default)]
    pub queue_position: Option<u32>,
    /// New estimate in minutes
    #[serde(default)]
    pub waiting_time: Option<u32>,
    /// Server creation timestamp (informational)
    #[serde(default)]
    pub created_at: Option<String>,
}

/// The authenticated traveller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Phone number, the unique identifier
    pub phone: String,
    /// Birth date, `dd.MM.yyyy`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<String>,
    /// Registered category
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<UserRole>,
    /// Whether the phone passed verification
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_phone_verified: Option<bool>,
    /// Account creation timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    /// Current ticket
    #[serde(default)]
    pub ticket: Option<Ticket>,
}

/// Partial user profile used by login and profile updates.
///
/// `None` leaves a field alone. For `ticket`, `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserPatch {
    /// Phone number
    pub phone: Option<String>,
    /// Birth date
    pub birth_date: Option<String>,
    /// Category
    pub role: Option<UserRole>,
    /// Verification flag
    pub is_phone_verified: Option<bool>,
    /// Creation timestamp
    pub created_at: Option<String>,
    /// Ticket
    pub ticket: Option<Option<Ticket>>,
}

impl UserPatch {
    /// Patch carrying only a phone number.
    #[must_use]
    pub fn phone(phone: impl Into<String>) -> Self {
        Self {
            phone: Some(phone.into()),
            ..Self::default()
        }
    }

    /// Set the birth date.
    #[must_use]
    pub fn with_birth_date(mut self, birth_date: impl Into<String>) -> Self {
        self.birth_date = Some(birth_date.into());
        self
    }

    /// Set the verification flag.
    #[must_use]
    pub const fn with_phone_verified(mut self, verified: bool) -> Self {
        self.is_phone_verified = Some(verified);
        self
    }

    /// Set the role.
    #[must_use]
    pub const fn with_role(mut self, role: UserRole) -> Self {
        self.role = Some(role);
        self
    }
}

impl User {
    /// Login merge: patch fields win, the existing user fills the gaps.
    ///
    /// A patch ticket of `Some(None)` does not clear an existing ticket here.
    #[must_use]
    pub fn merged_for_login(current: Option<&Self>, patch: UserPatch) -> Self {
        let phone = patch
            .phone
            .filter(|phone| !phone.is_empty())
            .or_else(|| current.map(|user| user.phone.clone()))
            .unwrap_or_default();

        Self {
            phone,
            birth_date: patch
                .birth_date
                .or_else(|| current.and_then(|user| user.birth_date.clone())),
            role: patch.role.or_else(|| current.and_then(|user| user.role)),
            is_phone_verified: patch
                .is_phone_verified
                .or_else(|| current.and_then(|user| user.is_phone_verified)),
            created_at: patch
                .created_at
                .or_else(|| current.and_then(|user| user.created_at.clone())),
            ticket: patch
                .ticket
                .flatten()
                .or_else(|| current.and_then(|user| user.ticket.clone())),
        }
    }

    /// Shallow update: every field present in the patch replaces the stored one.
    pub fn update(&mut self, patch: UserPatch) {
        if let Some(phone) = patch.phone {
            self.phone = phone;
        }
        if let Some(birth_date) = patch.birth_date {
            self.birth_date = Some(birth_date);
        }
        if let Some(role) = patch.role {
            self.role = Some(role);
        }
        if let Some(verified) = patch.is_phone_verified {
            self.is_phone_verified = Some(verified);
        }
        if let Some(created_at) = patch.created_at {
            self.created_at = Some(created_at);
        }
        if let Some(ticket) = patch.ticket {
            self.ticket = ticket;
        }
    }
}

/// Client-side session: token, profile and the ticket inside the profile.
///
/// `is_authenticated` is true only while both `token` and `user` are present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    /// Bearer token
    pub token: Option<String>,
    /// Signed-in user
    pub user: Option<User>,
    /// Whether the session is usable for protected calls
    pub is_authenticated: bool,
    /// Bumped by every persisted mutation
    pub revision: u64,
}

impl SessionState {
    /// The current ticket, if any.
    #[must_use]
    pub fn ticket(&self) -> Option<&Ticket> {
        self.user.as_ref().and_then(|user| user.ticket.as_ref())
    }

    /// Whether a ticket is held.
    #[must_use]
    pub fn has_ticket(&self) -> bool {
        self.ticket().is_some()
    }

    /// Recompute the authenticated flag from token and user.
    pub fn reconcile(&mut self) {
        self.is_authenticated = self.token.is_some() && self.user.is_some();
    }

    /// Drop token, user and the authenticated flag.
    pub fn clear(&mut self) {
        self.token = None;
        self.user = None;
        self.is_authenticated = false;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;

    fn ticket() -> Ticket {
        Ticket {
            status: TicketStatus::Waiting,
            created_at: "2025-01-01T08:00:00".to_string(),
            queue_position: Some(12),
            waiting_time: Some(24),
        }
    }

    #[test]
    fn test_merge_keeps_absent_fields() {
        let mut stored = ticket();
        stored.apply(&TicketUpdate {
            queue_position: Some(7),
            ..TicketUpdate::default()
        });

        assert_eq!(stored.queue_position, Some(7));
        assert_eq!(stored.status, TicketStatus::Waiting);
        assert_eq!(stored.waiting_time, Some(24));
    }

    #[test]
    fn test_merge_never_replaces_created_at() {
        let mut stored = ticket();
        stored.apply(&TicketUpdate {
            status: Some(TicketStatus::Called),
            created_at: Some("1999-01-01T00:00:00".to_string()),
            ..TicketUpdate::default()
        });

        assert_eq!(stored.status, TicketStatus::Called);
        assert_eq!(stored.created_at, "2025-01-01T08:00:00");
    }

    #[test]
    fn test_ticket_update_decodes_partial_payload() {
        let update: TicketUpdate =
            serde_json::from_str(r#"{"queuePosition":3,"status":"WAITING"}"#).unwrap();
        assert_eq!(update.queue_position, Some(3));
        assert_eq!(update.status, Some(TicketStatus::Waiting));
        assert_eq!(update.waiting_time, None);
    }

    #[test]
    fn test_login_merge_prefers_patch() {
        let current = User {
            phone: "+77000000000".to_string(),
            birth_date: Some("01.01.1990".to_string()),
            ticket: Some(ticket()),
            ..User::default()
        };

        let merged = User::merged_for_login(
            Some(&current),
            UserPatch::phone("+77001112233").with_phone_verified(true),
        );

        assert_eq!(merged.phone, "+77001112233");
        assert_eq!(merged.birth_date.as_deref(), Some("01.01.1990"));
        assert_eq!(merged.is_phone_verified, Some(true));
        assert_eq!(merged.ticket, Some(ticket()));
    }

    #[test]
    fn test_update_can_clear_ticket() {
        let mut user = User {
            phone: "+77000000000".to_string(),
            ticket: Some(ticket()),
            ..User::default()
        };
        user.update(UserPatch {
            ticket: Some(None),
            ..UserPatch::default()
        });
        assert!(user.ticket.is_none());
        assert_eq!(user.phone, "+77000000000");
    }
}

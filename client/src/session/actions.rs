//! Session actions.

use super::state::{Ticket, TicketUpdate, UserPatch};

/// Every input the session reducer understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// Store the token and merge the profile over any existing user.
    Login {
        /// Bearer token
        token: String,
        /// Profile fields known at login
        user: UserPatch,
    },

    /// Clear the whole session.
    Logout,

    /// Shallow-merge profile fields. Ignored without a user.
    UpdateUser(UserPatch),

    /// Replace the token only.
    SetToken(String),

    /// Replace the ticket. Ignored without a user.
    SetTicket(Option<Ticket>),

    /// Drop the ticket. Ignored without a user.
    ClearTicket,

    /// Reconcile the authenticated flag after a restore.
    Initialize,

    /// Merge a realtime push into the current ticket.
    TicketUpdateReceived(TicketUpdate),

    /// Outcome of a [`SessionAction::TicketUpdateReceived`], emitted once the
    /// merged ticket is persisted.
    TicketUpdateApplied {
        /// The push as received
        update: TicketUpdate,
        /// The ticket after the merge, or `None` when there was no ticket
        ticket: Option<Ticket>,
    },

    /// A protected request carrying `token` was answered with 401.
    SessionRejected {
        /// The token the rejected request carried
        token: String,
    },

    /// Emitted once when a rejection tore the session down.
    SessionExpired,
}

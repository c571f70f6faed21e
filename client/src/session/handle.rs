//! Cloneable handle to the session store.

use super::actions::SessionAction;
use super::persistence::{self, SessionStorage, SnapshotWriter};
use super::reducer::{SessionEnvironment, SessionReducer};
use super::state::{SessionState, Ticket, TicketUpdate, User, UserPatch};
use crate::error::Result;
use crate::gateway::SessionGate;
use queuepass_runtime::Store;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// How long a push may take to merge and persist.
const OUTCOME_TIMEOUT: Duration = Duration::from_secs(5);

/// Store type backing [`SessionHandle`].
pub type SessionStore = Store<SessionState, SessionAction, SessionEnvironment, SessionReducer>;

/// Single source of truth for token, profile and ticket.
///
/// Every mutation goes through the store, which applies it under one writer
/// lock, and resolves once the resulting snapshot has been written. Clones
/// share the same store.
#[derive(Clone)]
pub struct SessionHandle {
    store: SessionStore,
}

impl SessionHandle {
    /// Build a session from `state`, persisting through `storage`.
    #[must_use]
    pub fn new(state: SessionState, storage: Arc<dyn SessionStorage>) -> Self {
        let writer = SnapshotWriter::new(storage, state.revision);
        let store = Store::new(state, SessionReducer, SessionEnvironment::new(writer));
        Self { store }
    }

    /// Restore the stored session (or start empty) and reconcile it.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ClientError::Store`] if the store refuses the
    /// initialize action.
    pub async fn restore(storage: Arc<dyn SessionStorage>) -> Result<Self> {
        let state = persistence::restore(Arc::clone(&storage))
            .await
            .map(persistence::PersistedSession::into_state)
            .unwrap_or_default();

        let handle = Self::new(state, storage);
        handle.initialize().await?;
        Ok(handle)
    }

    #[tracing::instrument(skip(self, action), level = "debug", name = "session_dispatch")]
    async fn dispatch(&self, action: SessionAction) -> Result<()> {
        let mut effects = self.store.send(action).await?;
        effects.wait().await;
        Ok(())
    }

    /// Store the token and merge `user` over the current profile.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ClientError::Store`] if the store is shutting down.
    pub async fn login(&self, token: impl Into<String>, user: UserPatch) -> Result<()> {
        self.dispatch(SessionAction::Login {
            token: token.into(),
            user,
        })
        .await
    }

    /// Clear the session.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ClientError::Store`] if the store is shutting down.
    pub async fn logout(&self) -> Result<()> {
        self.dispatch(SessionAction::Logout).await
    }

    /// Shallow-merge profile fields; ignored without a user.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ClientError::Store`] if the store is shutting down.
    pub async fn update_user(&self, patch: UserPatch) -> Result<()> {
        self.dispatch(SessionAction::UpdateUser(patch)).await
    }

    /// Replace the token only.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ClientError::Store`] if the store is shutting down.
    pub async fn set_token(&self, token: impl Into<String>) -> Result<()> {
        self.dispatch(SessionAction::SetToken(token.into())).await
    }

    /// Replace the ticket; ignored without a user.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ClientError::Store`] if the store is shutting down.
    pub async fn set_ticket(&self, ticket: Option<Ticket>) -> Result<()> {
        self.dispatch(SessionAction::SetTicket(ticket)).await
    }

    /// Drop the ticket; ignored without a user.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ClientError::Store`] if the store is shutting down.
    pub async fn clear_ticket(&self) -> Result<()> {
        self.dispatch(SessionAction::ClearTicket).await
    }

    /// Reconcile the authenticated flag from token and user.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ClientError::Store`] if the store is shutting down.
    pub async fn initialize(&self) -> Result<()> {
        self.dispatch(SessionAction::Initialize).await
    }

    /// Merge a realtime push into the current ticket.
    ///
    /// Resolves to the merged ticket once it is persisted, or `None` when
    /// there was no ticket to merge into and the push was dropped.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ClientError::Store`] if the store is shutting down or
    /// the outcome never arrives.
    pub async fn apply_ticket_update(&self, update: TicketUpdate) -> Result<Option<Ticket>> {
        let outcome = self
            .store
            .send_and_wait_for(
                SessionAction::TicketUpdateReceived(update.clone()),
                |action| {
                    matches!(
                        action,
                        SessionAction::TicketUpdateApplied { update: applied, .. } if *applied == update
                    )
                },
                OUTCOME_TIMEOUT,
            )
            .await?;

        match outcome {
            SessionAction::TicketUpdateApplied { ticket, .. } => Ok(ticket),
            _ => Ok(None),
        }
    }

    /// Tear the session down if it still carries `token`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ClientError::Store`] if the store is shutting down.
    pub async fn reject_session(&self, token: impl Into<String>) -> Result<()> {
        self.dispatch(SessionAction::SessionRejected {
            token: token.into(),
        })
        .await
    }

    /// Stop accepting mutations and wait for in-flight snapshot writes.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ClientError::Store`] if writes are still running
    /// after `timeout`.
    pub async fn shutdown(&self, timeout: Duration) -> Result<()> {
        self.store.shutdown(timeout).await?;
        Ok(())
    }

    /// Whether the session can make protected calls.
    pub async fn is_authenticated(&self) -> bool {
        self.store.state(|s| s.is_authenticated).await
    }

    /// Current bearer token.
    pub async fn token(&self) -> Option<String> {
        self.store.state(|s| s.token.clone()).await
    }

    /// Current user.
    pub async fn current_user(&self) -> Option<User> {
        self.store.state(|s| s.user.clone()).await
    }

    /// Current ticket.
    pub async fn ticket(&self) -> Option<Ticket> {
        self.store.state(|s| s.ticket().cloned()).await
    }

    /// Whether a ticket is held.
    pub async fn has_ticket(&self) -> bool {
        self.store.state(SessionState::has_ticket).await
    }

    /// Copy of the whole state.
    pub async fn snapshot(&self) -> SessionState {
        self.store.state(Clone::clone).await
    }

    /// Actions produced by session effects, such as
    /// [`SessionAction::SessionExpired`].
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionAction> {
        self.store.subscribe_actions()
    }
}

impl SessionGate for SessionHandle {
    async fn bearer_token(&self) -> Option<String> {
        self.token().await
    }

    async fn session_rejected(&self, token: &str) {
        if let Err(error) = self.reject_session(token).await {
            tracing::warn!(%error, "Could not apply session rejection");
        }
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle").finish_non_exhaustive()
    }
}

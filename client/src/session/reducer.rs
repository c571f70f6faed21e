//! Session reducer.
//!
//! Every rule about how the session changes lives here. The reducer never
//! performs I/O: persisted mutations bump the revision and return a snapshot
//! effect that the runtime executes.

use super::actions::SessionAction;
use super::persistence::{PersistedSession, SnapshotWriter};
use super::state::{SessionState, User};
use queuepass_core::{Effect, Reducer, SmallVec, async_effect, smallvec};

/// Dependencies of [`SessionReducer`].
#[derive(Debug, Clone)]
pub struct SessionEnvironment {
    /// Snapshot sink
    pub writer: SnapshotWriter,
}

impl SessionEnvironment {
    /// Environment persisting through `writer`.
    #[must_use]
    pub const fn new(writer: SnapshotWriter) -> Self {
        Self { writer }
    }
}

/// Reducer for [`SessionState`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionReducer;

impl SessionReducer {
    /// Bump the revision and describe writing the resulting snapshot.
    fn persist(state: &mut SessionState, env: &SessionEnvironment) -> Effect<SessionAction> {
        state.revision += 1;
        let snapshot = PersistedSession::snapshot(state);
        let writer = env.writer.clone();

        async_effect! {
            writer.write(snapshot).await;
            None
        }
    }
}

impl Reducer for SessionReducer {
    type State = SessionState;
    type Action = SessionAction;
    type Environment = SessionEnvironment;

    fn reduce(
        &self,
        state: &mut SessionState,
        action: SessionAction,
        env: &SessionEnvironment,
    ) -> SmallVec<[Effect<SessionAction>; 4]> {
        match action {
            SessionAction::Login { token, user } => {
                let merged = User::merged_for_login(state.user.as_ref(), user);
                state.token = Some(token);
                state.user = Some(merged);
                state.is_authenticated = true;
                smallvec![Self::persist(state, env)]
            },

            SessionAction::Logout => {
                state.clear();
                smallvec![Self::persist(state, env)]
            },

            SessionAction::UpdateUser(patch) => {
                let Some(user) = state.user.as_mut() else {
                    return smallvec![Effect::None];
                };
                user.update(patch);
                smallvec![Self::persist(state, env)]
            },

            SessionAction::SetToken(token) => {
                state.token = Some(token);
                smallvec![Self::persist(state, env)]
            },

            SessionAction::SetTicket(ticket) => {
                let Some(user) = state.user.as_mut() else {
                    return smallvec![Effect::None];
                };
                user.ticket = ticket;
                smallvec![Self::persist(state, env)]
            },

            SessionAction::ClearTicket => {
                let Some(user) = state.user.as_mut() else {
                    return smallvec![Effect::None];
                };
                user.ticket = None;
                smallvec![Self::persist(state, env)]
            },

            SessionAction::Initialize => {
                state.reconcile();
                smallvec![Self::persist(state, env)]
            },

            SessionAction::TicketUpdateReceived(update) => {
                // No user or no ticket: a late push must not bring a ticket back
                let Some(ticket) = state.user.as_mut().and_then(|user| user.ticket.as_mut())
                else {
                    tracing::debug!("Ignoring ticket update without a current ticket");
                    return smallvec![async_effect! {
                        Some(SessionAction::TicketUpdateApplied { update, ticket: None })
                    }];
                };
                ticket.apply(&update);
                let merged = ticket.clone();

                smallvec![Effect::chain(vec![
                    Self::persist(state, env),
                    async_effect! {
                        Some(SessionAction::TicketUpdateApplied { update, ticket: Some(merged) })
                    },
                ])]
            },

            SessionAction::SessionRejected { token } => {
                if state.token.as_deref() != Some(token.as_str()) {
                    return smallvec![Effect::None];
                }

                tracing::info!("Session rejected by server, signing out");
                metrics::counter!("session.expired").increment(1);
                state.clear();

                // Announce the expiry only once the cleared snapshot is on disk
                smallvec![Effect::chain(vec![
                    Self::persist(state, env),
                    async_effect! { Some(SessionAction::SessionExpired) },
                ])]
            },

            SessionAction::TicketUpdateApplied { .. } | SessionAction::SessionExpired => {
                smallvec![Effect::None]
            },
        }
    }
}

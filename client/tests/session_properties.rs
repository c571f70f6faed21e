//! Property tests for the session reducer.

#![allow(clippy::unwrap_used)] // Test code can use unwrap

use proptest::prelude::*;
use queuepass_client::mocks::MemoryStorage;
use queuepass_client::session::persistence::{PersistedSession, SnapshotWriter};
use queuepass_client::session::{
    SessionAction, SessionEnvironment, SessionReducer, SessionState, Ticket, TicketStatus,
    TicketUpdate, UserPatch,
};
use queuepass_core::Reducer;
use std::sync::Arc;

#[derive(Debug, Clone)]
enum Call {
    Login { token: String, phone: String },
    Logout,
}

fn arb_call() -> impl Strategy<Value = Call> {
    prop_oneof![
        ("[a-zA-Z0-9.]{1,16}", "\\+7[0-9]{7,10}")
            .prop_map(|(token, phone)| Call::Login { token, phone }),
        Just(Call::Logout),
    ]
}

fn arb_status() -> impl Strategy<Value = TicketStatus> {
    prop_oneof![
        Just(TicketStatus::Waiting),
        Just(TicketStatus::Called),
        Just(TicketStatus::Active),
        Just(TicketStatus::Completed),
        Just(TicketStatus::Cancelled),
    ]
}

fn arb_update() -> impl Strategy<Value = TicketUpdate> {
    (
        proptest::option::of(arb_status()),
        proptest::option::of(0u32..500),
        proptest::option::of(0u32..1000),
    )
        .prop_map(|(status, queue_position, waiting_time)| TicketUpdate {
            status,
            queue_position,
            waiting_time,
            created_at: None,
        })
}

fn arb_ticket() -> impl Strategy<Value = Ticket> {
    (arb_status(), proptest::option::of(0u32..500), proptest::option::of(0u32..1000)).prop_map(
        |(status, queue_position, waiting_time)| Ticket {
            status,
            created_at: "2025-01-01T08:00:00".to_string(),
            queue_position,
            waiting_time,
        },
    )
}

fn environment() -> SessionEnvironment {
    SessionEnvironment::new(SnapshotWriter::new(Arc::new(MemoryStorage::new()), 0))
}

fn reduce(state: &mut SessionState, action: SessionAction, env: &SessionEnvironment) {
    // Snapshot effects are irrelevant to the in-memory state
    drop(SessionReducer.reduce(state, action, env));
}

fn signed_in_with(ticket: Ticket, env: &SessionEnvironment) -> SessionState {
    let mut state = SessionState::default();
    reduce(
        &mut state,
        SessionAction::Login {
            token: "jwt".to_string(),
            user: UserPatch::phone("+77001234567"),
        },
        env,
    );
    reduce(&mut state, SessionAction::SetTicket(Some(ticket)), env);
    state
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Authenticated exactly when the last call was a login.
    #[test]
    fn prop_authenticated_iff_last_call_was_login(calls in prop::collection::vec(arb_call(), 1..24)) {
        let env = environment();
        let mut state = SessionState::default();

        for call in &calls {
            let action = match call.clone() {
                Call::Login { token, phone } => SessionAction::Login { token, user: UserPatch::phone(phone) },
                Call::Logout => SessionAction::Logout,
            };
            reduce(&mut state, action, &env);

            let last_was_login = matches!(call, Call::Login { .. });
            prop_assert_eq!(state.is_authenticated, last_was_login);
            prop_assert_eq!(state.is_authenticated, state.token.is_some() && state.user.is_some());
        }
    }

    /// A revision never goes backwards, and every call bumps it.
    #[test]
    fn prop_revision_strictly_increases(calls in prop::collection::vec(arb_call(), 1..24)) {
        let env = environment();
        let mut state = SessionState::default();
        let mut previous = state.revision;

        for call in calls {
            let action = match call {
                Call::Login { token, phone } => SessionAction::Login { token, user: UserPatch::phone(phone) },
                Call::Logout => SessionAction::Logout,
            };
            reduce(&mut state, action, &env);
            prop_assert!(state.revision > previous);
            previous = state.revision;
        }
    }

    /// Setting then clearing leaves no ticket.
    #[test]
    fn prop_set_then_clear_leaves_no_ticket(ticket in arb_ticket()) {
        let env = environment();
        let mut state = signed_in_with(ticket, &env);

        reduce(&mut state, SessionAction::ClearTicket, &env);
        prop_assert!(state.ticket().is_none());
    }

    /// Fields absent from an update keep their stored values.
    #[test]
    fn prop_merge_preserves_absent_fields(ticket in arb_ticket(), update in arb_update()) {
        let env = environment();
        let mut state = signed_in_with(ticket.clone(), &env);

        reduce(&mut state, SessionAction::TicketUpdateReceived(update.clone()), &env);
        let merged = state.ticket().unwrap();

        prop_assert_eq!(merged.status, update.status.unwrap_or(ticket.status));
        prop_assert_eq!(merged.queue_position, update.queue_position.or(ticket.queue_position));
        prop_assert_eq!(merged.waiting_time, update.waiting_time.or(ticket.waiting_time));
        prop_assert_eq!(&merged.created_at, &ticket.created_at);
    }

    /// A push after the ticket was cleared does not bring it back.
    #[test]
    fn prop_late_push_never_resurrects(ticket in arb_ticket(), update in arb_update()) {
        let env = environment();
        let mut state = signed_in_with(ticket, &env);

        reduce(&mut state, SessionAction::ClearTicket, &env);
        reduce(&mut state, SessionAction::TicketUpdateReceived(update), &env);
        prop_assert!(state.ticket().is_none());
    }

    /// The persisted schema decodes back to the state it was taken from.
    #[test]
    fn prop_snapshot_decodes_to_same_state(calls in prop::collection::vec(arb_call(), 1..8), ticket in arb_ticket()) {
        let env = environment();
        let mut state = SessionState::default();
        for call in calls {
            let action = match call {
                Call::Login { token, phone } => SessionAction::Login { token, user: UserPatch::phone(phone) },
                Call::Logout => SessionAction::Logout,
            };
            reduce(&mut state, action, &env);
        }
        reduce(&mut state, SessionAction::SetTicket(Some(ticket)), &env);

        let raw = PersistedSession::snapshot(&state).encode().unwrap();
        let restored = PersistedSession::decode(&raw).unwrap().into_state();
        prop_assert_eq!(restored, state);
    }
}

//! Integration tests for Store mutation ordering
//!
//! Mutations sent one after another must land in call order, and the effects
//! they trigger must see every earlier mutation.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use queuepass_core::{SmallVec, effect::Effect, reducer::Reducer, smallvec};
use queuepass_runtime::Store;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, Default)]
struct Journal {
    revision: u64,
    entries: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq)]
enum JournalAction {
    Append(u32),
    Persisted(u64),
}

/// Records every snapshot revision the effects observed
#[derive(Clone, Default)]
struct Sink {
    written: Arc<Mutex<Vec<(u64, Vec<u32>)>>>,
}

#[derive(Clone)]
struct JournalReducer;

impl Reducer for JournalReducer {
    type State = Journal;
    type Action = JournalAction;
    type Environment = Sink;

    fn reduce(
        &self,
        state: &mut Journal,
        action: JournalAction,
        env: &Sink,
    ) -> SmallVec<[Effect<JournalAction>; 4]> {
        match action {
            JournalAction::Append(value) => {
                state.entries.push(value);
                state.revision += 1;

                let snapshot = (state.revision, state.entries.clone());
                let sink = env.clone();
                smallvec![Effect::Future(Box::pin(async move {
                    let revision = snapshot.0;
                    sink.written.lock().unwrap().push(snapshot);
                    Some(JournalAction::Persisted(revision))
                }))]
            },
            JournalAction::Persisted(_) => smallvec![Effect::None],
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sequential_sends_apply_in_call_order() {
    queuepass_testing::init_test_tracing();

    let sink = Sink::default();
    let store = Store::new(Journal::default(), JournalReducer, sink.clone());

    for value in 0..50 {
        store.send(JournalAction::Append(value)).await.unwrap();
    }

    let entries = store.state(|s| s.entries.clone()).await;
    assert_eq!(entries, (0..50).collect::<Vec<_>>());
    assert_eq!(store.state(|s| s.revision).await, 50);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn effect_snapshots_include_all_earlier_mutations() {
    let sink = Sink::default();
    let store = Store::new(Journal::default(), JournalReducer, sink.clone());

    let mut handles = Vec::new();
    for value in 0..20 {
        handles.push(store.send(JournalAction::Append(value)).await.unwrap());
    }
    for mut handle in handles {
        tokio::time::timeout(Duration::from_secs(2), handle.wait()).await.unwrap();
    }

    let written = sink.written.lock().unwrap().clone();
    assert_eq!(written.len(), 20);
    for (revision, entries) in written {
        assert_eq!(entries.len() as u64, revision);
    }
}

#[tokio::test]
async fn observers_see_effect_actions() {
    let store = Store::new(Journal::default(), JournalReducer, Sink::default());
    let mut actions = store.subscribe_actions();

    store.send(JournalAction::Append(7)).await.unwrap();

    let observed = tokio::time::timeout(Duration::from_secs(1), actions.recv())
        .await
        .expect("effect action should be broadcast")
        .unwrap();
    assert_eq!(observed, JournalAction::Persisted(1));
}

#[tokio::test]
async fn shutdown_waits_for_running_effects() {
    let store = Store::new(Journal::default(), JournalReducer, Sink::default());
    store.send(JournalAction::Append(1)).await.unwrap();

    store.shutdown(Duration::from_secs(1)).await.unwrap();
    assert!(store.send(JournalAction::Append(2)).await.is_err());
}

//! Integration tests for Store action broadcasting
//!
//! Acknowledgement actions produced by effects are what the store-backed
//! command bus waits on, so concurrent waiters must each see their own.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use relay_core::{SmallVec, effect::Effect, reducer::Reducer, smallvec};
use relay_runtime::StoreConfig;
use relay_runtime::store::Store;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
enum StepAction {
    Start { id: u64 },
    Stepped { id: u64, step: u32 },
    Finished { id: u64 },
}

#[derive(Debug, Default)]
struct StepState {
    started: Vec<u64>,
}

struct StepReducer;

impl Reducer for StepReducer {
    type State = StepState;
    type Action = StepAction;
    type Environment = ();

    fn reduce(
        &self,
        state: &mut StepState,
        action: StepAction,
        _env: &(),
    ) -> SmallVec<[Effect<StepAction>; 4]> {
        match action {
            StepAction::Start { id } => {
                state.started.push(id);
                smallvec![Effect::future(async move { Some(StepAction::Stepped { id, step: 1 }) })]
            },
            StepAction::Stepped { id, step } if step < 3 => {
                smallvec![Effect::future(async move {
                    Some(StepAction::Stepped { id, step: step + 1 })
                })]
            },
            StepAction::Stepped { id, .. } => {
                smallvec![Effect::future(async move { Some(StepAction::Finished { id }) })]
            },
            StepAction::Finished { .. } => SmallVec::new(),
        }
    }
}

fn step_store() -> Store<StepState, StepAction, (), StepReducer> {
    Store::with_config(
        StepState::default(),
        StepReducer,
        (),
        StoreConfig::default().with_broadcast_capacity(1024),
    )
}

#[tokio::test]
async fn waits_through_multi_step_feedback() {
    let store = step_store();

    let result = store
        .send_and_wait_for(
            StepAction::Start { id: 7 },
            |a| matches!(a, StepAction::Finished { id: 7 }),
            Duration::from_secs(1),
        )
        .await
        .unwrap();

    assert_eq!(result, StepAction::Finished { id: 7 });
}

#[tokio::test]
async fn concurrent_waiters_filter_by_id() {
    let store = Arc::new(step_store());

    let tasks: Vec<_> = (0..50u64)
        .map(|id| {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                store
                    .send_and_wait_for(
                        StepAction::Start { id },
                        move |a| matches!(a, StepAction::Finished { id: done } if *done == id),
                        Duration::from_secs(2),
                    )
                    .await
            })
        })
        .collect();

    for (id, task) in (0..50u64).zip(tasks) {
        assert_eq!(task.await.unwrap().unwrap(), StepAction::Finished { id });
    }
    assert_eq!(store.state(|s| s.started.len()).await, 50);
}

#[tokio::test]
async fn observers_see_only_effect_actions() {
    let store = step_store();
    let mut rx = store.subscribe_actions();

    store.send(StepAction::Start { id: 1 }).await.unwrap();

    let mut seen = Vec::new();
    while seen.len() < 4 {
        let action = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        seen.push(action);
    }

    assert_eq!(
        seen,
        vec![
            StepAction::Stepped { id: 1, step: 1 },
            StepAction::Stepped { id: 1, step: 2 },
            StepAction::Stepped { id: 1, step: 3 },
            StepAction::Finished { id: 1 },
        ]
    );
}

#[tokio::test]
async fn shutdown_waits_for_running_effects() {
    let store = step_store();
    store.send(StepAction::Start { id: 1 }).await.unwrap();

    store.shutdown(Duration::from_secs(1)).await.unwrap();
    assert_eq!(store.pending_effects(), 0);
}

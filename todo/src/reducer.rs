//! Reducer for the to-do aggregate.
//!
//! Validates the dispatched command against the user's list, applies the
//! resulting event to state, then publishes the event and acknowledges the
//! dispatch. Refused commands change nothing and are acknowledged with the
//! business error.
//!
//! State changes before the event is published, so a request answered from
//! the event can read its own write. If publishing fails the change stays
//! applied: the dispatch is acknowledged as `Failed` and the caller gets a
//! server error, but queries already see the new state.

use crate::types::{
    MAX_TITLE_LENGTH, TodoAction, TodoCommand, TodoError, TodoEvent, TodoItem, TodoState,
};
use chrono::{DateTime, Utc};
use relay_core::event::{Event as _, SerializedEvent};
use relay_core::event_bus::EventBus;
use relay_core::{SmallVec, effect::Effect, environment::Clock, reducer::Reducer, smallvec};
use relay_runtime::command_bus::DispatchId;
use std::sync::Arc;

/// Environment dependencies for the to-do reducer
#[derive(Clone)]
pub struct TodoEnvironment {
    /// Clock for creation timestamps
    pub clock: Arc<dyn Clock>,
    /// Where events are published
    pub event_bus: Arc<dyn EventBus>,
    /// Topic for to-do events
    pub topic: String,
}

impl TodoEnvironment {
    /// Creates a new `TodoEnvironment`
    #[must_use]
    pub fn new(
        clock: Arc<dyn Clock>,
        event_bus: Arc<dyn EventBus>,
        topic: impl Into<String>,
    ) -> Self {
        Self {
            clock,
            event_bus,
            topic: topic.into(),
        }
    }
}

/// Reducer for the to-do aggregate
#[derive(Clone, Debug, Default)]
pub struct TodoReducer;

impl TodoReducer {
    /// Creates a new `TodoReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn validate_title(title: &str) -> Result<(), TodoError> {
        if title.trim().is_empty() {
            return Err(TodoError::EmptyTitle);
        }
        if title.chars().count() > MAX_TITLE_LENGTH {
            return Err(TodoError::TitleTooLong { max: MAX_TITLE_LENGTH });
        }
        Ok(())
    }

    /// Decide which event a command produces, without touching state
    fn decide(
        state: &TodoState,
        command: TodoCommand,
        now: DateTime<Utc>,
    ) -> Result<TodoEvent, TodoError> {
        match command {
            TodoCommand::CreateItem {
                user_id,
                item_id,
                title,
                completed,
                order,
                tracker,
            } => {
                Self::validate_title(&title)?;
                if state.item(&user_id, &item_id).is_some() {
                    return Err(TodoError::AlreadyExists(item_id));
                }
                Ok(TodoEvent::ItemCreated {
                    user_id,
                    item: TodoItem {
                        id: item_id,
                        title,
                        completed,
                        order,
                        created_at: now,
                    },
                    tracker,
                })
            },

            TodoCommand::UpdateItem {
                user_id,
                item_id,
                title,
                completed,
                order,
                tracker,
            } => {
                let mut item = state
                    .item(&user_id, &item_id)
                    .cloned()
                    .ok_or(TodoError::NotFound(item_id))?;
                if let Some(title) = title {
                    Self::validate_title(&title)?;
                    item.title = title;
                }
                if let Some(completed) = completed {
                    item.completed = completed;
                }
                if order.is_some() {
                    item.order = order;
                }
                Ok(TodoEvent::ItemUpdated { user_id, item, tracker })
            },

            TodoCommand::DeleteItem {
                user_id,
                item_id,
                tracker,
            } => {
                let item = state
                    .item(&user_id, &item_id)
                    .cloned()
                    .ok_or(TodoError::NotFound(item_id))?;
                Ok(TodoEvent::ItemDeleted { user_id, item, tracker })
            },

            TodoCommand::ClearList { user_id, tracker } => Ok(TodoEvent::ListCleared {
                user_id,
                remaining: Vec::new(),
                tracker,
            }),
        }
    }

    /// Applies an event to state
    fn apply_event(state: &mut TodoState, event: &TodoEvent) {
        match event {
            TodoEvent::ItemCreated { user_id, item, .. }
            | TodoEvent::ItemUpdated { user_id, item, .. } => {
                state.list_mut(user_id).upsert(item.clone());
            },
            TodoEvent::ItemDeleted { user_id, item, .. } => {
                state.list_mut(user_id).remove(&item.id);
            },
            TodoEvent::ListCleared { user_id, .. } => state.clear(user_id),
        }
    }

    /// Publish `event`, then acknowledge dispatch `id`
    fn publish(env: &TodoEnvironment, id: DispatchId, event: TodoEvent) -> Effect<TodoAction> {
        let event_bus = Arc::clone(&env.event_bus);
        let topic = env.topic.clone();

        Effect::future(async move {
            let published = match SerializedEvent::from_event(&event) {
                Ok(serialized) => event_bus
                    .publish(&topic, &serialized)
                    .await
                    .map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };

            match published {
                Ok(()) => {
                    tracing::debug!(
                        %id,
                        event_type = event.event_type(),
                        %topic,
                        "Event published"
                    );
                    Some(TodoAction::Accepted { id })
                },
                Err(reason) => {
                    tracing::error!(%id, %reason, %topic, "Failed to publish event");
                    Some(TodoAction::Failed { id, reason })
                },
            }
        })
    }
}

impl Reducer for TodoReducer {
    type State = TodoState;
    type Action = TodoAction;
    type Environment = TodoEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            TodoAction::Dispatch { id, command } => {
                match Self::decide(state, command, env.clock.now()) {
                    Ok(event) => {
                        Self::apply_event(state, &event);
                        smallvec![Self::publish(env, id, event)]
                    },
                    Err(error) => {
                        tracing::debug!(%id, %error, "Command rejected");
                        smallvec![Effect::future(async move {
                            Some(TodoAction::Rejected { id, error })
                        })]
                    },
                }
            },

            // Acknowledgements are for observers only
            TodoAction::Accepted { .. }
            | TodoAction::Rejected { .. }
            | TodoAction::Failed { .. } => SmallVec::new(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::types::{TodoId, UserId};
    use relay_core::correlation::CorrelationToken;
    use relay_core::event_bus::{EventBusError, EventStream};
    use relay_testing::{ReducerTest, assertions, test_clock};
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Mutex;

    /// Bus recording what the reducer publishes
    #[derive(Default)]
    struct CollectingBus {
        fail: bool,
        published: Mutex<Vec<(String, SerializedEvent)>>,
    }

    impl EventBus for CollectingBus {
        fn publish(
            &self,
            topic: &str,
            event: &SerializedEvent,
        ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
            let topic = topic.to_string();
            let event = event.clone();
            Box::pin(async move {
                if self.fail {
                    return Err(EventBusError::PublishFailed {
                        topic,
                        reason: "broker unavailable".to_string(),
                    });
                }
                self.published.lock().unwrap().push((topic, event));
                Ok(())
            })
        }

        fn subscribe(
            &self,
            topics: &[&str],
        ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventBusError>> + Send + '_>> {
            let topics: Vec<String> = topics.iter().map(ToString::to_string).collect();
            Box::pin(async move {
                Err(EventBusError::SubscriptionFailed {
                    topics,
                    reason: "not supported".to_string(),
                })
            })
        }
    }

    fn user() -> UserId {
        UserId::new("1")
    }

    fn environment(bus: Arc<CollectingBus>) -> TodoEnvironment {
        TodoEnvironment::new(Arc::new(test_clock()), bus, "todo-events")
    }

    fn create(item_id: TodoId, title: &str, tracker: Option<CorrelationToken>) -> TodoAction {
        TodoAction::Dispatch {
            id: DispatchId::new(),
            command: TodoCommand::CreateItem {
                user_id: user(),
                item_id,
                title: title.to_string(),
                completed: false,
                order: None,
                tracker,
            },
        }
    }

    fn dispatch(command: TodoCommand) -> (DispatchId, TodoAction) {
        let id = DispatchId::new();
        (id, TodoAction::Dispatch { id, command })
    }

    #[tokio::test]
    async fn create_publishes_tracked_event_and_accepts() {
        let bus = Arc::new(CollectingBus::default());
        let item_id = TodoId::new();
        let token = CorrelationToken::mint();
        let (id, action) = dispatch(TodoCommand::CreateItem {
            user_id: user(),
            item_id,
            title: "Buy milk".to_string(),
            completed: false,
            order: Some(1),
            tracker: Some(token),
        });

        ReducerTest::new(TodoReducer::new())
            .with_env(environment(Arc::clone(&bus)))
            .given_state(TodoState::new())
            .when_action(action)
            .then_state(move |state| {
                let item = state.item(&user(), &item_id).unwrap();
                assert_eq!(item.title, "Buy milk");
                assert!(!item.completed);
            })
            .then_effects(|effects| assertions::assert_effects_count(effects, 1))
            .then_feedback(move |actions| {
                assert!(matches!(actions, [TodoAction::Accepted { id: ack }] if *ack == id));
            })
            .run_async()
            .await;

        let published = bus.published.lock().unwrap();
        let (topic, event) = &published[0];
        assert_eq!(topic, "todo-events");
        assert_eq!(event.event_type, "ItemCreated.v1");
        assert_eq!(event.correlation_token, Some(token));
        match event.decode::<TodoEvent>().unwrap() {
            TodoEvent::ItemCreated { item, .. } => {
                assert_eq!(item.id, item_id);
                assert_eq!(item.created_at, test_clock().now());
            },
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn blank_title_is_rejected_without_state_change() {
        let bus = Arc::new(CollectingBus::default());

        ReducerTest::new(TodoReducer::new())
            .with_env(environment(Arc::clone(&bus)))
            .given_state(TodoState::new())
            .when_action(create(TodoId::new(), "   ", None))
            .then_state(|state| assert!(state.items(&user()).is_empty()))
            .then_feedback(|actions| {
                assert!(matches!(
                    actions,
                    [TodoAction::Rejected {
                        error: TodoError::EmptyTitle,
                        ..
                    }]
                ));
            })
            .run_async()
            .await;

        assert!(bus.published.lock().unwrap().is_empty());
    }

    #[test]
    fn overlong_title_is_rejected() {
        let title = "x".repeat(MAX_TITLE_LENGTH + 1);
        let state = TodoState::new();
        let command = TodoCommand::CreateItem {
            user_id: user(),
            item_id: TodoId::new(),
            title,
            completed: false,
            order: None,
            tracker: None,
        };

        assert_eq!(
            TodoReducer::decide(&state, command, test_clock().now()),
            Err(TodoError::TitleTooLong { max: MAX_TITLE_LENGTH })
        );
    }

    #[test]
    fn duplicate_id_is_a_conflict() {
        let item_id = TodoId::new();
        ReducerTest::new(TodoReducer::new())
            .with_env(environment(Arc::new(CollectingBus::default())))
            .given_state(TodoState::new())
            .given_actions([create(item_id, "first", None)])
            .when_action(create(item_id, "second", None))
            .then_state(move |state| {
                assert_eq!(state.item(&user(), &item_id).unwrap().title, "first");
            })
            .then_effects(assertions::assert_has_future_effect)
            .run();
    }

    #[tokio::test]
    async fn update_keeps_absent_fields() {
        let item_id = TodoId::new();
        let (_, update) = dispatch(TodoCommand::UpdateItem {
            user_id: user(),
            item_id,
            title: None,
            completed: Some(true),
            order: None,
            tracker: None,
        });

        ReducerTest::new(TodoReducer::new())
            .with_env(environment(Arc::new(CollectingBus::default())))
            .given_state(TodoState::new())
            .given_actions([create(item_id, "Buy milk", None)])
            .when_action(update)
            .then_state(move |state| {
                let item = state.item(&user(), &item_id).unwrap();
                assert_eq!(item.title, "Buy milk");
                assert!(item.completed);
            })
            .then_feedback(|actions| assert!(matches!(actions, [TodoAction::Accepted { .. }])))
            .run_async()
            .await;
    }

    #[tokio::test]
    async fn unknown_item_cannot_be_deleted() {
        let item_id = TodoId::new();
        let (_, delete) = dispatch(TodoCommand::DeleteItem {
            user_id: user(),
            item_id,
            tracker: None,
        });

        ReducerTest::new(TodoReducer::new())
            .with_env(environment(Arc::new(CollectingBus::default())))
            .given_state(TodoState::new())
            .when_action(delete)
            .then_feedback(move |actions| {
                assert!(matches!(
                    actions,
                    [TodoAction::Rejected {
                        error: TodoError::NotFound(missing),
                        ..
                    }] if *missing == item_id
                ));
            })
            .run_async()
            .await;
    }

    #[tokio::test]
    async fn clear_empties_the_list_and_reports_nothing_left() {
        let bus = Arc::new(CollectingBus::default());
        let (_, clear) = dispatch(TodoCommand::ClearList {
            user_id: user(),
            tracker: Some(CorrelationToken::mint()),
        });

        ReducerTest::new(TodoReducer::new())
            .with_env(environment(Arc::clone(&bus)))
            .given_state(TodoState::new())
            .given_actions([create(TodoId::new(), "a", None), create(TodoId::new(), "b", None)])
            .when_action(clear)
            .then_state(|state| assert!(state.items(&user()).is_empty()))
            .run_async()
            .await;

        let published = bus.published.lock().unwrap();
        let cleared = published
            .iter()
            .map(|(_, event)| event.decode::<TodoEvent>().unwrap())
            .find(|event| matches!(event, TodoEvent::ListCleared { .. }))
            .unwrap();
        assert!(matches!(
            cleared,
            TodoEvent::ListCleared { remaining, .. } if remaining.is_empty()
        ));
    }

    #[tokio::test]
    async fn publish_failure_is_acknowledged_as_failed_and_keeps_the_change() {
        let bus = Arc::new(CollectingBus {
            fail: true,
            ..CollectingBus::default()
        });
        let item_id = TodoId::new();

        ReducerTest::new(TodoReducer::new())
            .with_env(environment(bus))
            .given_state(TodoState::new())
            .when_action(create(item_id, "Buy milk", None))
            .then_state(move |state| assert!(state.item(&user(), &item_id).is_some()))
            .then_feedback(|actions| {
                assert!(matches!(
                    actions,
                    [TodoAction::Failed { reason, .. }] if reason.contains("broker unavailable")
                ));
            })
            .run_async()
            .await;
    }

    #[test]
    fn acknowledgements_have_no_effects() {
        ReducerTest::new(TodoReducer::new())
            .with_env(environment(Arc::new(CollectingBus::default())))
            .given_state(TodoState::new())
            .when_action(TodoAction::Accepted { id: DispatchId::new() })
            .then_effects(assertions::assert_no_effects)
            .run();
    }
}

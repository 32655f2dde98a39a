//! Wiring of the to-do pipeline.
//!
//! ```text
//! HTTP handler ──▶ RequestCoordinator ──▶ TodoStore (aggregate)
//!      ▲                                        │ publish
//!      │ resolve                                ▼
//! TodoCompletionTracker ◀── CompletionListener ◀── InMemoryEventBus
//! ```

use crate::config::Config;
use crate::query::TodoStore;
use crate::reducer::{TodoEnvironment, TodoReducer};
use crate::server::{AppState, TodoBus};
use crate::tracker::TodoCompletionTracker;
use crate::types::TodoState;
use relay_core::environment::Clock;
use relay_core::event_bus::{EventBus, EventBusError};
use relay_runtime::error::StoreError;
use relay_runtime::metrics::PrometheusMetrics;
use relay_runtime::{CompletionListener, InMemoryEventBus, StoreConfig};
use std::sync::Arc;
use std::time::Duration;

/// Actions buffered for observers of the store (acknowledgement waiters).
const ACTION_BROADCAST_CAPACITY: usize = 4096;

/// The running aggregate, event bus and completion listener.
pub struct Pipeline {
    /// Aggregate store
    pub store: Arc<TodoStore>,
    /// Bus the aggregate publishes to
    pub event_bus: Arc<InMemoryEventBus>,
    /// Pending tables for waiting requests
    pub tracker: Arc<TodoCompletionTracker>,
    listener: CompletionListener,
}

impl Pipeline {
    /// Start the pipeline.
    ///
    /// The completion listener is subscribed before this returns, so every
    /// event the store publishes afterwards reaches the tracker.
    ///
    /// # Errors
    ///
    /// Returns the bus error if the listener cannot subscribe.
    pub async fn start(config: &Config, clock: Arc<dyn Clock>) -> Result<Self, EventBusError> {
        let event_bus = Arc::new(InMemoryEventBus::with_capacity(config.events.capacity));
        let tracker = Arc::new(TodoCompletionTracker::new());

        let events: Arc<dyn EventBus> = event_bus.clone();

        let listener = CompletionListener::spawn(
            Arc::clone(&events),
            &[config.events.topic.as_str()],
            Arc::clone(&tracker),
        )
        .await?;

        let environment = TodoEnvironment::new(clock, events, config.events.topic.clone());
        let store = Arc::new(TodoStore::with_config(
            TodoState::new(),
            TodoReducer::new(),
            environment,
            StoreConfig::default().with_broadcast_capacity(ACTION_BROADCAST_CAPACITY),
        ));

        tracing::info!(topic = %config.events.topic, "To-do pipeline started");

        Ok(Self {
            store,
            event_bus,
            tracker,
            listener,
        })
    }

    /// Application state whose coordinator dispatches to the store.
    #[must_use]
    pub fn app_state(&self, config: &Config, metrics: Option<PrometheusMetrics>) -> AppState {
        let commands: Arc<TodoBus> = self.store.clone();
        AppState::new(Arc::clone(&self.store), commands, Arc::clone(&self.tracker), config)
            .with_metrics(metrics)
    }

    /// Whether the completion listener is still consuming.
    #[must_use]
    pub fn is_listening(&self) -> bool {
        self.listener.is_running()
    }

    /// Drain in-flight effects, then stop the completion listener.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownTimeout`] if effects were still running
    /// after `timeout`. The listener is stopped either way.
    pub async fn shutdown(self, timeout: Duration) -> Result<(), StoreError> {
        let drained = self.store.shutdown(timeout).await;
        self.listener.shutdown().await;
        drained
    }
}

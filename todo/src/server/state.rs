//! Application state for the to-do HTTP server.

use crate::config::Config;
use crate::query::{TodoQueryService, TodoStore};
use crate::tracker::TodoCompletionTracker;
use crate::types::{TodoCommand, TodoError, UserId};
use crate::view::TodoViewFactory;
use relay_runtime::metrics::PrometheusMetrics;
use relay_runtime::{CommandBus, HealthReport, RequestCoordinator};
use std::sync::Arc;

/// Command bus accepting to-do commands.
pub type TodoBus = dyn CommandBus<Command = TodoCommand, Rejection = TodoError>;

/// Application state shared across all HTTP handlers.
///
/// Cloned for each request; every field is cheap to clone.
#[derive(Clone)]
pub struct AppState {
    /// Dispatches tracked commands and waits for their events
    pub coordinator: RequestCoordinator<TodoBus>,
    /// Pending tables resolved by the completion listener
    pub tracker: Arc<TodoCompletionTracker>,
    /// Read side
    pub queries: TodoQueryService,
    /// JSON views
    pub views: TodoViewFactory,
    /// User whose list this server manages
    pub user_id: UserId,
    /// Prometheus handle, when metrics are enabled
    pub metrics: Option<PrometheusMetrics>,
}

impl AppState {
    /// Create the application state.
    ///
    /// `commands` is usually the store itself; tests substitute a scripted bus.
    #[must_use]
    pub fn new(
        store: Arc<TodoStore>,
        commands: Arc<TodoBus>,
        tracker: Arc<TodoCompletionTracker>,
        config: &Config,
    ) -> Self {
        Self {
            coordinator: RequestCoordinator::new(commands, config.coordinator_config()),
            tracker,
            queries: TodoQueryService::new(store),
            views: TodoViewFactory::new(config.server.public_url.clone()),
            user_id: UserId::new(config.server.user_id.clone()),
            metrics: None,
        }
    }

    /// Attach the Prometheus handle served on `/metrics`.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Option<PrometheusMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Readiness of the store and the pending tables.
    #[must_use]
    pub fn health_report(&self) -> HealthReport {
        let mut checks = vec![self.queries.health()];
        checks.extend(self.tracker.health());
        HealthReport::new(checks)
    }
}

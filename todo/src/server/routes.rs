//! Router configuration for the to-do service.

use super::handlers::{clear_todos, create_todo, delete_todo, get_todo, list_todos, update_todo};
use super::health::{health_check, metrics, readiness_check};
use super::state::AppState;
use axum::{Router, routing::get};
use relay_web::cors_layer;
use tower_http::trace::TraceLayer;

/// Build the complete Axum router.
///
/// ```text
/// GET    /todos         list
/// POST   /todos         create        201
/// DELETE /todos         clear all
/// GET    /todos/:id     show
/// PATCH  /todos/:id     update
/// DELETE /todos/:id     delete        {}
/// GET    /health        liveness
/// GET    /health/ready  readiness
/// GET    /metrics       Prometheus
/// ```
#[must_use]
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/todos", get(list_todos).post(create_todo).delete(clear_todos))
        .route("/todos/:id", get(get_todo).patch(update_todo).delete(delete_todo))
        .route("/health", get(health_check))
        .route("/health/ready", get(readiness_check))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer())
        .with_state(state)
}

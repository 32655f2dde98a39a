//! Axum integration for Relay services.
//!
//! The HTTP shell around a Relay pipeline: handlers turn requests into
//! coordinated commands or queries, and this crate supplies the pieces
//! every such service shares.
//!
//! - [`AppError`]: status + code + message, with conversions from
//!   coordinator failures
//! - [`middleware::cors_layer`]: CORS policy for browser clients
//! - [`handlers::health`]: liveness and readiness endpoints
//!
//! # Example
//!
//! ```ignore
//! use relay_web::{AppError, middleware::cors_layer};
//!
//! async fn create_todo(
//!     State(state): State<AppState>,
//!     Json(request): Json<CreateTodoRequest>,
//! ) -> Result<(StatusCode, Json<TodoView>), AppError> {
//!     let item = state
//!         .coordinator
//!         .execute(state.tracker.items(), DispatchMode::AwaitAcceptance, |tracker| command(tracker))
//!         .await?;
//!     Ok((StatusCode::CREATED, Json(state.views.item(&item))))
//! }
//!
//! let app = Router::new()
//!     .route("/todos", post(create_todo))
//!     .layer(cors_layer())
//!     .with_state(app_state);
//! ```

#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod handlers;
pub mod middleware;

pub use error::AppError;
pub use middleware::cors_layer;

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;

//! HTTP server for the to-do service.
//!
//! - Application state shared by handlers
//! - `/todos` CRUD handlers
//! - Health and metrics endpoints
//! - Router configuration

pub mod handlers;
pub mod health;
pub mod routes;
pub mod state;

pub use routes::build_router;
pub use state::{AppState, TodoBus};

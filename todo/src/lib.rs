//! # To-do service
//!
//! A TodoMVC backend on a command/event pipeline. Writes are commands to a
//! to-do aggregate; the HTTP response is produced only once the event the
//! command caused has come back through the event bus, matched to the
//! request by its correlation token.
//!
//! - [`types`]: items, commands, events, business errors
//! - [`reducer`]: the aggregate
//! - [`tracker`]: pending tables and event routing
//! - [`query`], [`view`]: read side and JSON shapes
//! - [`config`], [`bootstrap`], [`server`]: running it

pub mod bootstrap;
pub mod config;
pub mod query;
pub mod reducer;
pub mod server;
pub mod tracker;
pub mod types;
pub mod view;

pub use bootstrap::Pipeline;
pub use config::Config;
pub use types::{TodoAction, TodoCommand, TodoError, TodoEvent, TodoId, TodoItem, TodoState, UserId};

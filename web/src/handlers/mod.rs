//! HTTP request handlers shared by Relay services.

pub mod health;

pub use health::{health_check, readiness};

//! Cross-cutting layers for Relay routers.
//!
//! ```ignore
//! let app = Router::new()
//!     .route("/todos", get(list_todos))
//!     .layer(cors_layer());
//! ```

use http::{Method, header};
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};

/// How long browsers may cache a preflight answer.
pub const CORS_MAX_AGE: Duration = Duration::from_secs(3600);

/// CORS policy for browser clients such as TodoMVC front ends.
///
/// Any origin; methods `OPTIONS, GET, POST, PATCH, DELETE`; request header
/// `Content-Type`; preflight cached for an hour.
#[must_use]
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::OPTIONS, Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE])
        .max_age(CORS_MAX_AGE)
}

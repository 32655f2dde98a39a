//! Health check endpoints.
//!
//! Liveness answers as long as the process serves HTTP. Readiness renders a
//! [`HealthReport`] assembled by the service from its components.

use axum::{Json, http::StatusCode};
use relay_runtime::{HealthReport, HealthStatus};

/// Liveness check.
///
/// ```text
/// GET /health  →  200 "ok"
/// ```
#[allow(clippy::unused_async)]
pub async fn health_check() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

/// Render a readiness report.
///
/// - 200 OK: Healthy or Degraded
/// - 503 Service Unavailable: Unhealthy
#[must_use]
pub fn readiness(report: HealthReport) -> (StatusCode, Json<HealthReport>) {
    let status = match report.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status, Json(report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_runtime::HealthCheck;

    #[tokio::test]
    async fn liveness_is_ok() {
        let (status, body) = health_check().await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");
    }

    #[test]
    fn degraded_is_still_ready() {
        let report = HealthReport::new(vec![
            HealthCheck::healthy("store"),
            HealthCheck::degraded("pending.items", "many in flight"),
        ]);
        let (status, Json(report)) = readiness(report);
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report.status, HealthStatus::Degraded);
    }

    #[test]
    fn unhealthy_component_fails_readiness() {
        let report =
            HealthReport::new(vec![HealthCheck::unhealthy("store", "Store is shutting down")]);
        let (status, _) = readiness(report);
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }
}

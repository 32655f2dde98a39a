//! Prometheus metrics exporter.
//!
//! Installs the global `metrics` recorder and renders the text exposition
//! format on demand, typically from a `/metrics` HTTP route.
//!
//! Metrics recorded by the runtime:
//! - `correlation.*`: registrations, resolutions, orphans, timeouts, waits
//! - `store.*`: reducer and effect execution
//! - `event_bus.*`: publishes
//!
//! # Example
//!
//! ```rust,no_run
//! use relay_runtime::metrics::PrometheusMetrics;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let metrics = PrometheusMetrics::install()?;
//! println!("{}", metrics.render());
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use thiserror::Error;

/// Errors from metrics setup.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Handle to the installed Prometheus recorder.
#[derive(Clone)]
pub struct PrometheusMetrics {
    handle: PrometheusHandle,
}

impl std::fmt::Debug for PrometheusMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrometheusMetrics").finish_non_exhaustive()
    }
}

impl PrometheusMetrics {
    /// Describe all metrics and install the global recorder.
    ///
    /// # Errors
    ///
    /// Returns `MetricsError::Install` if a recorder is already installed.
    pub fn install() -> Result<Self, MetricsError> {
        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("seconds".to_string()),
                &[0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        let handle = builder
            .install_recorder()
            .map_err(|e| MetricsError::Install(e.to_string()))?;

        register_metrics();
        tracing::info!("Prometheus metrics recorder installed");

        Ok(Self { handle })
    }

    /// Render current metrics in Prometheus text format.
    #[must_use]
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

fn register_metrics() {
    // Correlation
    describe_counter!("correlation.registered", "Tokens registered in a pending table");
    describe_counter!("correlation.resolved", "Pending entries resolved by a completion event");
    describe_counter!("correlation.orphaned", "Completions that found no pending entry");
    describe_counter!("correlation.timeouts", "Requests that gave up waiting for completion");
    describe_counter!("correlation.rejected", "Commands rejected by the aggregate");
    describe_counter!("correlation.dispatch_failures", "Commands that could not be dispatched");
    describe_histogram!("correlation.wait_seconds", "Time from dispatch to completion");
    describe_counter!("correlation.listener.lagged", "Events the completion listener skipped");
    describe_counter!(
        "correlation.listener.decode_errors",
        "Events the completion listener could not decode"
    );

    // Store
    describe_counter!("store.commands.total", "Actions sent to a store");
    describe_counter!("store.effects.executed", "Effects executed, by type");
    describe_histogram!("store.reducer.duration_seconds", "Reducer execution time");
    describe_histogram!("store.effects.count", "Effects returned per reduction");
    describe_counter!("store.shutdown.rejected_actions", "Actions refused during shutdown");

    // Event bus
    describe_counter!("event_bus.published", "Events published, by topic");
}

//! Configuration management for the to-do service.
//!
//! Loads configuration from environment variables with sensible defaults.
//! Missing or unparsable values fall back to the default.

use relay_runtime::CoordinatorConfig;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server configuration
    pub server: ServerConfig,
    /// Request/completion deadlines
    pub correlation: CorrelationConfig,
    /// Event bus configuration
    pub events: EventsConfig,
    /// Metrics configuration
    pub metrics: MetricsConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
    /// Base URL used in item links
    pub public_url: String,
    /// User whose list the API serves
    pub user_id: String,
    /// Default log filter (trace, debug, info, warn, error)
    pub log_level: String,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout: u64,
}

/// Deadlines for coordinated requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationConfig {
    /// How long the aggregate may take to accept a command, in milliseconds
    pub command_timeout_ms: u64,
    /// How long to wait for the completion event, in milliseconds
    pub completion_timeout_ms: u64,
}

/// Event bus configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Topic for to-do events
    pub topic: String,
    /// Events buffered per topic
    pub capacity: usize,
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Install the Prometheus recorder and serve `/metrics`
    pub enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl Config {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let string = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        Self {
            server: ServerConfig {
                host: string("TODO_HOST", "0.0.0.0"),
                port: parsed(&lookup, "TODO_PORT").unwrap_or(8080),
                public_url: string("TODO_PUBLIC_URL", "http://localhost:8080"),
                user_id: string("TODO_USER_ID", "1"),
                log_level: string("TODO_LOG_LEVEL", "info"),
                shutdown_timeout: parsed(&lookup, "TODO_SHUTDOWN_TIMEOUT_SECS").unwrap_or(10),
            },
            correlation: CorrelationConfig {
                command_timeout_ms: parsed(&lookup, "TODO_COMMAND_TIMEOUT_MS").unwrap_or(1000),
                completion_timeout_ms: parsed(&lookup, "TODO_COMPLETION_TIMEOUT_MS")
                    .unwrap_or(1000),
            },
            events: EventsConfig {
                topic: string("TODO_EVENT_TOPIC", "todo-events"),
                capacity: parsed(&lookup, "TODO_EVENT_BUS_CAPACITY").unwrap_or(1024),
            },
            metrics: MetricsConfig {
                enabled: parsed(&lookup, "TODO_METRICS_ENABLED").unwrap_or(false),
            },
        }
    }

    /// Address the HTTP server binds to.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Budget for draining in-flight work on shutdown.
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout)
    }

    /// Deadlines for the request coordinator.
    #[must_use]
    pub const fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            command_timeout: Duration::from_millis(self.correlation.command_timeout_ms),
            completion_timeout: Duration::from_millis(self.correlation.completion_timeout_ms),
        }
    }
}

fn parsed<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let value = lookup(key)?;
    let parsed = value.trim().parse().ok();
    if parsed.is_none() {
        tracing::warn!(key, %value, "Ignoring invalid configuration value, using default");
    }
    parsed
}

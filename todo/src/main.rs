//! To-do HTTP server.

use relay_core::environment::SystemClock;
use relay_runtime::metrics::PrometheusMetrics;
use std::sync::Arc;
use todo::{Config, Pipeline, server::build_router};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env();

    let default_filter = format!(
        "todo={0},relay_runtime={0},tower_http=info",
        config.server.log_level
    );
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        address = %config.bind_addr(),
        public_url = %config.server.public_url,
        user_id = %config.server.user_id,
        topic = %config.events.topic,
        "Starting to-do server"
    );

    let metrics = if config.metrics.enabled {
        Some(PrometheusMetrics::install()?)
    } else {
        None
    };

    let pipeline = Pipeline::start(&config, Arc::new(SystemClock)).await?;
    let app = build_router(pipeline.app_state(&config, metrics));

    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    info!("Server listening on {}", config.bind_addr());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("HTTP server stopped, draining pipeline");
    if let Err(e) = pipeline.shutdown(config.shutdown_timeout()).await {
        error!(error = %e, "Pipeline did not drain in time");
    }

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            },
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal, shutting down gracefully...");
        },
        () = terminate => {
            info!("Received SIGTERM signal, shutting down gracefully...");
        },
    }
}

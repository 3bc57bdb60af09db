use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod api;
pub mod config;
pub mod pipeline;
pub mod repository;
pub mod service;

use config::Config;
use service::{CapabilitiesService, Coordinator, StandardCapabilitiesService};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "conduit_engine=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::parse();
    config.validate().context("Invalid configuration")?;

    tracing::info!("Starting Conduit Engine...");
    tracing::info!(
        "Pipeline executable: {} {}",
        config.executable,
        config.executable_args.join(" ")
    );

    let capabilities = StandardCapabilitiesService::new(&config)
        .discover()
        .context("Failed to discover pipeline capabilities")?;

    let coordinator = Arc::new(Coordinator::new(&config, capabilities));
    tracing::info!(
        "Default pipeline delay: {:?}",
        coordinator.default_delay()
    );

    // Build router with all API endpoints
    let app = api::create_router(coordinator.clone());

    tracing::info!("Listening on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server stopped, killing remaining pipelines");
    coordinator.shutdown().await;
    tracing::info!("Shutdown complete");

    Ok(())
}

/// Resolves on Ctrl+C, or on SIGTERM on Unix
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }
}

//! Fast Image Filters Service
//!
//! Loads every configured filter checkpoint at startup and serves the demo
//! page and REST API (Axum). Any checkpoint failure aborts startup.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use fast_image_filters::api::{create_rest_router, AppState};
use fast_image_filters::config::Config;
use fast_image_filters::engine::{init_runtime, ModelRegistry};
use fast_image_filters::service::FilterService;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    info!("Starting Fast Image Filters v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config_path = std::env::args().nth(1);
    let config = Config::resolve(config_path.as_deref())?;

    info!("Configuration loaded:");
    info!("  Port: {}", config.server.port);
    info!("  Device: {}", config.inference.device);
    info!("  Probe size: {}", config.inference.probe_size);
    info!("  Filters: {}", config.filters.len());

    init_runtime(config.inference.runtime_library.as_deref())
        .context("failed to load ONNX Runtime")?;

    // Load every checkpoint before accepting requests
    let registry = Arc::new(
        ModelRegistry::load(&config.inference, &config.filters)
            .context("failed to load filter checkpoints")?,
    );

    let service = Arc::new(FilterService::new(registry));

    let app_state = Arc::new(AppState {
        service,
        title: config.server.title.clone(),
        description: config.server.description.clone(),
        start_time: Instant::now(),
    });

    let router = create_rest_router(app_state);

    let addr = format!("0.0.0.0:{}", config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;

    info!("Fast Image Filters is ready!");
    info!("Demo: http://localhost:{}/", config.server.port);
    info!("REST: http://localhost:{}/health", config.server.port);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Goodbye!");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown signal received, cleaning up...");
}

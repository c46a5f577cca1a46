//! DoorGuardian Engine - device supervision daemon
//!
//! Runs one engine for the configured camera and serves the HTTP façade.

use doorguard_engine::{state::AppConfig, web_api, AppState, StreamSupervisor};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "doorguard_engine=debug,doorguard=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting DoorGuardian Engine v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = AppConfig::from_env()?;
    tracing::info!(
        device = %config.engine.device_address,
        probe_interval_ms = config.engine.probe_interval_ms,
        refresh_interval_ms = config.engine.refresh_interval_ms,
        max_forced_restarts = config.engine.max_forced_restarts,
        "Configuration loaded"
    );

    // Engine
    let supervisor = Arc::new(StreamSupervisor::with_http(config.engine.clone())?);
    supervisor.start();

    let state = AppState::new(supervisor.clone());

    // Build router
    let app = web_api::create_router(state)
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    supervisor.stop();
    tracing::info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

//! TPMS Control - tire pressure controller client
//!
//! Polls a TPMS controller on the local network and exposes its readings
//! and adjustment commands over a small HTTP API.

use tpms_control::{api, bus, config, device::DeviceSession};

use anyhow::Result;
use std::net::SocketAddr;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tpms_control=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(
        "Starting TPMS Control v{} ({})",
        env!("TPMS_VERSION"),
        env!("TPMS_GIT_SHA")
    );

    // Load configuration
    let config = config::load_config()?;
    tracing::info!(
        "Configuration loaded, port: {}, poll interval: {}ms",
        config.port,
        config.device.poll_interval_ms
    );

    // Create event bus
    let bus = bus::create_bus();
    tracing::info!("Event bus initialized");

    // Device session, connected straight away if an address is configured
    let session = DeviceSession::new(bus.clone(), config.device.session_config());
    match config.device.startup_address() {
        Some(address) => {
            session.connect(address).await;
        }
        None => tracing::info!("No device address configured, waiting for /session/connect"),
    }

    let state = api::AppState::new(session.clone(), bus.clone());
    let app = api::build_router(state);

    // Start server with graceful shutdown
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Cleanup: stop polling
    tracing::info!("Shutting down device session...");
    session.disconnect().await;
    tracing::info!("Shutdown complete");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down..."),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down..."),
    }
}

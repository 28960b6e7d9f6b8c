//! learnif. web server - HTTP surface for the dispatch service.
//!
//! Exposes the scheduler-facing newsletter trigger plus the
//! subscribe/verify/unsubscribe endpoints used by the site.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use tokio::{net::TcpListener, signal};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use learnif::web::{dispatch_newsletter, health, subscribe, unsubscribe, verify};
use learnif::{AppState, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("web_server_starting");

    // Load configuration
    let config = Config::from_env();
    info!(
        port = config.port,
        sheet_configured = config.sheet_id.is_some(),
        folder_configured = config.drive_folder_id.is_some(),
        auth_configured = config.dispatch_auth_token.is_some(),
        "config_loaded"
    );

    let port = config.port;
    let state = AppState::new(config);

    // Build the router
    let app = Router::new()
        .route("/health", get(health))
        .route("/api/newsletter", post(dispatch_newsletter))
        .route("/api/subscribe", post(subscribe))
        .route("/api/verify", get(verify))
        .route("/api/unsubscribe", get(unsubscribe))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Bind to address
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "web_server_listening");

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("web_server_shutdown_complete");

    Ok(())
}

/// Create a future that completes when a shutdown signal is received.
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
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }

    info!("web_server_shutting_down");
}

//! zurg-edge - WebDAV rewriting proxy for Zurg
//!
//! This is the main entry point for the proxy service.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::http::HeaderName;
use tokio::signal;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use zurg_edge::api::create_router;
use zurg_edge::config::AppConfig;
use zurg_edge::logging::init_logging;
use zurg_edge::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = AppConfig::load()?;

    // Initialize logging
    init_logging(&config.log_level, config.log_file.as_deref())?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting zurg-edge"
    );

    // Initialize metrics system
    if let Some(addr) = zurg_edge::metrics::init_metrics(&config.metrics)? {
        info!(%addr, "Prometheus exporter listening");
    }

    let state = Arc::new(AppState::new(config.clone())?);

    match &state.upstream {
        Some(upstream) => info!(upstream = %upstream.base_url(), "Forwarding to upstream"),
        None => warn!("No upstream URL configured; every request will fail with 500"),
    }
    if config.auth.credentials().is_some() {
        info!("Basic auth enabled");
    }

    // Build the router with all routes and middleware
    let x_request_id = HeaderName::from_static("x-request-id");
    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
        .layer(PropagateRequestIdLayer::new(x_request_id));

    // Bind to address
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!(%addr, "Listening on");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Start server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("zurg-edge stopped");
    Ok(())
}

/// Handle shutdown signals gracefully
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

//! Telemetry Service
//!
//! Access-controlled gRPC service with call log and statistics streams.
//!
//! # Servers
//!
//! - gRPC server for `telemetry.Biz` and `telemetry.Admin` (default: 0.0.0.0:8082)
//! - HTTP server for health endpoints and metrics (default: 0.0.0.0:8083)
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment (ACL is required)
//! 2. Initialize Prometheus metrics recorder
//! 3. Start health HTTP server (liveness, readiness, metrics)
//! 4. Start gRPC server
//! 5. Wait for shutdown signal
//!
//! # Shutdown Flow
//!
//! 1. Mark not ready
//! 2. Cancel all subscribers and wait for their tasks
//! 3. Stop the gRPC listener
//! 4. Stop the health server

#![warn(clippy::pedantic)]

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use telemetry_service::config::Config;
use telemetry_service::observability::{health_router, init_metrics_recorder, HealthState};
use telemetry_service::TelemetryServer;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "telemetry_service=debug,telemetry=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Telemetry Service");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    let mut consumers: Vec<&str> = config.acl.consumers().collect();
    consumers.sort_unstable();
    info!(
        acl_consumers = config.acl.len(),
        consumers = ?consumers,
        groups = config.groups.len(),
        grpc_bind_address = %config.grpc_bind_address,
        health_bind_address = %config.health_bind_address,
        subscriber_buffer = config.subscriber_buffer,
        max_stat_interval_seconds = config.max_stat_interval_seconds,
        "Configuration loaded successfully"
    );

    // Must happen before any metrics are recorded
    let prometheus_handle = init_metrics_recorder().map_err(|e| {
        error!(error = %e, "Failed to initialize metrics");
        e
    })?;

    let health_state = Arc::new(HealthState::new());
    let shutdown_token = CancellationToken::new();

    // Start health HTTP server
    let health_addr: SocketAddr = config.health_bind_address.parse().map_err(|e| {
        error!(error = %e, addr = %config.health_bind_address, "Invalid health bind address");
        format!("Invalid health bind address: {e}")
    })?;

    let metrics_router = Router::new().route(
        "/metrics",
        axum::routing::get(move || {
            let handle = prometheus_handle.clone();
            async move { handle.render() }
        }),
    );
    let app = health_router(Arc::clone(&health_state))
        .merge(metrics_router)
        .layer(TraceLayer::new_for_http());

    // Bind before spawning to fail fast on bind errors
    let listener = tokio::net::TcpListener::bind(health_addr)
        .await
        .map_err(|e| {
            error!(error = %e, addr = %health_addr, "Failed to bind health server");
            format!("Failed to bind health server to {health_addr}: {e}")
        })?;

    let health_shutdown_token = shutdown_token.child_token();
    let health_task = tokio::spawn(async move {
        info!(addr = %health_addr, "Health server starting");
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            health_shutdown_token.cancelled().await;
            info!("Health server shutting down");
        });
        if let Err(e) = server.await {
            error!(error = %e, "Health server failed");
        }
    });

    // Start gRPC server
    let server = TelemetryServer::new(config).start().await?;
    health_state.set_ready();
    info!(addr = %server.local_addr(), "Telemetry Service running - press Ctrl+C to shutdown");

    shutdown_signal().await;

    info!("Shutdown signal received, initiating graceful shutdown...");

    // Mark as not ready immediately so load balancers stop sending traffic
    health_state.set_not_ready();

    if let Err(e) = server.shutdown().await {
        error!(error = %e, "gRPC server exited with error");
    }

    shutdown_token.cancel();
    if let Err(e) = health_task.await {
        error!(error = %e, "Health server task failed");
    }

    info!("Telemetry Service shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
///
/// # Panics
///
/// Panics if signal handlers cannot be installed. Without them the service
/// cannot shut down gracefully.
async fn shutdown_signal() {
    let ctrl_c = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

//! Health endpoints for the telemetry service.
//!
//! - `GET /health` - liveness (process is running)
//! - `GET /ready` - readiness (gRPC server is accepting calls)
//!
//! `/metrics` is merged in by `main.rs` from the Prometheus handle.

use axum::{extract::State, http::StatusCode, routing::get, Router};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Liveness and readiness flags.
///
/// `ready` flips to true once the gRPC listener is bound and back to false
/// as soon as shutdown starts, before subscribers are drained.
#[derive(Debug)]
pub struct HealthState {
    live: AtomicBool,
    ready: AtomicBool,
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthState {
    /// Create a new health state (live=true, ready=false).
    #[must_use]
    pub fn new() -> Self {
        Self {
            live: AtomicBool::new(true),
            ready: AtomicBool::new(false),
        }
    }

    pub fn set_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    pub fn set_not_ready(&self) {
        self.ready.store(false, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

/// Create the health router with liveness and readiness endpoints.
pub fn health_router(health_state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/health", get(liveness_handler))
        .route("/ready", get(readiness_handler))
        .with_state(health_state)
}

async fn liveness_handler(State(state): State<Arc<HealthState>>) -> StatusCode {
    if state.is_live() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn readiness_handler(State(state): State<Arc<HealthState>>) -> StatusCode {
    if state.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;
use taskgate_core::heartbeat::WorkerStatus;

use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Overall service status.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    /// Whether the broker answered the heartbeat read.
    pub broker_healthy: bool,
    /// Registered workers and their liveness.
    pub workers: Vec<WorkerStatus>,
}

/// GET /health -- returns service, broker and worker health.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let (broker_healthy, workers) = match state.workers.statuses().await {
        Ok(workers) => (true, workers),
        Err(e) => {
            tracing::warn!(error = %e, "Health check could not reach the broker");
            (false, Vec::new())
        }
    };

    let status = if broker_healthy { "ok" } else { "degraded" };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        broker_healthy,
        workers,
    })
}

/// Mount health check routes (intended for root-level, NOT under `/api`).
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

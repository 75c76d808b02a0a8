use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Overall service status.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    /// Jobs currently holding a worker slot.
    pub running_jobs: usize,
    /// Jobs waiting for a slot.
    pub queued_jobs: usize,
    /// Jobs known to the store, finished ones included until they expire.
    pub tracked_jobs: usize,
}

/// GET /health -- liveness.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        running_jobs: state.jobs.running(),
        queued_jobs: state.jobs.queued(),
        tracked_jobs: state.jobs.store().len(),
    })
}

/// Mount health check routes (intended for root-level, NOT under `/api`).
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

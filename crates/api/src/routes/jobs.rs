//! Route definitions for the `/jobs` resource.

use axum::routing::{delete, get, post};
use axum::Router;

use crate::handlers::jobs;
use crate::state::AppState;

/// Routes mounted at `/jobs`.
///
/// ```text
/// GET    /{id}                    -> get_job
/// POST   /{id}/cancel             -> cancel_job
/// GET    /{id}/download           -> download_job
/// GET    /{id}/previews/{index}   -> get_preview
/// DELETE /{id}/previews           -> clear_previews
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{id}", get(jobs::get_job))
        .route("/{id}/cancel", post(jobs::cancel_job))
        .route("/{id}/download", get(jobs::download_job))
        .route("/{id}/previews", delete(jobs::clear_previews))
        .route("/{id}/previews/{index}", get(jobs::get_preview))
}

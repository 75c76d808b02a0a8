pub mod config;
pub mod health;
pub mod jobs;

use axum::extract::DefaultBodyLimit;
use axum::routing::post;
use axum::Router;

use crate::config::JobLimits;
use crate::handlers;
use crate::state::AppState;

/// Build the `/api` route tree.
///
/// ```text
/// POST   /process                      submit a batch (multipart)
/// GET    /config/schema                processing configuration schema
/// GET    /jobs/{id}                    job status
/// POST   /jobs/{id}/cancel             cancel
/// GET    /jobs/{id}/download           result bundle (zip)
/// GET    /jobs/{id}/previews/{index}   preview image
/// DELETE /jobs/{id}/previews           clear preview outputs
/// ```
pub fn api_routes(limits: &JobLimits) -> Router<AppState> {
    Router::new()
        .route(
            "/process",
            post(handlers::process::submit)
                .layer(DefaultBodyLimit::max(limits.max_request_bytes)),
        )
        .nest("/config", config::router())
        .nest("/jobs", jobs::router())
}

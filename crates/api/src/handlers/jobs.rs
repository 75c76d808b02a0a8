//! Handlers for the `/jobs` resource.
//!
//! Ids that do not parse are reported exactly like ids that were never
//! issued.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use semi_core::error::CoreError;
use semi_core::types::JobId;

use crate::engine::packager::LeasedStream;
use crate::engine::JobView;
use crate::error::{AppError, AppResult};
use crate::response::{accepted, Accepted, DataResponse};
use crate::state::AppState;

fn parse_id(raw: &str) -> AppResult<JobId> {
    raw.parse()
        .map_err(|_| AppError::Core(CoreError::job_not_found(raw)))
}

/// GET /api/jobs/{id}
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<DataResponse<JobView>>> {
    let view = state.jobs.status(parse_id(&id)?)?;
    Ok(Json(DataResponse { data: view }))
}

/// POST /api/jobs/{id}/cancel
///
/// Queued jobs are cancelled at once; running jobs stop after the input in
/// flight. Returns 409 for jobs that already finished.
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Accepted<JobView>> {
    let view = state.jobs.cancel(parse_id(&id)?)?;
    Ok(accepted(view))
}

/// GET /api/jobs/{id}/download
///
/// Streams the result bundle. The job cannot be reaped while the body is
/// being sent. Honours `If-None-Match` against the bundle's ETag.
pub async fn download_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> AppResult<Response> {
    let download = state.jobs.open_download(parse_id(&id)?).await?;
    let etag = download.artifact.etag();

    let not_modified = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.split(',').any(|tag| tag.trim() == etag));
    if not_modified {
        return Ok((StatusCode::NOT_MODIFIED, [(header::ETAG, etag)]).into_response());
    }

    let headers = [
        (header::CONTENT_TYPE, "application/zip".to_string()),
        (header::CONTENT_LENGTH, download.artifact.len.to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"semi_web_{}.zip\"", download.job_id),
        ),
        (header::ETAG, etag),
        (header::CACHE_CONTROL, "no-cache".to_string()),
    ];
    let body = Body::from_stream(LeasedStream::new(download.file, download.lease));

    Ok((StatusCode::OK, headers, body).into_response())
}

/// GET /api/jobs/{id}/previews/{index}
pub async fn get_preview(
    State(state): State<AppState>,
    Path((id, index)): Path<(String, usize)>,
) -> AppResult<Response> {
    let path = state.jobs.preview_output(parse_id(&id)?, index)?;

    let data = tokio::fs::read(&path).await.map_err(|e| {
        tracing::debug!(path = %path.display(), error = %e, "Preview file unavailable");
        AppError::Core(CoreError::NotFound {
            entity: "Preview",
            id: format!("{id}/{index}"),
        })
    })?;

    let content_type = match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("png") => "image/png",
        _ => "image/jpeg",
    };

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, "no-store"),
        ],
        data,
    )
        .into_response())
}

/// DELETE /api/jobs/{id}/previews
pub async fn clear_previews(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    state.jobs.clear_previews(parse_id(&id)?).await?;
    Ok(StatusCode::NO_CONTENT)
}

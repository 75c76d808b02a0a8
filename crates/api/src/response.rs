//! `{ "data": ... }` envelope shared by every JSON handler.

use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct DataResponse<T: Serialize> {
    pub data: T,
}

/// `202 Accepted` with an enveloped body, for requests whose effect completes
/// asynchronously (submission, cancellation).
pub type Accepted<T> = (StatusCode, Json<DataResponse<T>>);

pub fn accepted<T: Serialize>(data: T) -> Accepted<T> {
    (StatusCode::ACCEPTED, Json(DataResponse { data }))
}

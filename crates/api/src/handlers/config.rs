//! Handler for the processing configuration schema.

use axum::extract::State;
use axum::Json;
use semi_core::config_schema::ConfigSchema;

use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/config/schema
///
/// Defaults, groups, enums and visibility rules of the engine's
/// configuration, for rendering the submission form.
pub async fn get_schema(State(state): State<AppState>) -> Json<DataResponse<ConfigSchema>> {
    Json(DataResponse {
        data: state.jobs.config_schema(),
    })
}

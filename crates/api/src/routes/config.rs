use axum::routing::get;
use axum::Router;

use crate::handlers::config;
use crate::state::AppState;

/// Routes mounted at `/config`.
///
/// ```text
/// GET    /schema    -> get_schema
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/schema", get(config::get_schema))
}

use crate::engine::JobManager;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable: [`JobManager`] is a handle over shared state.
#[derive(Clone)]
pub struct AppState {
    /// Job store, admission queue and processing engine.
    pub jobs: JobManager,
}

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::workflows;
use crate::state::AppState;

/// Workflow routes mounted at `/workflows`.
///
/// ```text
/// POST /                         -> start_workflow
/// GET  /{id}                     -> get_workflow
/// POST /{id}/selection           -> select_option
/// POST /{id}/production/retry    -> retry_production
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(workflows::start_workflow))
        .route("/{id}", get(workflows::get_workflow))
        .route("/{id}/selection", post(workflows::select_option))
        .route("/{id}/production/retry", post(workflows::retry_production))
}

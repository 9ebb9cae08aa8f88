pub mod health;
pub mod workflows;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /workflows                              start (POST)
/// /workflows/{id}                         status (GET)
/// /workflows/{id}/selection               select option (POST)
/// /workflows/{id}/production/retry        operator re-run (POST)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new().nest("/workflows", workflows::router())
}

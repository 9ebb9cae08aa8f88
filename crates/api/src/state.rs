use std::sync::Arc;

use launchpad_db::Store;
use launchpad_pipeline::Orchestrator;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheap to clone; everything inside is behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Orchestrator,
    /// Same store the orchestrator writes to, used for health checks.
    pub store: Arc<dyn Store>,
    pub config: Arc<ServerConfig>,
}

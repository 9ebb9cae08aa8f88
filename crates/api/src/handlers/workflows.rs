//! Handlers for the workflow pipeline: intake, status, selection and
//! operator re-run.

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use launchpad_core::intake::Intake;
use launchpad_core::status::WorkflowState;
use launchpad_core::types::DbId;
use launchpad_db::models::selection::SourceMetadata;
use launchpad_pipeline::SelectionRequest;
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct WorkflowCreated {
    pub workflow_id: DbId,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SelectionBody {
    #[serde(alias = "chosenOption")]
    pub chosen_option: i32,
}

#[derive(Debug, Serialize)]
pub struct SelectionAccepted {
    pub acknowledged: bool,
    pub workflow_id: DbId,
    pub chosen_option: i32,
    pub state: WorkflowState,
}

#[derive(Debug, Serialize)]
pub struct RerunAccepted {
    pub workflow_id: DbId,
    pub state: WorkflowState,
}

/// POST /api/v1/workflows
///
/// Validate the intake and start a workflow. Returns 202 immediately;
/// mockups are generated in the background.
pub async fn start_workflow(
    State(state): State<AppState>,
    payload: Result<Json<Intake>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(intake) = payload?;
    let workflow_id = state.orchestrator.start_workflow(intake).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(DataResponse {
            data: WorkflowCreated { workflow_id },
        }),
    ))
}

/// GET /api/v1/workflows/{id}
pub async fn get_workflow(
    State(state): State<AppState>,
    path: Result<Path<DbId>, PathRejection>,
) -> AppResult<impl IntoResponse> {
    let Path(id) = path?;
    let view = state.orchestrator.get_status(id).await?;
    Ok(Json(DataResponse { data: view }))
}

/// POST /api/v1/workflows/{id}/selection
///
/// Record the client's choice. Responds 404 both for unknown workflows and
/// for workflows that are not awaiting a selection.
pub async fn select_option(
    State(state): State<AppState>,
    path: Result<Path<DbId>, PathRejection>,
    headers: HeaderMap,
    payload: Result<Json<SelectionBody>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Path(id) = path?;
    let Json(body) = payload?;
    let ack = state
        .orchestrator
        .handle_selection(SelectionRequest {
            workflow_id: id,
            chosen_option: body.chosen_option,
            source: source_metadata(&headers),
        })
        .await?;

    Ok(Json(DataResponse {
        data: SelectionAccepted {
            acknowledged: true,
            workflow_id: ack.workflow_id,
            chosen_option: ack.chosen_option,
            state: ack.state,
        },
    }))
}

/// POST /api/v1/workflows/{id}/production/retry
///
/// Re-run a failed production deploy. Returns 202; the deploy runs in
/// the background.
pub async fn retry_production(
    State(state): State<AppState>,
    path: Result<Path<DbId>, PathRejection>,
) -> AppResult<impl IntoResponse> {
    let Path(id) = path?;
    state.orchestrator.retry_production(id).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(DataResponse {
            data: RerunAccepted {
                workflow_id: id,
                state: WorkflowState::Production,
            },
        }),
    ))
}

/// Client address and user agent as reported by the request headers.
fn source_metadata(headers: &HeaderMap) -> SourceMetadata {
    let header_str = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    let ip = header_str("x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .or_else(|| header_str("x-real-ip"))
        .map(str::to_string);
    let user_agent = header_str(header::USER_AGENT.as_str()).map(str::to_string);
    let device = user_agent.as_deref().map(|ua| {
        if ua.contains("Mobile") || ua.contains("Android") {
            "mobile".to_string()
        } else {
            "desktop".to_string()
        }
    });

    SourceMetadata {
        ip,
        user_agent,
        device,
    }
}

//! Repository for the `workflows` table.

use launchpad_core::intake::Intake;
use launchpad_core::status::{StatusId, WorkflowState};
use launchpad_core::types::{new_id, DbId, Timestamp};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};

use crate::error::StoreError;
use crate::models::workflow::{NewWorkflow, Workflow, WorkflowPatch};

/// Column list for `workflows` queries.
const COLUMNS: &str = "\
    id, state_id, intake, proposal_id, selected_option, production_url, \
    error_message, created_at, updated_at, expires_at";

/// Raw `workflows` row.
#[derive(Debug, FromRow)]
pub struct WorkflowRow {
    pub id: DbId,
    pub state_id: StatusId,
    pub intake: Json<Intake>,
    pub proposal_id: Option<DbId>,
    pub selected_option: Option<i32>,
    pub production_url: Option<String>,
    pub error_message: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub expires_at: Timestamp,
}

impl TryFrom<WorkflowRow> for Workflow {
    type Error = StoreError;

    fn try_from(row: WorkflowRow) -> Result<Self, Self::Error> {
        let state = WorkflowState::from_id(row.state_id).map_err(|e| StoreError::Corrupt {
            kind: "workflow",
            id: row.id,
            message: e.to_string(),
        })?;
        Ok(Workflow {
            id: row.id,
            state,
            intake: row.intake.0,
            proposal_id: row.proposal_id,
            selected_option: row.selected_option,
            production_url: row.production_url,
            error_message: row.error_message,
            created_at: row.created_at,
            updated_at: row.updated_at,
            expires_at: row.expires_at,
        })
    }
}

/// Provides CRUD and compare-and-set operations for workflows.
pub struct WorkflowRepo;

impl WorkflowRepo {
    /// Insert a new workflow in `PENDING`.
    pub async fn create(pool: &PgPool, input: &NewWorkflow) -> Result<WorkflowRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO workflows (id, state_id, intake, expires_at) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, WorkflowRow>(&query)
            .bind(new_id())
            .bind(WorkflowState::Pending.id())
            .bind(Json(&input.intake))
            .bind(input.expires_at)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<WorkflowRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM workflows WHERE id = $1");
        sqlx::query_as::<_, WorkflowRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Conditionally move a workflow to `next` and apply `patch`.
    ///
    /// Returns `None` when no row with `id` is in state `expected`.
    pub async fn compare_and_set(
        pool: &PgPool,
        id: DbId,
        expected: WorkflowState,
        next: WorkflowState,
        patch: &WorkflowPatch,
    ) -> Result<Option<WorkflowRow>, sqlx::Error> {
        let query = format!(
            "UPDATE workflows SET \
                state_id = $3, \
                proposal_id = COALESCE($4, proposal_id), \
                selected_option = COALESCE($5, selected_option), \
                production_url = COALESCE($6, production_url), \
                error_message = CASE WHEN $7 THEN $8 ELSE COALESCE($8, error_message) END, \
                updated_at = NOW() \
             WHERE id = $1 AND state_id = $2 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, WorkflowRow>(&query)
            .bind(id)
            .bind(expected.id())
            .bind(next.id())
            .bind(patch.proposal_id)
            .bind(patch.selected_option)
            .bind(&patch.production_url)
            .bind(patch.clear_error)
            .bind(&patch.error_message)
            .fetch_optional(pool)
            .await
    }

    /// Current state id, used to explain a lost compare-and-set.
    pub async fn current_state(pool: &PgPool, id: DbId) -> Result<Option<StatusId>, sqlx::Error> {
        sqlx::query_scalar::<_, StatusId>("SELECT state_id FROM workflows WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }
}

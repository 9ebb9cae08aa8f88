//! Repository for the `deployment_jobs` table.

use launchpad_core::status::{DeploymentState, StatusId};
use launchpad_core::types::{new_id, DbId, Timestamp};
use sqlx::{FromRow, PgPool};

use crate::error::StoreError;
use crate::models::deployment::{DeploymentJob, DeploymentPatch, NewDeployment};

/// Column list for `deployment_jobs` queries.
const COLUMNS: &str = "\
    id, workflow_id, option_index, state_id, provider_site_id, provider_deploy_id, \
    archive_sha256, archive_bytes, result_url, error_message, attempts, \
    created_at, updated_at";

/// Raw `deployment_jobs` row.
#[derive(Debug, FromRow)]
pub struct DeploymentRow {
    pub id: DbId,
    pub workflow_id: DbId,
    pub option_index: Option<i32>,
    pub state_id: StatusId,
    pub provider_site_id: Option<String>,
    pub provider_deploy_id: Option<String>,
    pub archive_sha256: Option<String>,
    pub archive_bytes: Option<i64>,
    pub result_url: Option<String>,
    pub error_message: Option<String>,
    pub attempts: i32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl TryFrom<DeploymentRow> for DeploymentJob {
    type Error = StoreError;

    fn try_from(row: DeploymentRow) -> Result<Self, Self::Error> {
        let state = DeploymentState::from_id(row.state_id).map_err(|e| StoreError::Corrupt {
            kind: "deployment job",
            id: row.id,
            message: e.to_string(),
        })?;
        Ok(DeploymentJob {
            id: row.id,
            workflow_id: row.workflow_id,
            option_index: row.option_index,
            state,
            provider_site_id: row.provider_site_id,
            provider_deploy_id: row.provider_deploy_id,
            archive_sha256: row.archive_sha256,
            archive_bytes: row.archive_bytes,
            result_url: row.result_url,
            error_message: row.error_message,
            attempts: row.attempts,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Provides create/update/lookup for deployment jobs.
pub struct DeploymentRepo;

impl DeploymentRepo {
    /// Insert a new job in `CREATED`.
    pub async fn create(
        pool: &PgPool,
        input: &NewDeployment,
    ) -> Result<DeploymentRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO deployment_jobs (id, workflow_id, option_index, state_id) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, DeploymentRow>(&query)
            .bind(new_id())
            .bind(input.workflow_id)
            .bind(input.option_index)
            .bind(DeploymentState::Created.id())
            .fetch_one(pool)
            .await
    }

    /// Apply a partial update. Returns `None` if no row with `id` exists.
    pub async fn update(
        pool: &PgPool,
        id: DbId,
        patch: &DeploymentPatch,
    ) -> Result<Option<DeploymentRow>, sqlx::Error> {
        let query = format!(
            "UPDATE deployment_jobs SET \
                state_id = COALESCE($2, state_id), \
                provider_site_id = COALESCE($3, provider_site_id), \
                provider_deploy_id = COALESCE($4, provider_deploy_id), \
                archive_sha256 = COALESCE($5, archive_sha256), \
                archive_bytes = COALESCE($6, archive_bytes), \
                result_url = COALESCE($7, result_url), \
                error_message = COALESCE($8, error_message), \
                attempts = COALESCE($9, attempts), \
                updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, DeploymentRow>(&query)
            .bind(id)
            .bind(patch.state.map(DeploymentState::id))
            .bind(&patch.provider_site_id)
            .bind(&patch.provider_deploy_id)
            .bind(&patch.archive_sha256)
            .bind(patch.archive_bytes)
            .bind(&patch.result_url)
            .bind(&patch.error_message)
            .bind(patch.attempts)
            .fetch_optional(pool)
            .await
    }

    /// Most recent job for a workflow. Ids are time-ordered (UUIDv7), so
    /// they break ties between jobs created in the same instant.
    pub async fn latest_for_workflow(
        pool: &PgPool,
        workflow_id: DbId,
    ) -> Result<Option<DeploymentRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM deployment_jobs \
             WHERE workflow_id = $1 \
             ORDER BY created_at DESC, id DESC \
             LIMIT 1"
        );
        sqlx::query_as::<_, DeploymentRow>(&query)
            .bind(workflow_id)
            .fetch_optional(pool)
            .await
    }
}

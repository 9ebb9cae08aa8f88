//! Repository for the `proposals` table.

use launchpad_core::status::{ProposalStatus, StatusId};
use launchpad_core::types::{new_id, DbId, Timestamp};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};

use crate::error::StoreError;
use crate::models::proposal::{NewProposal, Proposal, ProposalOption, ProposalPatch};

/// Column list for `proposals` queries.
const COLUMNS: &str = "\
    id, workflow_id, status_id, options, selected_option, sent_at, \
    created_at, updated_at";

/// Raw `proposals` row.
#[derive(Debug, FromRow)]
pub struct ProposalRow {
    pub id: DbId,
    pub workflow_id: DbId,
    pub status_id: StatusId,
    pub options: Json<Vec<ProposalOption>>,
    pub selected_option: Option<i32>,
    pub sent_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl TryFrom<ProposalRow> for Proposal {
    type Error = StoreError;

    fn try_from(row: ProposalRow) -> Result<Self, Self::Error> {
        let status = ProposalStatus::from_id(row.status_id).map_err(|e| StoreError::Corrupt {
            kind: "proposal",
            id: row.id,
            message: e.to_string(),
        })?;
        Ok(Proposal {
            id: row.id,
            workflow_id: row.workflow_id,
            status,
            options: row.options.0,
            selected_option: row.selected_option,
            sent_at: row.sent_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Provides CRUD and compare-and-set operations for proposals.
pub struct ProposalRepo;

impl ProposalRepo {
    /// Insert a new proposal in `PENDING`.
    pub async fn create(pool: &PgPool, input: &NewProposal) -> Result<ProposalRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO proposals (id, workflow_id, status_id, options) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ProposalRow>(&query)
            .bind(new_id())
            .bind(input.workflow_id)
            .bind(ProposalStatus::Pending.id())
            .bind(Json(&input.options))
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<ProposalRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM proposals WHERE id = $1");
        sqlx::query_as::<_, ProposalRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Conditionally move a proposal to `next` and apply `patch`.
    ///
    /// Returns `None` when no row with `id` has status `expected`.
    pub async fn compare_and_set(
        pool: &PgPool,
        id: DbId,
        expected: ProposalStatus,
        next: ProposalStatus,
        patch: &ProposalPatch,
    ) -> Result<Option<ProposalRow>, sqlx::Error> {
        let query = format!(
            "UPDATE proposals SET \
                status_id = $3, \
                options = COALESCE($4, options), \
                selected_option = COALESCE($5, selected_option), \
                sent_at = COALESCE($6, sent_at), \
                updated_at = NOW() \
             WHERE id = $1 AND status_id = $2 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ProposalRow>(&query)
            .bind(id)
            .bind(expected.id())
            .bind(next.id())
            .bind(patch.options.as_ref().map(Json))
            .bind(patch.selected_option)
            .bind(patch.sent_at)
            .fetch_optional(pool)
            .await
    }

    pub async fn current_status(pool: &PgPool, id: DbId) -> Result<Option<StatusId>, sqlx::Error> {
        sqlx::query_scalar::<_, StatusId>("SELECT status_id FROM proposals WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }
}

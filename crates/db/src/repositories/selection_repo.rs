//! Repository for `selection_events`, plus the transactional accept path.

use launchpad_core::status::{ProposalStatus, StatusId, WorkflowState};
use launchpad_core::types::{DbId, Timestamp};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};

use crate::models::selection::{SelectionEvent, SourceMetadata};

/// Raw `selection_events` row.
#[derive(Debug, FromRow)]
pub struct SelectionRow {
    pub workflow_id: DbId,
    pub chosen_option: i32,
    pub received_at: Timestamp,
    pub source: Json<SourceMetadata>,
}

impl From<SelectionRow> for SelectionEvent {
    fn from(row: SelectionRow) -> Self {
        SelectionEvent {
            workflow_id: row.workflow_id,
            chosen_option: row.chosen_option,
            received_at: row.received_at,
            source: row.source.0,
        }
    }
}

/// Which step of [`SelectionRepo::accept`] decided the outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionOutcome {
    Accepted,
    /// The workflow was not in `AWAITING_SELECTION`.
    WorkflowNotAwaiting,
    /// The proposal no longer accepts a selection.
    ProposalNotOpen,
    /// A selection event already exists for this workflow.
    Duplicate,
}

pub struct SelectionRepo;

impl SelectionRepo {
    pub async fn find(
        pool: &PgPool,
        workflow_id: DbId,
    ) -> Result<Option<SelectionRow>, sqlx::Error> {
        sqlx::query_as::<_, SelectionRow>(
            "SELECT workflow_id, chosen_option, received_at, source \
             FROM selection_events WHERE workflow_id = $1",
        )
        .bind(workflow_id)
        .fetch_optional(pool)
        .await
    }

    /// Accept a selection in a single transaction.
    ///
    /// Any step that matches zero rows rolls the whole transaction back.
    pub async fn accept(
        pool: &PgPool,
        event: &SelectionEvent,
        proposal_id: DbId,
    ) -> Result<SelectionOutcome, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let workflow = sqlx::query(
            "UPDATE workflows SET state_id = $3, selected_option = $4, updated_at = NOW() \
             WHERE id = $1 AND state_id = $2",
        )
        .bind(event.workflow_id)
        .bind(WorkflowState::AwaitingSelection.id())
        .bind(WorkflowState::Selected.id())
        .bind(event.chosen_option)
        .execute(&mut *tx)
        .await?;
        if workflow.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(SelectionOutcome::WorkflowNotAwaiting);
        }

        let open: Vec<StatusId> = [
            ProposalStatus::Generated,
            ProposalStatus::Partial,
            ProposalStatus::Sent,
        ]
        .into_iter()
        .map(ProposalStatus::id)
        .collect();
        let proposal = sqlx::query(
            "UPDATE proposals SET status_id = $4, selected_option = $5, updated_at = NOW() \
             WHERE id = $1 AND workflow_id = $2 AND status_id = ANY($3)",
        )
        .bind(proposal_id)
        .bind(event.workflow_id)
        .bind(&open)
        .bind(ProposalStatus::Selected.id())
        .bind(event.chosen_option)
        .execute(&mut *tx)
        .await?;
        if proposal.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(SelectionOutcome::ProposalNotOpen);
        }

        let inserted = sqlx::query(
            "INSERT INTO selection_events (workflow_id, chosen_option, received_at, source) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (workflow_id) DO NOTHING",
        )
        .bind(event.workflow_id)
        .bind(event.chosen_option)
        .bind(event.received_at)
        .bind(Json(&event.source))
        .execute(&mut *tx)
        .await?;
        if inserted.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(SelectionOutcome::Duplicate);
        }

        tx.commit().await?;
        Ok(SelectionOutcome::Accepted)
    }
}

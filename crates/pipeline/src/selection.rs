//! Selection Handler: validate and record a client's choice exactly once.

use std::sync::Arc;

use chrono::Utc;
use launchpad_core::status::WorkflowState;
use launchpad_core::types::DbId;
use launchpad_db::models::selection::{SelectionEvent, SourceMetadata};
use launchpad_db::{Store, StoreError};
use launchpad_hosting::RetryPolicy;
use serde::Serialize;

use crate::error::PipelineError;
use crate::store_retry::StoreRetry;

#[derive(Debug, Clone)]
pub struct SelectionRequest {
    pub workflow_id: DbId,
    /// 1-based option index.
    pub chosen_option: i32,
    pub source: SourceMetadata,
}

/// Returned once the selection is durably recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectionAck {
    pub workflow_id: DbId,
    pub chosen_option: i32,
    pub state: WorkflowState,
}

pub struct SelectionHandler {
    store: Arc<dyn Store>,
    store_retry: StoreRetry,
    enforce_expiry: bool,
}

impl SelectionHandler {
    pub fn new(store: Arc<dyn Store>, store_retry: RetryPolicy, enforce_expiry: bool) -> Self {
        Self {
            store,
            store_retry: StoreRetry::new(store_retry),
            enforce_expiry,
        }
    }

    /// Validate `request` and commit it with one atomic store call.
    ///
    /// A missing workflow and one that is not awaiting selection both fail
    /// with [`PipelineError::InvalidState`]. Of two concurrent calls, the
    /// one that loses the store's compare-and-set gets the same error.
    pub async fn handle(&self, request: SelectionRequest) -> Result<SelectionAck, PipelineError> {
        let workflow_id = request.workflow_id;

        let workflow = self
            .store
            .get_workflow(workflow_id)
            .await?
            .filter(|w| w.state == WorkflowState::AwaitingSelection)
            .ok_or(PipelineError::InvalidState)?;
        if self.enforce_expiry && Utc::now() >= workflow.expires_at {
            tracing::info!(%workflow_id, expires_at = %workflow.expires_at, "Selection after expiry rejected");
            return Err(PipelineError::InvalidState);
        }

        let proposal_id = workflow.proposal_id.ok_or(PipelineError::InvalidState)?;
        let proposal = self
            .store
            .get_proposal(proposal_id)
            .await?
            .filter(|p| p.status.accepts_selection())
            .ok_or(PipelineError::InvalidState)?;

        let option_count = proposal.options.len();
        let option = proposal.option(request.chosen_option).ok_or_else(|| {
            PipelineError::Validation(format!(
                "chosen_option must be between 1 and {option_count}"
            ))
        })?;
        if !option.is_ready() {
            return Err(PipelineError::Validation(format!(
                "Option {} has no preview and cannot be selected",
                option.index
            )));
        }

        let event = SelectionEvent {
            workflow_id,
            chosen_option: request.chosen_option,
            received_at: Utc::now(),
            source: request.source,
        };
        // After a timed-out commit, a recorded event with the same choice
        // means this request is the one that landed.
        let store = &self.store;
        let chosen = request.chosen_option;
        let accepted = self
            .store_retry
            .compare_and_set(
                "accept_selection",
                || store.accept_selection(event.clone(), proposal_id),
                || async move {
                    let recorded = store.get_selection(workflow_id).await?;
                    Ok(recorded.filter(|e| e.chosen_option == chosen).map(|_| ()))
                },
            )
            .await;
        match accepted {
            Ok(()) => {}
            Err(e) if e.is_conflict() || matches!(e, StoreError::NotFound { .. }) => {
                tracing::info!(%workflow_id, error = %e, "Selection lost to a concurrent write");
                return Err(PipelineError::InvalidState);
            }
            Err(e) => return Err(e.into()),
        }

        tracing::info!(%workflow_id, chosen_option = request.chosen_option, "Selection accepted");
        Ok(SelectionAck {
            workflow_id,
            chosen_option: request.chosen_option,
            state: WorkflowState::Selected,
        })
    }
}

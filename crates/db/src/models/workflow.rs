//! Workflow record: one end-to-end run from intake to published site.

use launchpad_core::intake::Intake;
use launchpad_core::status::WorkflowState;
use launchpad_core::types::{DbId, Timestamp};
use serde::Serialize;

/// A row from the `workflows` table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Workflow {
    pub id: DbId,
    pub state: WorkflowState,
    pub intake: Intake,
    pub proposal_id: Option<DbId>,
    /// 1-based index into the proposal's options once a choice is accepted.
    pub selected_option: Option<i32>,
    pub production_url: Option<String>,
    /// Retained for operator inspection once the workflow is `FAILED`.
    pub error_message: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub expires_at: Timestamp,
}

/// DTO for creating a workflow in `PENDING`.
#[derive(Debug, Clone)]
pub struct NewWorkflow {
    pub intake: Intake,
    pub expires_at: Timestamp,
}

/// Columns written together with a workflow state change.
///
/// `None` leaves the stored value untouched; `clear_error` resets
/// `error_message` when an operator re-runs a failed workflow.
#[derive(Debug, Clone, Default)]
pub struct WorkflowPatch {
    pub proposal_id: Option<DbId>,
    pub selected_option: Option<i32>,
    pub production_url: Option<String>,
    pub error_message: Option<String>,
    pub clear_error: bool,
}

impl WorkflowPatch {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error_message: Some(message.into()),
            ..Self::default()
        }
    }

    /// Apply the patch to an in-memory record.
    pub fn apply_to(self, workflow: &mut Workflow) {
        if let Some(id) = self.proposal_id {
            workflow.proposal_id = Some(id);
        }
        if let Some(option) = self.selected_option {
            workflow.selected_option = Some(option);
        }
        if let Some(url) = self.production_url {
            workflow.production_url = Some(url);
        }
        if self.clear_error {
            workflow.error_message = None;
        }
        if let Some(message) = self.error_message {
            workflow.error_message = Some(message);
        }
    }
}

use launchpad_core::error::CoreError;
use launchpad_core::types::DbId;
use launchpad_db::StoreError;

use crate::deploy::JobError;
use crate::proposal::ProposalError;

/// Errors returned by the orchestrator's public operations.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Bad input shape or an out-of-range option. Never retried.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The workflow does not exist or is not in a state that accepts the
    /// request. The two cases are deliberately indistinguishable.
    #[error("Workflow not found or already selected")]
    InvalidState,

    #[error("Workflow {0} not found")]
    NotFound(DbId),

    /// A concurrent writer moved the workflow first.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Proposal(#[from] ProposalError),

    /// Mockups settled, but not well enough to offer to the client.
    #[error("Proposal rejected: {0}")]
    ProposalRejected(String),

    #[error("Production deploy failed: {0}")]
    Deploy(#[from] JobError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<CoreError> for PipelineError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(msg) => Self::Validation(msg),
            CoreError::NotFound { id, .. } => Self::NotFound(id),
            CoreError::Conflict(msg) => Self::Conflict(msg),
            CoreError::Internal(msg) => Self::Internal(msg),
        }
    }
}

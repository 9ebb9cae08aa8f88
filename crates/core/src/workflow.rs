//! Workflow transition graph and the client-facing derived state.
//!
//! ```text
//! PENDING -> MOCKUPS_READY -> AWAITING_SELECTION -> SELECTED -> PRODUCTION -> COMPLETED
//!    \            \                  \                 \            \
//!     +------------+------------------+-----------------+------------+--> FAILED
//!
//! FAILED -> PRODUCTION   (operator re-run, only once a selection exists)
//! ```

use chrono::Duration;
use serde::Serialize;

use crate::error::CoreError;
use crate::status::WorkflowState;
use crate::types::Timestamp;

/// Default time a client has to pick an option (7 days).
pub const DEFAULT_WORKFLOW_TTL_HOURS: i64 = 7 * 24;

impl WorkflowState {
    /// Whether the graph has an edge from `self` to `next`.
    pub fn can_transition_to(self, next: WorkflowState) -> bool {
        use WorkflowState::*;
        match (self, next) {
            (Pending, MockupsReady)
            | (MockupsReady, AwaitingSelection)
            | (AwaitingSelection, Selected)
            | (Selected, Production)
            | (Production, Completed)
            | (Failed, Production) => true,
            (Completed | Failed, Failed) => false,
            (_, Failed) => true,
            _ => false,
        }
    }

    /// `COMPLETED` and `FAILED` receive no further automatic transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// States in which the workflow still waits on the client; only these
    /// are reported as `EXPIRED` once `expires_at` has passed.
    pub fn is_pre_selection(self) -> bool {
        matches!(
            self,
            Self::Pending | Self::MockupsReady | Self::AwaitingSelection
        )
    }
}

/// Reject a transition that is not an edge of the workflow graph.
pub fn validate_transition(from: WorkflowState, to: WorkflowState) -> Result<(), CoreError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(CoreError::Conflict(format!(
            "Workflow cannot move from {from} to {to}"
        )))
    }
}

/// Compute `expires_at` for a workflow created at `created_at`.
pub fn expiry_for(created_at: Timestamp, ttl_hours: i64) -> Timestamp {
    created_at + Duration::hours(ttl_hours)
}

/// State as reported to clients: the stored state plus a derived `EXPIRED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViewState {
    Pending,
    MockupsReady,
    AwaitingSelection,
    Selected,
    Production,
    Completed,
    Failed,
    Expired,
}

impl ViewState {
    /// Derive the client-facing state at `now`.
    ///
    /// Expiry is advisory: background work keeps running, but reads of a
    /// pre-selection workflow past its deadline report `EXPIRED`.
    pub fn derive(state: WorkflowState, expires_at: Timestamp, now: Timestamp) -> Self {
        if state.is_pre_selection() && now >= expires_at {
            return Self::Expired;
        }
        match state {
            WorkflowState::Pending => Self::Pending,
            WorkflowState::MockupsReady => Self::MockupsReady,
            WorkflowState::AwaitingSelection => Self::AwaitingSelection,
            WorkflowState::Selected => Self::Selected,
            WorkflowState::Production => Self::Production,
            WorkflowState::Completed => Self::Completed,
            WorkflowState::Failed => Self::Failed,
        }
    }
}

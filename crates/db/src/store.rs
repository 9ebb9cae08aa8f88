//! The persistent store boundary.
//!
//! Every state change goes through a compare-and-set: the write only lands
//! if the record is still in the state the caller last observed. The store
//! is the sole arbiter of that atomicity; callers never lock in-process.

use async_trait::async_trait;
use launchpad_core::status::{ProposalStatus, WorkflowState};
use launchpad_core::types::DbId;

use crate::error::StoreError;
use crate::models::deployment::{DeploymentJob, DeploymentPatch, NewDeployment};
use crate::models::proposal::{NewProposal, Proposal, ProposalPatch};
use crate::models::selection::SelectionEvent;
use crate::models::workflow::{NewWorkflow, Workflow, WorkflowPatch};

#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// Cheap reachability probe for `/health`.
    async fn health_check(&self) -> Result<(), StoreError>;

    // -- workflows ---------------------------------------------------------

    async fn create_workflow(&self, input: NewWorkflow) -> Result<Workflow, StoreError>;

    async fn get_workflow(&self, id: DbId) -> Result<Option<Workflow>, StoreError>;

    /// Move a workflow from `expected` to `next`, writing `patch` in the same
    /// atomic step.
    ///
    /// Fails with [`StoreError::StateConflict`] if the stored state is no
    /// longer `expected`, and [`StoreError::InvalidTransition`] if
    /// `expected -> next` is not an edge of the workflow graph.
    async fn compare_and_set_workflow(
        &self,
        id: DbId,
        expected: WorkflowState,
        next: WorkflowState,
        patch: WorkflowPatch,
    ) -> Result<Workflow, StoreError>;

    // -- proposals ---------------------------------------------------------

    async fn create_proposal(&self, input: NewProposal) -> Result<Proposal, StoreError>;

    async fn get_proposal(&self, id: DbId) -> Result<Option<Proposal>, StoreError>;

    async fn compare_and_set_proposal(
        &self,
        id: DbId,
        expected: ProposalStatus,
        next: ProposalStatus,
        patch: ProposalPatch,
    ) -> Result<Proposal, StoreError>;

    // -- deployment jobs ---------------------------------------------------

    async fn create_deployment(&self, input: NewDeployment) -> Result<DeploymentJob, StoreError>;

    async fn update_deployment(
        &self,
        id: DbId,
        patch: DeploymentPatch,
    ) -> Result<DeploymentJob, StoreError>;

    /// Most recently created job for the workflow, mockup or production.
    async fn latest_deployment(&self, workflow_id: DbId)
        -> Result<Option<DeploymentJob>, StoreError>;

    // -- selection ---------------------------------------------------------

    /// Record a client's choice exactly once.
    ///
    /// In one atomic step: the workflow moves `AWAITING_SELECTION ->
    /// SELECTED` with `selected_option` set, the proposal moves to
    /// `SELECTED`, and the event is inserted. If any part loses a race the
    /// whole call fails and nothing is written.
    async fn accept_selection(
        &self,
        event: SelectionEvent,
        proposal_id: DbId,
    ) -> Result<(), StoreError>;

    async fn get_selection(&self, workflow_id: DbId) -> Result<Option<SelectionEvent>, StoreError>;
}

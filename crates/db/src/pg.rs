//! PostgreSQL-backed [`Store`].

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use launchpad_core::status::{ProposalStatus, StatusId, WorkflowState};
use launchpad_core::types::DbId;
use launchpad_core::workflow::validate_transition;
use sqlx::PgPool;

use crate::error::StoreError;
use crate::models::deployment::{DeploymentJob, DeploymentPatch, NewDeployment};
use crate::models::proposal::{NewProposal, Proposal, ProposalPatch};
use crate::models::selection::SelectionEvent;
use crate::models::workflow::{NewWorkflow, Workflow, WorkflowPatch};
use crate::repositories::{
    DeploymentRepo, ProposalRepo, SelectionOutcome, SelectionRepo, WorkflowRepo,
};
use crate::store::Store;

/// Default per-query timeout.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// [`Store`] over a `sqlx` PostgreSQL pool. Every query is bounded by
/// `query_timeout`.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    query_timeout: Duration,
}

impl PgStore {
    pub fn new(pool: PgPool, query_timeout: Duration) -> Self {
        Self {
            pool,
            query_timeout,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn timed<T, F>(&self, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, sqlx::Error>>,
    {
        match tokio::time::timeout(self.query_timeout, fut).await {
            Ok(result) => result.map_err(StoreError::from),
            Err(_) => {
                tracing::warn!(timeout_ms = self.query_timeout.as_millis() as u64, "Store query timed out");
                Err(StoreError::Timeout(self.query_timeout))
            }
        }
    }

    /// Explain why a workflow compare-and-set matched no row.
    async fn workflow_miss(&self, id: DbId, expected: WorkflowState) -> StoreError {
        match self.timed(WorkflowRepo::current_state(&self.pool, id)).await {
            Ok(Some(actual)) => StoreError::StateConflict {
                kind: "workflow",
                id,
                expected: expected.to_string(),
                actual: state_label::<WorkflowState>(actual),
            },
            Ok(None) => StoreError::NotFound {
                kind: "workflow",
                id,
            },
            Err(e) => e,
        }
    }

    async fn proposal_miss(&self, id: DbId, expected: String) -> StoreError {
        match self.timed(ProposalRepo::current_status(&self.pool, id)).await {
            Ok(Some(actual)) => StoreError::StateConflict {
                kind: "proposal",
                id,
                expected,
                actual: state_label::<ProposalStatus>(actual),
            },
            Ok(None) => StoreError::NotFound {
                kind: "proposal",
                id,
            },
            Err(e) => e,
        }
    }
}

/// Render a stored status id for error messages, tolerating unknown ids.
fn state_label<S: StatusLabel>(id: StatusId) -> String {
    S::label(id).unwrap_or_else(|| format!("#{id}"))
}

trait StatusLabel {
    fn label(id: StatusId) -> Option<String>;
}

impl StatusLabel for WorkflowState {
    fn label(id: StatusId) -> Option<String> {
        WorkflowState::from_id(id).ok().map(|s| s.to_string())
    }
}

impl StatusLabel for ProposalStatus {
    fn label(id: StatusId) -> Option<String> {
        ProposalStatus::from_id(id).ok().map(|s| s.to_string())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn health_check(&self) -> Result<(), StoreError> {
        self.timed(crate::health_check(&self.pool)).await
    }

    async fn create_workflow(&self, input: NewWorkflow) -> Result<Workflow, StoreError> {
        self.timed(WorkflowRepo::create(&self.pool, &input))
            .await?
            .try_into()
    }

    async fn get_workflow(&self, id: DbId) -> Result<Option<Workflow>, StoreError> {
        self.timed(WorkflowRepo::find_by_id(&self.pool, id))
            .await?
            .map(Workflow::try_from)
            .transpose()
    }

    async fn compare_and_set_workflow(
        &self,
        id: DbId,
        expected: WorkflowState,
        next: WorkflowState,
        patch: WorkflowPatch,
    ) -> Result<Workflow, StoreError> {
        validate_transition(expected, next)?;
        match self
            .timed(WorkflowRepo::compare_and_set(
                &self.pool, id, expected, next, &patch,
            ))
            .await?
        {
            Some(row) => row.try_into(),
            None => Err(self.workflow_miss(id, expected).await),
        }
    }

    async fn create_proposal(&self, input: NewProposal) -> Result<Proposal, StoreError> {
        self.timed(ProposalRepo::create(&self.pool, &input))
            .await?
            .try_into()
    }

    async fn get_proposal(&self, id: DbId) -> Result<Option<Proposal>, StoreError> {
        self.timed(ProposalRepo::find_by_id(&self.pool, id))
            .await?
            .map(Proposal::try_from)
            .transpose()
    }

    async fn compare_and_set_proposal(
        &self,
        id: DbId,
        expected: ProposalStatus,
        next: ProposalStatus,
        patch: ProposalPatch,
    ) -> Result<Proposal, StoreError> {
        if !expected.can_transition_to(next) {
            return Err(StoreError::InvalidTransition(format!(
                "Proposal cannot move from {expected} to {next}"
            )));
        }
        match self
            .timed(ProposalRepo::compare_and_set(
                &self.pool, id, expected, next, &patch,
            ))
            .await?
        {
            Some(row) => row.try_into(),
            None => Err(self.proposal_miss(id, expected.to_string()).await),
        }
    }

    async fn create_deployment(&self, input: NewDeployment) -> Result<DeploymentJob, StoreError> {
        self.timed(DeploymentRepo::create(&self.pool, &input))
            .await?
            .try_into()
    }

    async fn update_deployment(
        &self,
        id: DbId,
        patch: DeploymentPatch,
    ) -> Result<DeploymentJob, StoreError> {
        self.timed(DeploymentRepo::update(&self.pool, id, &patch))
            .await?
            .ok_or(StoreError::NotFound {
                kind: "deployment job",
                id,
            })?
            .try_into()
    }

    async fn latest_deployment(
        &self,
        workflow_id: DbId,
    ) -> Result<Option<DeploymentJob>, StoreError> {
        self.timed(DeploymentRepo::latest_for_workflow(&self.pool, workflow_id))
            .await?
            .map(DeploymentJob::try_from)
            .transpose()
    }

    async fn accept_selection(
        &self,
        event: SelectionEvent,
        proposal_id: DbId,
    ) -> Result<(), StoreError> {
        let workflow_id = event.workflow_id;
        match self
            .timed(SelectionRepo::accept(&self.pool, &event, proposal_id))
            .await?
        {
            SelectionOutcome::Accepted => Ok(()),
            SelectionOutcome::WorkflowNotAwaiting => Err(self
                .workflow_miss(workflow_id, WorkflowState::AwaitingSelection)
                .await),
            SelectionOutcome::ProposalNotOpen => Err(self
                .proposal_miss(proposal_id, "GENERATED|PARTIAL|SENT".into())
                .await),
            SelectionOutcome::Duplicate => Err(StoreError::AlreadyExists {
                kind: "selection",
                id: workflow_id,
            }),
        }
    }

    async fn get_selection(&self, workflow_id: DbId) -> Result<Option<SelectionEvent>, StoreError> {
        Ok(self
            .timed(SelectionRepo::find(&self.pool, workflow_id))
            .await?
            .map(SelectionEvent::from))
    }
}

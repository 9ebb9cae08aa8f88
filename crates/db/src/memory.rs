//! In-process [`Store`] for tests and local development without PostgreSQL.
//!
//! A single mutex guards all tables, so each compare-and-set (and the
//! multi-record selection accept) is atomic with respect to other callers.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use launchpad_core::status::{DeploymentState, ProposalStatus, WorkflowState};
use launchpad_core::types::{new_id, DbId};
use launchpad_core::workflow::validate_transition;

use crate::error::StoreError;
use crate::models::deployment::{DeploymentJob, DeploymentPatch, NewDeployment};
use crate::models::proposal::{NewProposal, Proposal, ProposalPatch};
use crate::models::selection::SelectionEvent;
use crate::models::workflow::{NewWorkflow, Workflow, WorkflowPatch};
use crate::store::Store;

#[derive(Default)]
struct Tables {
    workflows: HashMap<DbId, Workflow>,
    proposals: HashMap<DbId, Proposal>,
    deployments: Vec<DeploymentJob>,
    selections: HashMap<DbId, SelectionEvent>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        // Mutations only happen after every check passes.
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// All deployment jobs recorded for a workflow, oldest first.
    pub fn deployments_for(&self, workflow_id: DbId) -> Vec<DeploymentJob> {
        self.lock()
            .deployments
            .iter()
            .filter(|job| job.workflow_id == workflow_id)
            .cloned()
            .collect()
    }
}

fn workflow_cas(
    tables: &mut Tables,
    id: DbId,
    expected: WorkflowState,
    next: WorkflowState,
    patch: WorkflowPatch,
) -> Result<Workflow, StoreError> {
    validate_transition(expected, next)?;
    let workflow = tables.workflows.get_mut(&id).ok_or(StoreError::NotFound {
        kind: "workflow",
        id,
    })?;
    if workflow.state != expected {
        return Err(StoreError::StateConflict {
            kind: "workflow",
            id,
            expected: expected.to_string(),
            actual: workflow.state.to_string(),
        });
    }
    workflow.state = next;
    patch.apply_to(workflow);
    workflow.updated_at = Utc::now();
    Ok(workflow.clone())
}

#[async_trait]
impl Store for MemoryStore {
    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn create_workflow(&self, input: NewWorkflow) -> Result<Workflow, StoreError> {
        let now = Utc::now();
        let workflow = Workflow {
            id: new_id(),
            state: WorkflowState::Pending,
            intake: input.intake,
            proposal_id: None,
            selected_option: None,
            production_url: None,
            error_message: None,
            created_at: now,
            updated_at: now,
            expires_at: input.expires_at,
        };
        self.lock().workflows.insert(workflow.id, workflow.clone());
        Ok(workflow)
    }

    async fn get_workflow(&self, id: DbId) -> Result<Option<Workflow>, StoreError> {
        Ok(self.lock().workflows.get(&id).cloned())
    }

    async fn compare_and_set_workflow(
        &self,
        id: DbId,
        expected: WorkflowState,
        next: WorkflowState,
        patch: WorkflowPatch,
    ) -> Result<Workflow, StoreError> {
        workflow_cas(&mut self.lock(), id, expected, next, patch)
    }

    async fn create_proposal(&self, input: NewProposal) -> Result<Proposal, StoreError> {
        let mut tables = self.lock();
        if !tables.workflows.contains_key(&input.workflow_id) {
            return Err(StoreError::NotFound {
                kind: "workflow",
                id: input.workflow_id,
            });
        }
        let now = Utc::now();
        let proposal = Proposal {
            id: new_id(),
            workflow_id: input.workflow_id,
            status: ProposalStatus::Pending,
            options: input.options,
            selected_option: None,
            sent_at: None,
            created_at: now,
            updated_at: now,
        };
        tables.proposals.insert(proposal.id, proposal.clone());
        Ok(proposal)
    }

    async fn get_proposal(&self, id: DbId) -> Result<Option<Proposal>, StoreError> {
        Ok(self.lock().proposals.get(&id).cloned())
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
        let mut tables = self.lock();
        let proposal = tables.proposals.get_mut(&id).ok_or(StoreError::NotFound {
            kind: "proposal",
            id,
        })?;
        if proposal.status != expected {
            return Err(StoreError::StateConflict {
                kind: "proposal",
                id,
                expected: expected.to_string(),
                actual: proposal.status.to_string(),
            });
        }
        proposal.status = next;
        patch.apply_to(proposal);
        proposal.updated_at = Utc::now();
        Ok(proposal.clone())
    }

    async fn create_deployment(&self, input: NewDeployment) -> Result<DeploymentJob, StoreError> {
        let now = Utc::now();
        let job = DeploymentJob {
            id: new_id(),
            workflow_id: input.workflow_id,
            option_index: input.option_index,
            state: DeploymentState::Created,
            provider_site_id: None,
            provider_deploy_id: None,
            archive_sha256: None,
            archive_bytes: None,
            result_url: None,
            error_message: None,
            attempts: 0,
            created_at: now,
            updated_at: now,
        };
        self.lock().deployments.push(job.clone());
        Ok(job)
    }

    async fn update_deployment(
        &self,
        id: DbId,
        patch: DeploymentPatch,
    ) -> Result<DeploymentJob, StoreError> {
        let mut tables = self.lock();
        let job = tables
            .deployments
            .iter_mut()
            .find(|job| job.id == id)
            .ok_or(StoreError::NotFound {
                kind: "deployment job",
                id,
            })?;
        patch.apply_to(job);
        job.updated_at = Utc::now();
        Ok(job.clone())
    }

    async fn latest_deployment(
        &self,
        workflow_id: DbId,
    ) -> Result<Option<DeploymentJob>, StoreError> {
        Ok(self
            .lock()
            .deployments
            .iter()
            .rev()
            .find(|job| job.workflow_id == workflow_id)
            .cloned())
    }

    async fn accept_selection(
        &self,
        event: SelectionEvent,
        proposal_id: DbId,
    ) -> Result<(), StoreError> {
        let mut tables = self.lock();
        let workflow_id = event.workflow_id;

        if tables.selections.contains_key(&workflow_id) {
            return Err(StoreError::AlreadyExists {
                kind: "selection",
                id: workflow_id,
            });
        }
        let proposal = tables
            .proposals
            .get(&proposal_id)
            .filter(|p| p.workflow_id == workflow_id)
            .ok_or(StoreError::NotFound {
                kind: "proposal",
                id: proposal_id,
            })?;
        if !proposal.status.accepts_selection() {
            return Err(StoreError::StateConflict {
                kind: "proposal",
                id: proposal_id,
                expected: "GENERATED|PARTIAL|SENT".into(),
                actual: proposal.status.to_string(),
            });
        }

        // All checks above are read-only; the workflow CAS is the last one
        // that can fail, so nothing is written on a lost race.
        workflow_cas(
            &mut tables,
            workflow_id,
            WorkflowState::AwaitingSelection,
            WorkflowState::Selected,
            WorkflowPatch {
                selected_option: Some(event.chosen_option),
                ..WorkflowPatch::default()
            },
        )?;

        if let Some(proposal) = tables.proposals.get_mut(&proposal_id) {
            proposal.status = ProposalStatus::Selected;
            proposal.selected_option = Some(event.chosen_option);
            proposal.updated_at = Utc::now();
        }
        tables.selections.insert(workflow_id, event);
        Ok(())
    }

    async fn get_selection(&self, workflow_id: DbId) -> Result<Option<SelectionEvent>, StoreError> {
        Ok(self.lock().selections.get(&workflow_id).cloned())
    }
}

//! Workflow Orchestrator: the top-level state machine.
//!
//! Public operations validate, write the first state change and return;
//! proposal generation and production deploys run as tracked background
//! tasks. The orchestrator is the only component that turns component
//! errors into workflow transitions.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use launchpad_core::intake::Intake;
use launchpad_core::status::{ProposalStatus, WorkflowState};
use launchpad_core::templates::TemplateCatalog;
use launchpad_core::types::DbId;
use launchpad_core::workflow::expiry_for;
use launchpad_db::models::workflow::{NewWorkflow, Workflow, WorkflowPatch};
use launchpad_db::{Store, StoreError};
use launchpad_events::templates::SITE_PUBLISHED;
use launchpad_events::{event_types, EventBus, Notification, Notifier, PlatformEvent};
use launchpad_hosting::{DeployClient, DeploymentPoller, HostingProvider, Packager};
use tokio_util::task::TaskTracker;

use crate::builder::SiteBuilder;
use crate::config::PipelineConfig;
use crate::deploy::{DeployTarget, DeploymentRunner};
use crate::error::PipelineError;
use crate::proposal::{project_data, ProposalGenerator};
use crate::selection::{SelectionAck, SelectionHandler, SelectionRequest};
use crate::store_retry::StoreRetry;
use crate::view::WorkflowView;

/// Production deploys get one job; a failure waits for an operator re-run.
const PRODUCTION_JOBS: u32 = 1;

/// External collaborators the orchestrator is wired to.
pub struct PipelineDeps {
    pub store: Arc<dyn Store>,
    pub provider: Arc<dyn HostingProvider>,
    pub builder: Arc<dyn SiteBuilder>,
    pub catalog: TemplateCatalog,
    pub notifier: Arc<dyn Notifier>,
    pub events: Arc<EventBus>,
}

/// Cheap to clone; all clones share the same task tracker.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<dyn Store>,
    store_retry: StoreRetry,
    generator: ProposalGenerator,
    selection: SelectionHandler,
    runner: Arc<DeploymentRunner>,
    notifier: Arc<dyn Notifier>,
    events: Arc<EventBus>,
    config: PipelineConfig,
    tasks: TaskTracker,
}

impl Orchestrator {
    pub fn new(deps: PipelineDeps, config: PipelineConfig) -> Self {
        let client = DeployClient::new(deps.provider, config.retry.clone(), config.request_timeout);
        let poller = DeploymentPoller::new(client.clone(), config.poll.clone());
        let runner = Arc::new(DeploymentRunner::new(
            Arc::clone(&deps.store),
            config.store_retry.clone(),
            deps.builder,
            Packager::new(config.packager),
            client,
            poller,
            config.retry.clone(),
        ));
        let generator = ProposalGenerator::new(
            Arc::clone(&deps.store),
            Arc::clone(&runner),
            Arc::new(deps.catalog),
            Arc::clone(&deps.notifier),
            &config,
        );
        let selection = SelectionHandler::new(
            Arc::clone(&deps.store),
            config.store_retry.clone(),
            config.enforce_selection_expiry,
        );

        Self {
            inner: Arc::new(Inner {
                store: deps.store,
                store_retry: StoreRetry::new(config.store_retry.clone()),
                generator,
                selection,
                runner,
                notifier: deps.notifier,
                events: deps.events,
                config,
                tasks: TaskTracker::new(),
            }),
        }
    }

    // -----------------------------------------------------------------------
    // Public operations
    // -----------------------------------------------------------------------

    /// Validate `intake`, create a `PENDING` workflow and start proposal
    /// generation in the background. Identical intakes create independent
    /// workflows.
    pub async fn start_workflow(&self, intake: Intake) -> Result<DbId, PipelineError> {
        let intake = intake.validated()?;
        let workflow = self
            .inner
            .store
            .create_workflow(NewWorkflow {
                intake,
                expires_at: expiry_for(Utc::now(), self.inner.config.workflow_ttl_hours),
            })
            .await?;
        let workflow_id = workflow.id;

        tracing::info!(
            %workflow_id,
            business_type = %workflow.intake.business_type,
            "Workflow started",
        );
        self.publish(event_types::WORKFLOW_STARTED, workflow_id, serde_json::json!({
            "business_type": workflow.intake.business_type,
        }));

        let this = self.clone();
        self.spawn(workflow_id, "proposal", async move {
            this.run_proposal(workflow).await
        });
        Ok(workflow_id)
    }

    pub async fn get_status(&self, workflow_id: DbId) -> Result<WorkflowView, PipelineError> {
        let store = &self.inner.store;
        let workflow = store
            .get_workflow(workflow_id)
            .await?
            .ok_or(PipelineError::NotFound(workflow_id))?;
        let proposal = match workflow.proposal_id {
            Some(id) => store.get_proposal(id).await?,
            None => None,
        };
        let latest = store.latest_deployment(workflow_id).await?;
        Ok(WorkflowView::build(workflow, proposal, latest, Utc::now()))
    }

    /// Record the client's choice, then deploy it to production in the
    /// background.
    pub async fn handle_selection(
        &self,
        request: SelectionRequest,
    ) -> Result<SelectionAck, PipelineError> {
        let ack = self.inner.selection.handle(request).await?;
        let workflow_id = ack.workflow_id;
        self.publish(event_types::WORKFLOW_SELECTED, workflow_id, serde_json::json!({
            "chosen_option": ack.chosen_option,
        }));

        let this = self.clone();
        self.spawn(workflow_id, "production", async move {
            let workflow = this
                .transition(workflow_id, WorkflowState::Selected, WorkflowState::Production, WorkflowPatch::default())
                .await?;
            this.run_production(workflow).await
        });
        Ok(ack)
    }

    /// Operator re-run of a failed production deploy.
    ///
    /// Only a `FAILED` workflow with a recorded selection qualifies.
    pub async fn retry_production(&self, workflow_id: DbId) -> Result<(), PipelineError> {
        let workflow = self
            .inner
            .store
            .get_workflow(workflow_id)
            .await?
            .filter(|w| w.state == WorkflowState::Failed && w.selected_option.is_some())
            .ok_or(PipelineError::InvalidState)?;

        let workflow = match self
            .transition(
                workflow.id,
                WorkflowState::Failed,
                WorkflowState::Production,
                WorkflowPatch {
                    clear_error: true,
                    ..WorkflowPatch::default()
                },
            )
            .await
        {
            Ok(w) => w,
            Err(PipelineError::Conflict(_)) => return Err(PipelineError::InvalidState),
            Err(e) => return Err(e),
        };
        tracing::info!(%workflow_id, "Production re-run requested");

        let this = self.clone();
        self.spawn(workflow_id, "production", async move {
            this.run_production(workflow).await
        });
        Ok(())
    }

    /// Wait until every background task started so far has finished.
    pub async fn wait_idle(&self) {
        let tasks = &self.inner.tasks;
        tasks.close();
        tasks.wait().await;
        tasks.reopen();
    }

    /// Stop accepting background work and wait up to `timeout` for running
    /// tasks. Returns `false` if tasks were still running at the deadline.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        let tasks = &self.inner.tasks;
        tasks.close();
        let pending = tasks.len();
        if pending > 0 {
            tracing::info!(pending, "Waiting for pipeline tasks to finish");
        }
        tokio::time::timeout(timeout, tasks.wait()).await.is_ok()
    }

    // -----------------------------------------------------------------------
    // Background stages
    // -----------------------------------------------------------------------

    async fn run_proposal(&self, workflow: Workflow) -> Result<(), PipelineError> {
        let workflow_id = workflow.id;
        let proposal = self.inner.generator.generate(&workflow).await?;
        let ready = proposal.ready_count();
        let total = proposal.options.len();

        let rejection = match proposal.status {
            ProposalStatus::Failed => Some(format!("all {total} mockup deploys failed")),
            ProposalStatus::Partial if !self.inner.config.allow_partial_proposals => Some(format!(
                "only {ready} of {total} mockups deployed and partial proposals are disabled"
            )),
            _ => None,
        };
        if let Some(reason) = rejection {
            tracing::warn!(%workflow_id, proposal_id = %proposal.id, reason = %reason, "Proposal rejected");
            if let Err(e) = self.inner.generator.reject(&proposal).await {
                tracing::error!(%workflow_id, proposal_id = %proposal.id, error = %e, "Failed to withdraw proposal");
            }
            let message = PipelineError::ProposalRejected(reason).to_string();
            self.fail_workflow(
                workflow_id,
                WorkflowPatch {
                    proposal_id: Some(proposal.id),
                    ..WorkflowPatch::error(message)
                },
            )
            .await;
            return Ok(());
        }

        let event_type = if proposal.status == ProposalStatus::Partial {
            event_types::PROPOSAL_PARTIAL
        } else {
            event_types::PROPOSAL_GENERATED
        };
        self.publish(event_type, workflow_id, serde_json::json!({
            "proposal_id": proposal.id,
            "ready": ready,
            "total": total,
        }));

        let workflow = self
            .transition(
                workflow_id,
                WorkflowState::Pending,
                WorkflowState::MockupsReady,
                WorkflowPatch {
                    proposal_id: Some(proposal.id),
                    ..WorkflowPatch::default()
                },
            )
            .await?;

        if let Err(e) = self.inner.generator.notify_client(&workflow, &proposal).await {
            tracing::warn!(
                %workflow_id,
                proposal_id = %proposal.id,
                error = %e,
                "Proposal notification not delivered",
            );
        }

        self.transition(
            workflow_id,
            WorkflowState::MockupsReady,
            WorkflowState::AwaitingSelection,
            WorkflowPatch::default(),
        )
        .await?;
        self.publish(event_types::WORKFLOW_AWAITING_SELECTION, workflow_id, serde_json::json!({
            "proposal_id": proposal.id,
        }));
        Ok(())
    }

    /// Deploy the selected option. `workflow` is already in `PRODUCTION`.
    async fn run_production(&self, workflow: Workflow) -> Result<(), PipelineError> {
        let workflow_id = workflow.id;
        let chosen = workflow
            .selected_option
            .ok_or_else(|| PipelineError::Internal("workflow has no selected option".into()))?;
        let proposal_id = workflow
            .proposal_id
            .ok_or_else(|| PipelineError::Internal("workflow has no proposal".into()))?;
        let store = &self.inner.store;
        let proposal = self
            .inner
            .store_retry
            .run("get_proposal", || store.get_proposal(proposal_id))
            .await?
            .ok_or_else(|| PipelineError::Internal(format!("proposal {proposal_id} is missing")))?;
        let option = proposal
            .option(chosen)
            .ok_or_else(|| PipelineError::Internal(format!("proposal has no option {chosen}")))?;

        let project = project_data(workflow_id, &workflow.intake, option, false);
        tracing::info!(%workflow_id, option_index = chosen, template = %option.template_id, "Production deploy starting");

        // Failures propagate to the task wrapper, which records them on the
        // workflow. Nothing retries them automatically.
        let deployed = self
            .inner
            .runner
            .deploy(DeployTarget::Production, &project, PRODUCTION_JOBS)
            .await?;

        let workflow = self
            .transition(
                workflow_id,
                WorkflowState::Production,
                WorkflowState::Completed,
                WorkflowPatch {
                    production_url: Some(deployed.url.clone()),
                    ..WorkflowPatch::default()
                },
            )
            .await?;
        tracing::info!(%workflow_id, url = %deployed.url, "Workflow completed");
        self.publish(event_types::WORKFLOW_COMPLETED, workflow_id, serde_json::json!({
            "url": deployed.url,
        }));

        let notification = Notification::new(
            &workflow.intake.email,
            SITE_PUBLISHED,
            serde_json::json!({
                "business_name": workflow.intake.business_name,
                "url": deployed.url,
            }),
        );
        if let Err(e) = self.inner.notifier.send(&notification).await {
            tracing::warn!(%workflow_id, error = %e, "Completion notification not delivered");
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// Run `stage` on the task tracker. An error or panic moves the
    /// workflow to `FAILED` from whatever state it has reached.
    fn spawn<F>(&self, workflow_id: DbId, stage: &'static str, stage_future: F)
    where
        F: Future<Output = Result<(), PipelineError>> + Send + 'static,
    {
        let this = self.clone();
        self.inner.tasks.spawn(async move {
            let message = match AssertUnwindSafe(stage_future).catch_unwind().await {
                Ok(Ok(())) => return,
                Ok(Err(e)) => {
                    tracing::error!(%workflow_id, stage, error = %e, "Pipeline stage failed");
                    e.to_string()
                }
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    tracing::error!(%workflow_id, stage, panic = %message, "Pipeline stage panicked");
                    format!("Internal error: {message}")
                }
            };
            this.fail_workflow(workflow_id, WorkflowPatch::error(message)).await;
        });
    }

    /// Compare-and-set with a bounded retry on transient store errors.
    ///
    /// A lost compare-and-set or an edge outside the workflow graph is a
    /// [`PipelineError::Conflict`].
    async fn transition(
        &self,
        workflow_id: DbId,
        expected: WorkflowState,
        next: WorkflowState,
        patch: WorkflowPatch,
    ) -> Result<Workflow, PipelineError> {
        let store = &self.inner.store;
        let result = self
            .inner
            .store_retry
            .compare_and_set(
                "compare_and_set_workflow",
                || store.compare_and_set_workflow(workflow_id, expected, next, patch.clone()),
                || async move {
                    let current = store.get_workflow(workflow_id).await?;
                    Ok(current.filter(|w| w.state == next))
                },
            )
            .await;

        match result {
            Ok(workflow) => {
                tracing::debug!(%workflow_id, from = %expected, to = %next, "Workflow transition");
                Ok(workflow)
            }
            Err(e) if e.is_conflict() || matches!(e, StoreError::InvalidTransition(_)) => {
                Err(PipelineError::Conflict(e.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Move the workflow to `FAILED` from its current state and keep the
    /// error message for operators. Terminal workflows are left alone.
    async fn fail_workflow(&self, workflow_id: DbId, patch: WorkflowPatch) {
        let store = &self.inner.store;
        let retry = &self.inner.store_retry;
        for attempt in 0..retry.max_attempts() {
            if attempt > 0 {
                tokio::time::sleep(retry.delay(attempt - 1)).await;
            }
            let current = match store.get_workflow(workflow_id).await {
                Ok(Some(w)) => w,
                Ok(None) => {
                    tracing::error!(%workflow_id, "Cannot fail missing workflow");
                    return;
                }
                Err(e) => {
                    tracing::error!(%workflow_id, error = %e, "Failed to read workflow");
                    continue;
                }
            };
            if current.state.is_terminal() {
                tracing::warn!(%workflow_id, state = %current.state, "Workflow already terminal, failure not recorded");
                return;
            }

            match store
                .compare_and_set_workflow(workflow_id, current.state, WorkflowState::Failed, patch.clone())
                .await
            {
                Ok(failed) => {
                    tracing::warn!(
                        %workflow_id,
                        from = %current.state,
                        error = failed.error_message.as_deref().unwrap_or_default(),
                        "Workflow failed",
                    );
                    self.publish(event_types::WORKFLOW_FAILED, workflow_id, serde_json::json!({
                        "from": current.state,
                        "error": failed.error_message,
                    }));
                    return;
                }
                Err(e) => {
                    tracing::warn!(%workflow_id, error = %e, "Failed to record workflow failure, retrying");
                }
            }
        }
        tracing::error!(%workflow_id, "Gave up recording workflow failure");
    }

    fn publish(&self, event_type: &str, workflow_id: DbId, payload: serde_json::Value) {
        self.inner.events.publish(
            PlatformEvent::new(event_type)
                .with_source("workflow", workflow_id)
                .with_payload(payload),
        );
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

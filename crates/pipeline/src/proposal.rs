//! Proposal Generator: pick N templates for an intake and publish one
//! mockup per option.
//!
//! The generator settles the proposal (`GENERATED`, `PARTIAL` or `FAILED`)
//! but never touches the workflow; whether a partial proposal is good
//! enough to send is the orchestrator's call.

use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use launchpad_core::intake::Intake;
use launchpad_core::status::ProposalStatus;
use launchpad_core::templates::{TemplateCatalog, TemplateError};
use launchpad_core::types::DbId;
use launchpad_db::models::proposal::{NewProposal, Proposal, ProposalOption, ProposalPatch};
use launchpad_db::models::workflow::Workflow;
use launchpad_db::{Store, StoreError};
use launchpad_events::templates::PROPOSAL_READY;
use launchpad_events::{Notification, Notifier, NotifyError};

use crate::builder::ProjectData;
use crate::deploy::{DeployTarget, DeploymentRunner};
use crate::store_retry::StoreRetry;

#[derive(Debug, thiserror::Error)]
pub enum ProposalError {
    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Proposal notification failed: {0}")]
    Notify(#[from] NotifyError),
}

pub struct ProposalGenerator {
    store: Arc<dyn Store>,
    store_retry: StoreRetry,
    runner: Arc<DeploymentRunner>,
    catalog: Arc<TemplateCatalog>,
    notifier: Arc<dyn Notifier>,
    option_count: usize,
    mockup_job_attempts: u32,
    site_base_url: String,
}

impl ProposalGenerator {
    pub fn new(
        store: Arc<dyn Store>,
        runner: Arc<DeploymentRunner>,
        catalog: Arc<TemplateCatalog>,
        notifier: Arc<dyn Notifier>,
        config: &crate::config::PipelineConfig,
    ) -> Self {
        Self {
            store,
            store_retry: StoreRetry::new(config.store_retry.clone()),
            runner,
            catalog,
            notifier,
            option_count: config.option_count,
            mockup_job_attempts: config.mockup_job_attempts,
            site_base_url: config.site_base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Select the options, deploy every mockup concurrently and settle the
    /// proposal once the last one finishes.
    ///
    /// Returns the settled proposal; a proposal with failed mockups is a
    /// successful return with status `PARTIAL` or `FAILED`.
    pub async fn generate(&self, workflow: &Workflow) -> Result<Proposal, ProposalError> {
        let selected = self.catalog.select(&workflow.intake, self.option_count)?;
        let options: Vec<ProposalOption> = selected
            .into_iter()
            .zip(1..)
            .map(|(scored, index)| ProposalOption {
                index,
                template_id: scored.template.id,
                name: scored.template.name,
                theme: scored.template.theme,
                score: scored.score,
                preview_url: None,
                failure: None,
            })
            .collect();

        // A repeat after a timed-out insert can leave an unreferenced row;
        // only the returned proposal is ever linked to the workflow.
        let proposal = self
            .store_retry
            .run("create_proposal", || {
                self.store.create_proposal(NewProposal {
                    workflow_id: workflow.id,
                    options: options.clone(),
                })
            })
            .await?;
        tracing::info!(
            workflow_id = %workflow.id,
            proposal_id = %proposal.id,
            templates = ?options.iter().map(|o| o.template_id.as_str()).collect::<Vec<_>>(),
            "Proposal created, deploying mockups",
        );

        let deploys = options.iter().map(|option| {
            let project = project_data(workflow.id, &workflow.intake, option, true);
            async move {
                self.runner
                    .deploy(
                        DeployTarget::Mockup(option.index),
                        &project,
                        self.mockup_job_attempts,
                    )
                    .await
            }
        });
        let results = join_all(deploys).await;

        let mut settled = options;
        for (option, result) in settled.iter_mut().zip(results) {
            match result {
                Ok(deployed) => option.preview_url = Some(deployed.url),
                Err(e) => {
                    tracing::warn!(
                        workflow_id = %workflow.id,
                        proposal_id = %proposal.id,
                        option_index = option.index,
                        error = %e,
                        "Mockup deploy failed",
                    );
                    option.failure = Some(e.to_string());
                }
            }
        }

        let status = settle_status(&settled);
        let proposal = self
            .set_status(
                proposal.id,
                ProposalStatus::Pending,
                status,
                ProposalPatch {
                    options: Some(settled),
                    ..ProposalPatch::default()
                },
            )
            .await?;
        tracing::info!(
            workflow_id = %workflow.id,
            proposal_id = %proposal.id,
            status = %proposal.status,
            ready = proposal.ready_count(),
            total = proposal.options.len(),
            "Proposal settled",
        );
        Ok(proposal)
    }

    /// Send the `proposal_ready` message and mark the proposal `SENT`.
    ///
    /// On a delivery failure the proposal keeps its settled status.
    pub async fn notify_client(
        &self,
        workflow: &Workflow,
        proposal: &Proposal,
    ) -> Result<Proposal, ProposalError> {
        let options: Vec<_> = proposal
            .options
            .iter()
            .map(|o| {
                serde_json::json!({
                    "index": o.index,
                    "name": o.name,
                    "preview_url": o.preview_url,
                })
            })
            .collect();
        let data = serde_json::json!({
            "business_name": workflow.intake.business_name,
            "status_url": self.status_url(workflow.id),
            "options": options,
        });
        self.notifier
            .send(&Notification::new(&workflow.intake.email, PROPOSAL_READY, data))
            .await?;

        let sent = self
            .set_status(
                proposal.id,
                proposal.status,
                ProposalStatus::Sent,
                ProposalPatch {
                    sent_at: Some(Utc::now()),
                    ..ProposalPatch::default()
                },
            )
            .await?;
        Ok(sent)
    }

    /// Withdraw a settled proposal that will not be offered, so it can no
    /// longer accept a selection.
    pub async fn reject(&self, proposal: &Proposal) -> Result<Proposal, ProposalError> {
        if proposal.status == ProposalStatus::Failed {
            return Ok(proposal.clone());
        }
        let rejected = self
            .set_status(
                proposal.id,
                proposal.status,
                ProposalStatus::Failed,
                ProposalPatch::default(),
            )
            .await?;
        Ok(rejected)
    }

    async fn set_status(
        &self,
        proposal_id: DbId,
        expected: ProposalStatus,
        next: ProposalStatus,
        patch: ProposalPatch,
    ) -> Result<Proposal, StoreError> {
        let store = &self.store;
        self.store_retry
            .compare_and_set(
                "compare_and_set_proposal",
                || store.compare_and_set_proposal(proposal_id, expected, next, patch.clone()),
                || async move {
                    let current = store.get_proposal(proposal_id).await?;
                    Ok(current.filter(|p| p.status == next))
                },
            )
            .await
    }

    /// Client-facing page where the options can be compared and chosen.
    pub fn status_url(&self, workflow_id: DbId) -> String {
        format!("{}/workflows/{workflow_id}", self.site_base_url)
    }
}

/// All mockups live is `GENERATED`, none is `FAILED`, anything between is
/// `PARTIAL`.
fn settle_status(options: &[ProposalOption]) -> ProposalStatus {
    let ready = options.iter().filter(|o| o.is_ready()).count();
    if ready == options.len() {
        ProposalStatus::Generated
    } else if ready == 0 {
        ProposalStatus::Failed
    } else {
        ProposalStatus::Partial
    }
}

/// Builder input for one option. `preview` adds the mockup banner.
pub(crate) fn project_data(
    workflow_id: DbId,
    intake: &Intake,
    option: &ProposalOption,
    preview: bool,
) -> ProjectData {
    ProjectData {
        workflow_id,
        business: intake.clone(),
        template_id: option.template_id.clone(),
        template_name: option.name.clone(),
        theme: option.theme.clone(),
        preview_option: preview.then_some(option.index),
    }
}

//! Read-only workflow projection returned by `get_status`.
//!
//! Template scores are internal and never appear here.

use launchpad_core::status::{DeploymentState, ProposalStatus};
use launchpad_core::templates::ThemeDescriptor;
use launchpad_core::types::{DbId, Timestamp};
use launchpad_core::workflow::ViewState;
use launchpad_db::models::deployment::DeploymentJob;
use launchpad_db::models::proposal::Proposal;
use launchpad_db::models::workflow::Workflow;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowView {
    pub id: DbId,
    pub state: ViewState,
    pub business_name: String,
    pub selected_option: Option<i32>,
    pub production_url: Option<String>,
    pub error_message: Option<String>,
    pub proposal: Option<ProposalSummary>,
    pub latest_deployment: Option<DeploymentSummary>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub expires_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProposalSummary {
    pub id: DbId,
    pub status: ProposalStatus,
    pub options: Vec<OptionSummary>,
    pub sent_at: Option<Timestamp>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptionSummary {
    pub index: i32,
    pub name: String,
    pub theme: ThemeDescriptor,
    pub preview_url: Option<String>,
    /// Whether the option may be selected.
    pub available: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeploymentSummary {
    /// `"mockup"` or `"production"`.
    pub target: &'static str,
    pub option_index: Option<i32>,
    pub state: DeploymentState,
    pub url: Option<String>,
    pub error_message: Option<String>,
    pub attempts: i32,
}

impl WorkflowView {
    pub fn build(
        workflow: Workflow,
        proposal: Option<Proposal>,
        latest_deployment: Option<DeploymentJob>,
        now: Timestamp,
    ) -> Self {
        Self {
            id: workflow.id,
            state: ViewState::derive(workflow.state, workflow.expires_at, now),
            business_name: workflow.intake.business_name,
            selected_option: workflow.selected_option,
            production_url: workflow.production_url,
            error_message: workflow.error_message,
            proposal: proposal.map(ProposalSummary::from),
            latest_deployment: latest_deployment.map(DeploymentSummary::from),
            created_at: workflow.created_at,
            updated_at: workflow.updated_at,
            expires_at: workflow.expires_at,
        }
    }
}

impl From<Proposal> for ProposalSummary {
    fn from(proposal: Proposal) -> Self {
        Self {
            id: proposal.id,
            status: proposal.status,
            options: proposal
                .options
                .into_iter()
                .map(|o| OptionSummary {
                    available: o.is_ready(),
                    index: o.index,
                    name: o.name,
                    theme: o.theme,
                    preview_url: o.preview_url,
                })
                .collect(),
            sent_at: proposal.sent_at,
        }
    }
}

impl From<DeploymentJob> for DeploymentSummary {
    fn from(job: DeploymentJob) -> Self {
        Self {
            target: if job.is_production() { "production" } else { "mockup" },
            option_index: job.option_index,
            state: job.state,
            url: job.result_url,
            error_message: job.error_message,
            attempts: job.attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use launchpad_core::status::WorkflowState;
    use launchpad_db::models::proposal::ProposalOption;

    fn workflow(state: WorkflowState, expires_in_hours: i64) -> Workflow {
        let now = Utc::now();
        Workflow {
            id: launchpad_core::types::new_id(),
            state,
            intake: serde_json::from_value(serde_json::json!({
                "business_name": "Acme Plumbing",
                "email": "a@x.com",
                "business_type": "plumber",
            }))
            .unwrap(),
            proposal_id: None,
            selected_option: None,
            production_url: None,
            error_message: None,
            created_at: now,
            updated_at: now,
            expires_at: now + Duration::hours(expires_in_hours),
        }
    }

    #[test]
    fn scores_are_not_serialized() {
        let wf = workflow(WorkflowState::AwaitingSelection, 1);
        let now = wf.created_at;
        let proposal = Proposal {
            id: launchpad_core::types::new_id(),
            workflow_id: wf.id,
            status: ProposalStatus::Sent,
            options: vec![ProposalOption {
                index: 1,
                template_id: "trades-classic".into(),
                name: "Trusted Trades".into(),
                theme: ThemeDescriptor {
                    palette: "blue".into(),
                    primary_color: "#1e3a8a".into(),
                    accent_color: "#f59e0b".into(),
                    font_family: "Georgia, serif".into(),
                    layout: "hero-columns".into(),
                },
                score: 42,
                preview_url: Some("https://p1.example".into()),
                failure: None,
            }],
            selected_option: None,
            sent_at: Some(now),
            created_at: now,
            updated_at: now,
        };

        let view = WorkflowView::build(wf, Some(proposal), None, now);
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["state"], "AWAITING_SELECTION");
        assert_eq!(json["proposal"]["options"][0]["available"], true);
        assert!(json["proposal"]["options"][0].get("score").is_none());
        assert!(json["proposal"]["options"][0].get("template_id").is_none());
    }

    #[test]
    fn expired_pre_selection_workflow_reads_as_expired() {
        let wf = workflow(WorkflowState::AwaitingSelection, -1);
        let view = WorkflowView::build(wf, None, None, Utc::now());
        assert_eq!(view.state, ViewState::Expired);
    }
}

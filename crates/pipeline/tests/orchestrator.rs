mod common;

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use common::{acme, harness, Fault, HarnessBuilder, Outcome, OversizedBuilder};
use launchpad_core::status::{DeploymentState, ProposalStatus, WorkflowState};
use launchpad_core::types::{new_id, DbId};
use launchpad_core::workflow::ViewState;
use launchpad_db::models::selection::SourceMetadata;
use launchpad_db::models::workflow::WorkflowPatch;
use launchpad_db::Store;
use launchpad_events::event_types;
use launchpad_pipeline::{PipelineError, SelectionRequest};

fn select(workflow_id: DbId, chosen_option: i32) -> SelectionRequest {
    SelectionRequest {
        workflow_id,
        chosen_option,
        source: SourceMetadata {
            ip: Some("203.0.113.7".into()),
            user_agent: Some("test".into()),
            device: None,
        },
    }
}

// ---------------------------------------------------------------------------
// Happy path
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn intake_to_published_site() {
    let h = harness();
    let mut events = h.events.subscribe();

    let id = h.orchestrator.start_workflow(acme()).await.unwrap();
    h.orchestrator.wait_idle().await;

    let view = h.orchestrator.get_status(id).await.unwrap();
    assert_eq!(view.state, ViewState::AwaitingSelection);
    let proposal = view.proposal.expect("proposal");
    assert_eq!(proposal.status, ProposalStatus::Sent);
    assert_eq!(proposal.options.len(), 3);
    assert!(proposal.options.iter().all(|o| o.available && o.preview_url.is_some()));
    assert_eq!(h.notifier.templates(), ["proposal_ready"]);

    let ack = h.orchestrator.handle_selection(select(id, 2)).await.unwrap();
    assert_eq!(ack.state, WorkflowState::Selected);
    h.orchestrator.wait_idle().await;

    let view = h.orchestrator.get_status(id).await.unwrap();
    assert_eq!(view.state, ViewState::Completed);
    assert_eq!(view.selected_option, Some(2));
    let url = view.production_url.expect("production url");
    assert!(url.ends_with("-live.hosting.test"));
    let latest = view.latest_deployment.expect("latest deployment");
    assert_eq!(latest.target, "production");
    assert_eq!(latest.state, DeploymentState::Ready);
    assert_eq!(h.notifier.templates(), ["proposal_ready", "site_published"]);

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event.event_type);
    }
    assert_eq!(
        seen,
        [
            event_types::WORKFLOW_STARTED,
            event_types::PROPOSAL_GENERATED,
            event_types::WORKFLOW_AWAITING_SELECTION,
            event_types::WORKFLOW_SELECTED,
            event_types::WORKFLOW_COMPLETED,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn every_deploy_job_records_its_archive() {
    let h = harness();
    let id = h.orchestrator.start_workflow(acme()).await.unwrap();
    h.orchestrator.wait_idle().await;

    let jobs = h.store.deployments_for(id);
    assert_eq!(jobs.len(), 3);
    for job in &jobs {
        assert_eq!(job.state, DeploymentState::Ready);
        assert_eq!(job.archive_sha256.as_ref().map(String::len), Some(64));
        assert!(job.archive_bytes.unwrap_or_default() > 0);
        assert!(job.result_url.is_some());
    }
    assert_eq!(h.provider.uploads(), 3);
}

#[tokio::test(start_paused = true)]
async fn invalid_intake_is_rejected_synchronously() {
    let h = harness();
    let mut intake = acme();
    intake.email = "nope".into();
    let err = h.orchestrator.start_workflow(intake).await.unwrap_err();
    assert_matches!(err, PipelineError::Validation(_));
}

#[tokio::test(start_paused = true)]
async fn identical_intakes_create_independent_workflows() {
    let h = harness();
    let a = h.orchestrator.start_workflow(acme()).await.unwrap();
    let b = h.orchestrator.start_workflow(acme()).await.unwrap();
    assert_ne!(a, b);
    h.orchestrator.wait_idle().await;
    assert_eq!(h.orchestrator.get_status(b).await.unwrap().state, ViewState::AwaitingSelection);
}

#[tokio::test(start_paused = true)]
async fn unknown_business_type_fails_the_workflow() {
    let h = harness();
    let mut intake = acme();
    intake.business_type = "submarine-repair".into();
    let id = h.orchestrator.start_workflow(intake).await.unwrap();
    h.orchestrator.wait_idle().await;

    let view = h.orchestrator.get_status(id).await.unwrap();
    assert_eq!(view.state, ViewState::Failed);
    assert!(view.error_message.unwrap().contains("Insufficient templates"));
    assert_eq!(h.provider.uploads(), 0);
}

#[tokio::test(start_paused = true)]
async fn lost_transition_stops_the_stage() {
    let h = harness();
    let id = h.orchestrator.start_workflow(acme()).await.unwrap();
    // An operator fails the workflow before the proposal stage runs.
    h.store
        .compare_and_set_workflow(
            id,
            WorkflowState::Pending,
            WorkflowState::Failed,
            WorkflowPatch::error("cancelled by operator"),
        )
        .await
        .unwrap();
    h.orchestrator.wait_idle().await;

    let view = h.orchestrator.get_status(id).await.unwrap();
    assert_eq!(view.state, ViewState::Failed);
    assert_eq!(view.error_message.as_deref(), Some("cancelled by operator"));
    assert!(h.notifier.templates().is_empty());
}

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn out_of_range_option_is_a_validation_error() {
    let h = harness();
    let id = h.orchestrator.start_workflow(acme()).await.unwrap();
    h.orchestrator.wait_idle().await;

    let err = h.orchestrator.handle_selection(select(id, 5)).await.unwrap_err();
    assert_matches!(err, PipelineError::Validation(msg) if msg == "chosen_option must be between 1 and 3");
    let err = h.orchestrator.handle_selection(select(id, 0)).await.unwrap_err();
    assert_matches!(err, PipelineError::Validation(_));

    let view = h.orchestrator.get_status(id).await.unwrap();
    assert_eq!(view.state, ViewState::AwaitingSelection);
    assert_eq!(view.selected_option, None);
}

#[tokio::test(start_paused = true)]
async fn unknown_workflow_and_repeat_selection_look_the_same() {
    let h = harness();
    let err = h.orchestrator.handle_selection(select(new_id(), 1)).await.unwrap_err();
    assert_matches!(err, PipelineError::InvalidState);

    let id = h.orchestrator.start_workflow(acme()).await.unwrap();
    h.orchestrator.wait_idle().await;
    h.orchestrator.handle_selection(select(id, 1)).await.unwrap();
    let err = h.orchestrator.handle_selection(select(id, 1)).await.unwrap_err();
    assert_matches!(err, PipelineError::InvalidState);
    assert_eq!(err.to_string(), "Workflow not found or already selected");
}

#[tokio::test(start_paused = true)]
async fn selection_before_mockups_settle_is_rejected() {
    let h = HarnessBuilder::new().script("option-1", Outcome::Stall).build();
    let id = h.orchestrator.start_workflow(acme()).await.unwrap();

    let err = h.orchestrator.handle_selection(select(id, 1)).await.unwrap_err();
    assert_matches!(err, PipelineError::InvalidState);
    h.orchestrator.wait_idle().await;
}

#[tokio::test(start_paused = true)]
async fn concurrent_selections_have_one_winner() {
    let h = harness();
    let id = h.orchestrator.start_workflow(acme()).await.unwrap();
    h.orchestrator.wait_idle().await;

    let a = h.orchestrator.clone();
    let b = h.orchestrator.clone();
    let (first, second) = tokio::join!(
        tokio::spawn(async move { a.handle_selection(select(id, 1)).await }),
        tokio::spawn(async move { b.handle_selection(select(id, 3)).await }),
    );
    let results = [first.unwrap(), second.unwrap()];
    let winners: Vec<i32> = results
        .iter()
        .filter_map(|r| r.as_ref().ok().map(|ack| ack.chosen_option))
        .collect();
    assert_eq!(winners.len(), 1);
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(PipelineError::InvalidState))));

    let workflow = h.store.get_workflow(id).await.unwrap().unwrap();
    assert_eq!(workflow.selected_option, Some(winners[0]));
    let selection = h.store.get_selection(id).await.unwrap().unwrap();
    assert_eq!(selection.chosen_option, winners[0]);
    assert_eq!(selection.source.ip.as_deref(), Some("203.0.113.7"));
    h.orchestrator.wait_idle().await;
}

#[tokio::test(start_paused = true)]
async fn expired_workflow_reads_as_expired_and_rejects_late_selection() {
    let h = HarnessBuilder::new()
        .config(|c| {
            c.workflow_ttl_hours = 0;
            c.enforce_selection_expiry = true;
        })
        .build();
    let id = h.orchestrator.start_workflow(acme()).await.unwrap();
    h.orchestrator.wait_idle().await;

    assert_eq!(h.orchestrator.get_status(id).await.unwrap().state, ViewState::Expired);
    let err = h.orchestrator.handle_selection(select(id, 1)).await.unwrap_err();
    assert_matches!(err, PipelineError::InvalidState);
}

#[tokio::test(start_paused = true)]
async fn expiry_is_advisory_by_default() {
    let h = HarnessBuilder::new().config(|c| c.workflow_ttl_hours = 0).build();
    let id = h.orchestrator.start_workflow(acme()).await.unwrap();
    h.orchestrator.wait_idle().await;

    assert_eq!(h.orchestrator.get_status(id).await.unwrap().state, ViewState::Expired);
    h.orchestrator.handle_selection(select(id, 1)).await.unwrap();
    h.orchestrator.wait_idle().await;
    assert_eq!(h.orchestrator.get_status(id).await.unwrap().state, ViewState::Completed);
}

// ---------------------------------------------------------------------------
// Mockup failures
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn one_failed_mockup_yields_a_partial_proposal() {
    let h = HarnessBuilder::new()
        .script("option-2", Outcome::Fail("build exploded"))
        .build();
    let mut events = h.events.subscribe();
    let id = h.orchestrator.start_workflow(acme()).await.unwrap();
    h.orchestrator.wait_idle().await;

    let view = h.orchestrator.get_status(id).await.unwrap();
    assert_eq!(view.state, ViewState::AwaitingSelection);
    let proposal = h
        .store
        .get_proposal(view.proposal.as_ref().unwrap().id)
        .await
        .unwrap()
        .unwrap();
    // Delivered, so PARTIAL has moved on to SENT.
    assert_eq!(proposal.status, ProposalStatus::Sent);
    assert_eq!(proposal.ready_count(), 2);
    let failed = proposal.option(2).unwrap();
    assert!(failed.preview_url.is_none());
    assert!(failed.failure.as_deref().unwrap().contains("build exploded"));

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event.event_type);
    }
    assert!(seen.iter().any(|e| e == event_types::PROPOSAL_PARTIAL));

    let err = h.orchestrator.handle_selection(select(id, 2)).await.unwrap_err();
    assert_matches!(err, PipelineError::Validation(_));
    h.orchestrator.handle_selection(select(id, 3)).await.unwrap();
    h.orchestrator.wait_idle().await;
    assert_eq!(h.orchestrator.get_status(id).await.unwrap().state, ViewState::Completed);
}

#[tokio::test(start_paused = true)]
async fn partial_proposal_fails_workflow_when_disallowed() {
    let h = HarnessBuilder::new()
        .config(|c| c.allow_partial_proposals = false)
        .script("option-2", Outcome::Fail("build exploded"))
        .build();
    let id = h.orchestrator.start_workflow(acme()).await.unwrap();
    h.orchestrator.wait_idle().await;

    let view = h.orchestrator.get_status(id).await.unwrap();
    assert_eq!(view.state, ViewState::Failed);
    assert!(view.error_message.unwrap().contains("partial proposals are disabled"));
    // Withdrawn along with the workflow, so nothing can be selected from it.
    let proposal = view.proposal.unwrap();
    assert_eq!(proposal.status, ProposalStatus::Failed);
    let stored = h.store.get_proposal(proposal.id).await.unwrap().unwrap();
    assert!(!stored.status.accepts_selection());
    assert!(h.notifier.templates().is_empty());

    let err = h.orchestrator.handle_selection(select(id, 1)).await.unwrap_err();
    assert_matches!(err, PipelineError::InvalidState);
}

#[tokio::test(start_paused = true)]
async fn provider_error_is_not_retried_with_a_fresh_job() {
    let h = HarnessBuilder::new()
        .script("option-1", Outcome::Fail("bad bundle"))
        .build();
    let id = h.orchestrator.start_workflow(acme()).await.unwrap();
    h.orchestrator.wait_idle().await;

    let option_one: Vec<_> = h
        .store
        .deployments_for(id)
        .into_iter()
        .filter(|j| j.option_index == Some(1))
        .collect();
    assert_eq!(option_one.len(), 1);
    assert_eq!(option_one[0].state, DeploymentState::Error);
    assert!(option_one[0].error_message.as_deref().unwrap().contains("bad bundle"));
}

#[tokio::test(start_paused = true)]
async fn stalled_mockup_times_out_and_gets_one_fresh_job() {
    let h = HarnessBuilder::new()
        .config(|c| c.mockup_job_attempts = 2)
        .script("option-3", Outcome::Stall)
        .build();
    let id = h.orchestrator.start_workflow(acme()).await.unwrap();
    h.orchestrator.wait_idle().await;

    let option_three: Vec<_> = h
        .store
        .deployments_for(id)
        .into_iter()
        .filter(|j| j.option_index == Some(3))
        .collect();
    assert_eq!(option_three.len(), 2);
    assert!(option_three.iter().all(|j| j.state == DeploymentState::Timeout));
    assert!(option_three.iter().all(|j| j.attempts == 5));
    // One site per option, reused by the fresh job.
    assert_eq!(h.provider.sites_created(), 3);

    let view = h.orchestrator.get_status(id).await.unwrap();
    assert_eq!(view.state, ViewState::AwaitingSelection);
    assert_eq!(view.proposal.unwrap().options.iter().filter(|o| o.available).count(), 2);
}

#[tokio::test(start_paused = true)]
async fn fresh_job_waits_out_a_backoff() {
    let h = HarnessBuilder::new()
        .config(|c| {
            c.mockup_job_attempts = 2;
            c.retry.base_delay = Duration::from_secs(2);
            c.retry.max_delay = Duration::from_secs(2);
        })
        .script("option-3", Outcome::Stall)
        .build();
    h.orchestrator.start_workflow(acme()).await.unwrap();
    h.orchestrator.wait_idle().await;

    let starts = h.provider.deploy_starts("option-3");
    assert_eq!(starts.len(), 2);
    // Five polls one second apart span 4s; the jittered backoff adds at
    // least half of its 2s base.
    let gap = starts[1] - starts[0];
    assert!(gap >= Duration::from_secs(5), "fresh job started after {gap:?}");
}

#[tokio::test(start_paused = true)]
async fn oversized_bundle_never_reaches_upload() {
    let limit = 1024;
    let h = HarnessBuilder::new()
        .config(|c| c.packager.max_file_bytes = limit)
        .builder(Arc::new(OversizedBuilder { limit }))
        .build();
    let id = h.orchestrator.start_workflow(acme()).await.unwrap();
    h.orchestrator.wait_idle().await;

    assert_eq!(h.provider.uploads(), 0);
    assert_eq!(h.provider.sites_created(), 0);
    let jobs = h.store.deployments_for(id);
    assert_eq!(jobs.len(), 3);
    assert!(jobs.iter().all(|j| j.state == DeploymentState::Error));
    assert!(jobs[0].error_message.as_deref().unwrap().contains("Packaging failed"));

    let view = h.orchestrator.get_status(id).await.unwrap();
    assert_eq!(view.state, ViewState::Failed);
    assert_eq!(view.proposal.unwrap().status, ProposalStatus::Failed);
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn undelivered_notification_leaves_proposal_generated() {
    let h = HarnessBuilder::new().failing_notifier().build();
    let id = h.orchestrator.start_workflow(acme()).await.unwrap();
    h.orchestrator.wait_idle().await;

    let view = h.orchestrator.get_status(id).await.unwrap();
    assert_eq!(view.state, ViewState::AwaitingSelection);
    let proposal = view.proposal.unwrap();
    assert_eq!(proposal.status, ProposalStatus::Generated);
    assert!(proposal.sent_at.is_none());

    h.orchestrator.handle_selection(select(id, 1)).await.unwrap();
    h.orchestrator.wait_idle().await;
    assert_eq!(h.orchestrator.get_status(id).await.unwrap().state, ViewState::Completed);
}

// ---------------------------------------------------------------------------
// Production
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn production_failure_waits_for_operator_rerun() {
    let h = HarnessBuilder::new()
        .script("live", Outcome::Fail("quota exceeded"))
        .build();
    let mut events = h.events.subscribe();
    let id = h.orchestrator.start_workflow(acme()).await.unwrap();
    h.orchestrator.wait_idle().await;
    h.orchestrator.handle_selection(select(id, 1)).await.unwrap();
    h.orchestrator.wait_idle().await;

    let view = h.orchestrator.get_status(id).await.unwrap();
    assert_eq!(view.state, ViewState::Failed);
    assert_eq!(view.selected_option, Some(1));
    assert!(view.error_message.unwrap().contains("quota exceeded"));
    let production_jobs = h
        .store
        .deployments_for(id)
        .into_iter()
        .filter(|j| j.is_production())
        .count();
    assert_eq!(production_jobs, 1);

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event.event_type);
    }
    assert_eq!(seen.last().map(String::as_str), Some(event_types::WORKFLOW_FAILED));

    h.provider.script("live", Outcome::Ready);
    h.orchestrator.retry_production(id).await.unwrap();
    h.orchestrator.wait_idle().await;

    let view = h.orchestrator.get_status(id).await.unwrap();
    assert_eq!(view.state, ViewState::Completed);
    assert!(view.error_message.is_none());
    assert!(view.production_url.is_some());
}

#[tokio::test(start_paused = true)]
async fn rerun_requires_a_failed_workflow_with_a_selection() {
    let h = harness();
    let id = h.orchestrator.start_workflow(acme()).await.unwrap();
    h.orchestrator.wait_idle().await;
    let err = h.orchestrator.retry_production(id).await.unwrap_err();
    assert_matches!(err, PipelineError::InvalidState);

    let h = HarnessBuilder::new()
        .config(|c| c.allow_partial_proposals = false)
        .script("option-1", Outcome::Fail("x"))
        .build();
    let id = h.orchestrator.start_workflow(acme()).await.unwrap();
    h.orchestrator.wait_idle().await;
    assert_eq!(h.orchestrator.get_status(id).await.unwrap().state, ViewState::Failed);
    let err = h.orchestrator.retry_production(id).await.unwrap_err();
    assert_matches!(err, PipelineError::InvalidState);
}

#[tokio::test(start_paused = true)]
async fn unknown_workflow_status_is_not_found() {
    let h = harness();
    let missing = new_id();
    let err = h.orchestrator.get_status(missing).await.unwrap_err();
    assert_matches!(err, PipelineError::NotFound(id) if id == missing);
}

// ---------------------------------------------------------------------------
// Store faults
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn transient_store_timeouts_do_not_fail_the_workflow() {
    let h = HarnessBuilder::new()
        .store_faults("create_proposal", &[Fault::Before])
        .store_faults("create_deployment", &[Fault::Before])
        .store_faults("update_deployment", &[Fault::Before, Fault::Before])
        .store_faults("compare_and_set_proposal", &[Fault::Before])
        .store_faults("compare_and_set_workflow", &[Fault::Before])
        .build();
    let id = h.orchestrator.start_workflow(acme()).await.unwrap();
    h.orchestrator.wait_idle().await;

    assert_eq!(h.flaky.injected(), 6);
    let view = h.orchestrator.get_status(id).await.unwrap();
    assert_eq!(view.state, ViewState::AwaitingSelection);
    assert_eq!(view.error_message, None);
    let proposal = view.proposal.unwrap();
    assert_eq!(proposal.status, ProposalStatus::Sent);
    assert!(proposal.options.iter().all(|o| o.available));
}

#[tokio::test(start_paused = true)]
async fn timed_out_writes_that_landed_count_as_done() {
    let h = HarnessBuilder::new()
        .store_faults("compare_and_set_proposal", &[Fault::After])
        .store_faults("accept_selection", &[Fault::After])
        .build();
    let id = h.orchestrator.start_workflow(acme()).await.unwrap();
    h.orchestrator.wait_idle().await;

    let view = h.orchestrator.get_status(id).await.unwrap();
    assert_eq!(view.state, ViewState::AwaitingSelection);
    assert_eq!(view.proposal.unwrap().status, ProposalStatus::Sent);

    let ack = h.orchestrator.handle_selection(select(id, 1)).await.unwrap();
    assert_eq!(ack.chosen_option, 1);
    h.orchestrator.wait_idle().await;

    assert_eq!(h.flaky.injected(), 2);
    let view = h.orchestrator.get_status(id).await.unwrap();
    assert_eq!(view.state, ViewState::Completed);
    assert_eq!(view.selected_option, Some(1));
}

#[tokio::test(start_paused = true)]
async fn store_outage_beyond_the_retry_budget_fails_the_workflow() {
    // Test policy allows three retries, so four timeouts exhaust it.
    let h = HarnessBuilder::new()
        .store_faults("compare_and_set_proposal", &[Fault::Before; 4])
        .build();
    let id = h.orchestrator.start_workflow(acme()).await.unwrap();
    h.orchestrator.wait_idle().await;

    let view = h.orchestrator.get_status(id).await.unwrap();
    assert_eq!(view.state, ViewState::Failed);
    assert!(view.error_message.unwrap().contains("timed out"));
    assert_eq!(h.flaky.injected(), 4);
}

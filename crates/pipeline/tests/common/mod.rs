//! Shared harness for pipeline integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use launchpad_core::intake::Intake;
use launchpad_core::status::{ProposalStatus, WorkflowState};
use launchpad_core::templates::TemplateCatalog;
use launchpad_core::types::DbId;
use launchpad_db::models::deployment::{DeploymentJob, DeploymentPatch, NewDeployment};
use launchpad_db::models::proposal::{NewProposal, Proposal, ProposalPatch};
use launchpad_db::models::selection::SelectionEvent;
use launchpad_db::models::workflow::{NewWorkflow, Workflow, WorkflowPatch};
use launchpad_db::{MemoryStore, Store, StoreError};
use launchpad_events::{EventBus, Notification, Notifier, NotifyError};
use launchpad_hosting::{
    DeployInfo, DeployStatus, HostingProvider, PackagerConfig, PollConfig, ProviderDeployState,
    ProviderError, RetryPolicy, SiteBundle, SiteInfo,
};
use launchpad_pipeline::{
    BuildError, Orchestrator, PipelineConfig, PipelineDeps, ProjectData, SiteBuilder,
    StaticSiteBuilder,
};
use tokio::time::Instant;

// ---------------------------------------------------------------------------
// Hosting provider
// ---------------------------------------------------------------------------

/// How deploys to one site end.
#[derive(Debug, Clone)]
pub enum Outcome {
    Ready,
    Fail(&'static str),
    /// Stays `processing` forever.
    Stall,
}

/// Provider whose deploy outcomes are scripted per site-name suffix
/// (`option-2`, `live`). Unscripted sites go `ready` on the first poll.
#[derive(Default)]
pub struct SiteProvider {
    outcomes: Mutex<HashMap<String, Outcome>>,
    /// deploy id -> site name
    deploys: Mutex<HashMap<String, String>>,
    next_deploy: AtomicU32,
    /// site name and paused-clock time of every `create_deploy`
    deploy_starts: Mutex<Vec<(String, Instant)>>,
    pub create_site_calls: AtomicU32,
    pub upload_calls: AtomicU32,
}

impl SiteProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, suffix: &str, outcome: Outcome) {
        self.outcomes
            .lock()
            .unwrap()
            .insert(suffix.to_string(), outcome);
    }

    pub fn uploads(&self) -> u32 {
        self.upload_calls.load(Ordering::SeqCst)
    }

    pub fn sites_created(&self) -> u32 {
        self.create_site_calls.load(Ordering::SeqCst)
    }

    /// When each deploy to sites ending in `suffix` was created.
    pub fn deploy_starts(&self, suffix: &str) -> Vec<Instant> {
        self.deploy_starts
            .lock()
            .unwrap()
            .iter()
            .filter(|(site, _)| site.ends_with(suffix))
            .map(|(_, at)| *at)
            .collect()
    }

    fn outcome_for(&self, site: &str) -> Outcome {
        self.outcomes
            .lock()
            .unwrap()
            .iter()
            .find(|(suffix, _)| site.ends_with(suffix.as_str()))
            .map(|(_, outcome)| outcome.clone())
            .unwrap_or(Outcome::Ready)
    }
}

#[async_trait]
impl HostingProvider for SiteProvider {
    async fn create_site(&self, name: &str) -> Result<SiteInfo, ProviderError> {
        self.create_site_calls.fetch_add(1, Ordering::SeqCst);
        Ok(SiteInfo {
            id: name.to_string(),
            name: Some(name.to_string()),
            url: None,
        })
    }

    async fn create_deploy(&self, site_id: &str) -> Result<DeployInfo, ProviderError> {
        let n = self.next_deploy.fetch_add(1, Ordering::SeqCst);
        let id = format!("deploy-{n}");
        self.deploy_starts
            .lock()
            .unwrap()
            .push((site_id.to_string(), Instant::now()));
        self.deploys
            .lock()
            .unwrap()
            .insert(id.clone(), site_id.to_string());
        Ok(DeployInfo { id })
    }

    async fn upload_archive(&self, _deploy_id: &str, archive: &[u8]) -> Result<(), ProviderError> {
        assert!(!archive.is_empty());
        self.upload_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get_deploy_status(&self, deploy_id: &str) -> Result<DeployStatus, ProviderError> {
        let site = self
            .deploys
            .lock()
            .unwrap()
            .get(deploy_id)
            .cloned()
            .ok_or_else(|| ProviderError::Api {
                status: 404,
                body: format!("no deploy {deploy_id}"),
            })?;
        let status = match self.outcome_for(&site) {
            Outcome::Ready => DeployStatus {
                state: ProviderDeployState::Ready,
                url: Some(format!("https://{site}.hosting.test")),
                error_message: None,
            },
            Outcome::Fail(message) => DeployStatus {
                state: ProviderDeployState::Error,
                url: None,
                error_message: Some(message.to_string()),
            },
            Outcome::Stall => DeployStatus {
                state: ProviderDeployState::Processing,
                url: None,
                error_message: None,
            },
        };
        Ok(status)
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// When an injected timeout is reported relative to the real write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// The call times out before reaching the store.
    Before,
    /// The write lands, then the caller sees a timeout.
    After,
}

/// [`MemoryStore`] wrapper that reports `StoreError::Timeout` for the next
/// scripted calls of an operation.
pub struct FlakyStore {
    inner: Arc<MemoryStore>,
    faults: Mutex<HashMap<&'static str, Vec<Fault>>>,
    injected: AtomicU32,
}

impl FlakyStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            faults: Mutex::new(HashMap::new()),
            injected: AtomicU32::new(0),
        }
    }

    pub fn fail(&self, operation: &'static str, faults: &[Fault]) {
        self.faults
            .lock()
            .unwrap()
            .entry(operation)
            .or_default()
            .extend_from_slice(faults);
    }

    pub fn injected(&self) -> u32 {
        self.injected.load(Ordering::SeqCst)
    }

    fn next_fault(&self, operation: &'static str) -> Option<Fault> {
        let mut faults = self.faults.lock().unwrap();
        let queue = faults.get_mut(operation)?;
        if queue.is_empty() {
            return None;
        }
        self.injected.fetch_add(1, Ordering::SeqCst);
        Some(queue.remove(0))
    }

    async fn call<T>(
        &self,
        operation: &'static str,
        write: impl std::future::Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        let timeout = StoreError::Timeout(Duration::from_secs(5));
        match self.next_fault(operation) {
            None => write.await,
            Some(Fault::Before) => Err(timeout),
            Some(Fault::After) => {
                write.await?;
                Err(timeout)
            }
        }
    }
}

#[async_trait]
impl Store for FlakyStore {
    async fn health_check(&self) -> Result<(), StoreError> {
        self.inner.health_check().await
    }

    async fn create_workflow(&self, input: NewWorkflow) -> Result<Workflow, StoreError> {
        self.inner.create_workflow(input).await
    }

    async fn get_workflow(&self, id: DbId) -> Result<Option<Workflow>, StoreError> {
        self.inner.get_workflow(id).await
    }

    async fn compare_and_set_workflow(
        &self,
        id: DbId,
        expected: WorkflowState,
        next: WorkflowState,
        patch: WorkflowPatch,
    ) -> Result<Workflow, StoreError> {
        self.call(
            "compare_and_set_workflow",
            self.inner.compare_and_set_workflow(id, expected, next, patch),
        )
        .await
    }

    async fn create_proposal(&self, input: NewProposal) -> Result<Proposal, StoreError> {
        self.call("create_proposal", self.inner.create_proposal(input))
            .await
    }

    async fn get_proposal(&self, id: DbId) -> Result<Option<Proposal>, StoreError> {
        self.call("get_proposal", self.inner.get_proposal(id)).await
    }

    async fn compare_and_set_proposal(
        &self,
        id: DbId,
        expected: ProposalStatus,
        next: ProposalStatus,
        patch: ProposalPatch,
    ) -> Result<Proposal, StoreError> {
        self.call(
            "compare_and_set_proposal",
            self.inner.compare_and_set_proposal(id, expected, next, patch),
        )
        .await
    }

    async fn create_deployment(&self, input: NewDeployment) -> Result<DeploymentJob, StoreError> {
        self.call("create_deployment", self.inner.create_deployment(input))
            .await
    }

    async fn update_deployment(
        &self,
        id: DbId,
        patch: DeploymentPatch,
    ) -> Result<DeploymentJob, StoreError> {
        self.call("update_deployment", self.inner.update_deployment(id, patch))
            .await
    }

    async fn latest_deployment(
        &self,
        workflow_id: DbId,
    ) -> Result<Option<DeploymentJob>, StoreError> {
        self.inner.latest_deployment(workflow_id).await
    }

    async fn accept_selection(
        &self,
        event: SelectionEvent,
        proposal_id: DbId,
    ) -> Result<(), StoreError> {
        self.call(
            "accept_selection",
            self.inner.accept_selection(event, proposal_id),
        )
        .await
    }

    async fn get_selection(&self, workflow_id: DbId) -> Result<Option<SelectionEvent>, StoreError> {
        self.inner.get_selection(workflow_id).await
    }
}

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<Notification>>,
    pub fail: bool,
}

impl RecordingNotifier {
    pub fn templates(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|n| n.template_id.clone())
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        if self.fail {
            return Err(NotifyError::Disabled);
        }
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

/// Emits one file just over the packager's per-file limit.
pub struct OversizedBuilder {
    pub limit: u64,
}

impl SiteBuilder for OversizedBuilder {
    fn build(&self, _project: &ProjectData) -> Result<SiteBundle, BuildError> {
        let mut bundle = SiteBundle::new();
        bundle.insert("index.html".into(), vec![b'a'; self.limit as usize + 1]);
        Ok(bundle)
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub orchestrator: Orchestrator,
    pub store: Arc<MemoryStore>,
    /// The store the orchestrator writes through; faults are injected here.
    pub flaky: Arc<FlakyStore>,
    pub provider: Arc<SiteProvider>,
    pub notifier: Arc<RecordingNotifier>,
    pub events: Arc<EventBus>,
}

/// Short poll budget and retry delays; tests run on paused time anyway.
pub fn test_config() -> PipelineConfig {
    PipelineConfig {
        request_timeout: Duration::from_secs(5),
        retry: RetryPolicy {
            max_retries: 2,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(40),
            ..RetryPolicy::default()
        },
        poll: PollConfig {
            interval: Duration::from_secs(1),
            timeout: Duration::from_secs(10),
            max_attempts: 5,
        },
        store_retry: RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(20),
            max_delay: Duration::from_millis(80),
            ..RetryPolicy::default()
        },
        packager: PackagerConfig::default(),
        ..PipelineConfig::default()
    }
}

pub struct HarnessBuilder {
    config: PipelineConfig,
    faults: Vec<(&'static str, Vec<Fault>)>,
    provider: Arc<SiteProvider>,
    notifier: RecordingNotifier,
    builder: Arc<dyn SiteBuilder>,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            config: test_config(),
            faults: Vec::new(),
            provider: SiteProvider::new(),
            notifier: RecordingNotifier::default(),
            builder: Arc::new(StaticSiteBuilder),
        }
    }

    pub fn config(mut self, f: impl FnOnce(&mut PipelineConfig)) -> Self {
        f(&mut self.config);
        self
    }

    pub fn script(self, suffix: &str, outcome: Outcome) -> Self {
        self.provider.script(suffix, outcome);
        self
    }

    /// Inject timeouts into the next calls of a store operation.
    pub fn store_faults(mut self, operation: &'static str, faults: &[Fault]) -> Self {
        self.faults.push((operation, faults.to_vec()));
        self
    }

    pub fn failing_notifier(mut self) -> Self {
        self.notifier.fail = true;
        self
    }

    pub fn builder(mut self, builder: Arc<dyn SiteBuilder>) -> Self {
        self.builder = builder;
        self
    }

    pub fn build(self) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let flaky = Arc::new(FlakyStore::new(store.clone()));
        for (operation, faults) in &self.faults {
            flaky.fail(*operation, faults);
        }
        let notifier = Arc::new(self.notifier);
        let events = Arc::new(EventBus::default());
        let orchestrator = Orchestrator::new(
            PipelineDeps {
                store: flaky.clone(),
                provider: self.provider.clone(),
                builder: self.builder,
                catalog: TemplateCatalog::builtin(),
                notifier: notifier.clone(),
                events: events.clone(),
            },
            self.config,
        );
        Harness {
            orchestrator,
            store,
            flaky,
            provider: self.provider,
            notifier,
            events,
        }
    }
}

pub fn harness() -> Harness {
    HarnessBuilder::new().build()
}

pub fn acme() -> Intake {
    serde_json::from_value(serde_json::json!({
        "businessName": "Acme Plumbing",
        "email": "a@x.com",
        "businessType": "plumber",
    }))
    .unwrap()
}

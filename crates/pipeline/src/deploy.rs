//! Deploy runner: one build, package, upload and poll cycle per
//! [`DeploymentJob`], recorded in the store as it progresses.

use std::sync::Arc;

use async_trait::async_trait;
use launchpad_core::status::DeploymentState;
use launchpad_core::types::DbId;
use launchpad_db::models::deployment::{DeploymentJob, DeploymentPatch, NewDeployment};
use launchpad_db::{Store, StoreError};
use launchpad_hosting::{
    Archive, DeployClient, DeployClientError, DeployStatus, DeploymentPoller, Packager,
    PackagingError, PollError, PollObserver, RetryPolicy,
};

use crate::builder::{BuildError, ProjectData, SiteBuilder};
use crate::store_retry::StoreRetry;

/// Longest business-name slug used in provider site names.
const MAX_SLUG_LEN: usize = 40;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// What a deployment is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployTarget {
    /// Preview of proposal option `n` (1-based).
    Mockup(i32),
    Production,
}

impl DeployTarget {
    pub fn option_index(self) -> Option<i32> {
        match self {
            Self::Mockup(n) => Some(n),
            Self::Production => None,
        }
    }

    /// Provider site name: `<slug>-<short id>-option-<n>` or `-live`.
    pub fn site_name(self, business_name: &str, workflow_id: DbId) -> String {
        let simple = workflow_id.simple().to_string();
        // UUIDv7 leads with the timestamp; the tail is random.
        let short_id = &simple[simple.len() - 8..];
        let suffix = match self {
            Self::Mockup(n) => format!("option-{n}"),
            Self::Production => "live".to_string(),
        };
        format!("{}-{short_id}-{suffix}", slugify(business_name))
    }
}

/// A deploy that reached `READY`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployResult {
    pub job_id: DbId,
    pub url: String,
}

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Site build failed: {0}")]
    Build(#[from] BuildError),

    #[error("Packaging failed: {0}")]
    Packaging(#[from] PackagingError),

    #[error(transparent)]
    Client(#[from] DeployClientError),

    /// Provider reported `error`.
    #[error("Deploy failed: {0}")]
    Failed(String),

    #[error("Deploy timed out after {attempts} status poll(s)")]
    Timeout { attempts: u32 },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Build task aborted: {0}")]
    Join(String),
}

impl JobError {
    /// Whether a fresh deploy job may succeed where this one did not.
    ///
    /// Only timeouts and exhausted transient provider errors qualify; a
    /// provider-reported failure or a bad bundle would fail identically.
    pub fn allows_fresh_job(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Client(e) => e.retryable,
            _ => false,
        }
    }

    fn final_state(&self) -> DeploymentState {
        match self {
            Self::Timeout { .. } => DeploymentState::Timeout,
            _ => DeploymentState::Error,
        }
    }
}

impl From<PollError> for JobError {
    fn from(err: PollError) -> Self {
        match err {
            PollError::Failed { message, .. } => Self::Failed(message),
            PollError::Timeout { attempts, .. } => Self::Timeout { attempts },
            PollError::Client(e) => Self::Client(e),
        }
    }
}

// ---------------------------------------------------------------------------
// DeploymentRunner
// ---------------------------------------------------------------------------

pub struct DeploymentRunner {
    store: Arc<dyn Store>,
    store_retry: StoreRetry,
    builder: Arc<dyn SiteBuilder>,
    packager: Packager,
    client: DeployClient,
    poller: DeploymentPoller,
    /// Delay before each fresh job.
    job_backoff: RetryPolicy,
}

impl DeploymentRunner {
    pub fn new(
        store: Arc<dyn Store>,
        store_retry: RetryPolicy,
        builder: Arc<dyn SiteBuilder>,
        packager: Packager,
        client: DeployClient,
        poller: DeploymentPoller,
        job_backoff: RetryPolicy,
    ) -> Self {
        Self {
            store,
            store_retry: StoreRetry::new(store_retry),
            builder,
            packager,
            client,
            poller,
            job_backoff,
        }
    }

    /// Deploy `project` for `target`, starting a fresh job after a timeout
    /// or exhausted transient error, up to `max_jobs` jobs in total. Fresh
    /// jobs wait out a jittered backoff first.
    ///
    /// The provider site is created once and reused by later jobs.
    pub async fn deploy(
        &self,
        target: DeployTarget,
        project: &ProjectData,
        max_jobs: u32,
    ) -> Result<DeployResult, JobError> {
        let mut site_id: Option<String> = None;
        let mut jobs = 0u32;
        loop {
            jobs += 1;
            let job = self
                .store_retry
                .run("create_deployment", || {
                    self.store.create_deployment(NewDeployment {
                        workflow_id: project.workflow_id,
                        option_index: target.option_index(),
                    })
                })
                .await?;

            match self.run_job(&job, target, project, &mut site_id).await {
                Ok(url) => {
                    return Ok(DeployResult {
                        job_id: job.id,
                        url,
                    })
                }
                Err(err) => {
                    self.record_failure(&job, &err).await;
                    if !err.allows_fresh_job() || jobs >= max_jobs {
                        return Err(err);
                    }
                    let delay = self.job_backoff.jittered(jobs - 1);
                    tracing::warn!(
                        workflow_id = %project.workflow_id,
                        job_id = %job.id,
                        option_index = ?target.option_index(),
                        jobs,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Deploy job failed, starting a fresh one",
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn run_job(
        &self,
        job: &DeploymentJob,
        target: DeployTarget,
        project: &ProjectData,
        site_id: &mut Option<String>,
    ) -> Result<String, JobError> {
        let archive = self.build_archive(project).await?;

        let site = match site_id.as_ref() {
            Some(id) => id.clone(),
            None => {
                let name = target.site_name(&project.business.business_name, project.workflow_id);
                let site = self.client.create_site(&name).await?;
                *site_id = Some(site.id.clone());
                site.id
            }
        };
        let deploy = self.client.create_deploy(&site).await?;

        self.update_job(
            job.id,
            DeploymentPatch {
                provider_site_id: Some(site),
                provider_deploy_id: Some(deploy.id.clone()),
                archive_sha256: Some(archive.sha256.clone()),
                archive_bytes: Some(archive.size() as i64),
                ..DeploymentPatch::state(DeploymentState::Uploading)
            },
        )
        .await?;

        self.client.upload_archive(&deploy.id, &archive.bytes).await?;
        tracing::debug!(
            job_id = %job.id,
            deploy_id = %deploy.id,
            bytes = archive.size(),
            "Archive uploaded",
        );

        let progress = JobProgress {
            store: self.store.as_ref(),
            job_id: job.id,
        };
        let outcome = self.poller.wait_until_terminal(&deploy.id, &progress).await?;

        self.update_job(
            job.id,
            DeploymentPatch {
                result_url: Some(outcome.url.clone()),
                attempts: Some(outcome.attempts as i32),
                ..DeploymentPatch::state(DeploymentState::Ready)
            },
        )
        .await?;
        Ok(outcome.url)
    }

    /// Patches are absolute values, so repeating one is harmless.
    async fn update_job(
        &self,
        job_id: DbId,
        patch: DeploymentPatch,
    ) -> Result<DeploymentJob, StoreError> {
        self.store_retry
            .run("update_deployment", || {
                self.store.update_deployment(job_id, patch.clone())
            })
            .await
    }

    /// Render and package off the async runtime. The bundle lives only
    /// inside this call.
    async fn build_archive(&self, project: &ProjectData) -> Result<Archive, JobError> {
        let builder = Arc::clone(&self.builder);
        let packager = self.packager;
        let project = project.clone();
        tokio::task::spawn_blocking(move || -> Result<Archive, JobError> {
            let bundle = builder.build(&project)?;
            Ok(packager.package(&bundle)?)
        })
        .await
        .map_err(|e| JobError::Join(e.to_string()))?
    }

    async fn record_failure(&self, job: &DeploymentJob, err: &JobError) {
        let attempts = match err {
            JobError::Timeout { attempts } => Some(*attempts as i32),
            _ => None,
        };
        let patch = DeploymentPatch {
            error_message: Some(err.to_string()),
            attempts,
            ..DeploymentPatch::state(err.final_state())
        };
        if let Err(e) = self.update_job(job.id, patch).await {
            tracing::error!(job_id = %job.id, error = %e, "Failed to record deploy failure");
        }
    }
}

/// Persists poll progress onto the job row.
struct JobProgress<'a> {
    store: &'a dyn Store,
    job_id: DbId,
}

#[async_trait]
impl PollObserver for JobProgress<'_> {
    async fn observe(&self, attempt: u32, status: &DeployStatus) {
        let state = DeploymentState::from(status.state);
        // Terminal states are written by the runner together with their
        // URL or error.
        let patch = DeploymentPatch {
            state: (!state.is_terminal()).then_some(state),
            attempts: Some(attempt as i32),
            ..DeploymentPatch::default()
        };
        if let Err(e) = self.store.update_deployment(self.job_id, patch).await {
            tracing::warn!(job_id = %self.job_id, attempt, error = %e, "Failed to record poll progress");
        }
    }
}

/// Lower-case ASCII alphanumerics joined by single hyphens.
fn slugify(raw: &str) -> String {
    let mut slug = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.truncate(MAX_SLUG_LEN);
    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        "site".to_string()
    } else {
        slug.to_string()
    }
}

//! Deployment job record: one upload-and-poll cycle against the provider.

use launchpad_core::status::DeploymentState;
use launchpad_core::types::{DbId, Timestamp};
use serde::Serialize;

/// A row from the `deployment_jobs` table.
///
/// The bundle itself is never persisted; only its archive digest and size.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeploymentJob {
    pub id: DbId,
    pub workflow_id: DbId,
    /// `None` for the production deploy, `Some(n)` for mockup option `n`.
    pub option_index: Option<i32>,
    pub state: DeploymentState,
    pub provider_site_id: Option<String>,
    pub provider_deploy_id: Option<String>,
    pub archive_sha256: Option<String>,
    pub archive_bytes: Option<i64>,
    /// Populated only on `READY`.
    pub result_url: Option<String>,
    pub error_message: Option<String>,
    /// Status polls issued so far.
    pub attempts: i32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl DeploymentJob {
    pub fn is_production(&self) -> bool {
        self.option_index.is_none()
    }
}

/// DTO for creating a job in `CREATED`.
#[derive(Debug, Clone, Copy)]
pub struct NewDeployment {
    pub workflow_id: DbId,
    pub option_index: Option<i32>,
}

/// Partial update for a deployment job. `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct DeploymentPatch {
    pub state: Option<DeploymentState>,
    pub provider_site_id: Option<String>,
    pub provider_deploy_id: Option<String>,
    pub archive_sha256: Option<String>,
    pub archive_bytes: Option<i64>,
    pub result_url: Option<String>,
    pub error_message: Option<String>,
    pub attempts: Option<i32>,
}

impl DeploymentPatch {
    pub fn state(state: DeploymentState) -> Self {
        Self {
            state: Some(state),
            ..Self::default()
        }
    }

    pub fn apply_to(self, job: &mut DeploymentJob) {
        if let Some(state) = self.state {
            job.state = state;
        }
        if let Some(v) = self.provider_site_id {
            job.provider_site_id = Some(v);
        }
        if let Some(v) = self.provider_deploy_id {
            job.provider_deploy_id = Some(v);
        }
        if let Some(v) = self.archive_sha256 {
            job.archive_sha256 = Some(v);
        }
        if let Some(v) = self.archive_bytes {
            job.archive_bytes = Some(v);
        }
        if let Some(v) = self.result_url {
            job.result_url = Some(v);
        }
        if let Some(v) = self.error_message {
            job.error_message = Some(v);
        }
        if let Some(v) = self.attempts {
            job.attempts = v;
        }
    }
}

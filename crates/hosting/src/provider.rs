//! The hosting provider seam and its wire types.

use async_trait::async_trait;
use launchpad_core::status::DeploymentState;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// Response of `POST /sites`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteInfo {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

/// Response of `POST /sites/{id}/deploys`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployInfo {
    pub id: String,
}

/// Deploy state as reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderDeployState {
    Uploading,
    Processing,
    Ready,
    Error,
}

impl ProviderDeployState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Ready | Self::Error)
    }
}

impl From<ProviderDeployState> for DeploymentState {
    fn from(state: ProviderDeployState) -> Self {
        match state {
            ProviderDeployState::Uploading => DeploymentState::Uploading,
            ProviderDeployState::Processing => DeploymentState::Processing,
            ProviderDeployState::Ready => DeploymentState::Ready,
            ProviderDeployState::Error => DeploymentState::Error,
        }
    }
}

/// Response of `GET /deploys/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployStatus {
    pub state: ProviderDeployState,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// The four operations the pipeline needs from a static hosting provider.
///
/// Implementations make exactly one remote call per method; timeouts and
/// retries are layered on by [`DeployClient`](crate::client::DeployClient).
#[async_trait]
pub trait HostingProvider: Send + Sync + 'static {
    async fn create_site(&self, name: &str) -> Result<SiteInfo, ProviderError>;

    async fn create_deploy(&self, site_id: &str) -> Result<DeployInfo, ProviderError>;

    /// Upload the zip archive for a deploy. Re-uploading to the same deploy
    /// replaces the previous upload.
    async fn upload_archive(&self, deploy_id: &str, archive: &[u8]) -> Result<(), ProviderError>;

    async fn get_deploy_status(&self, deploy_id: &str) -> Result<DeployStatus, ProviderError>;
}

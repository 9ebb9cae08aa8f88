//! [`DeploymentPoller`]: drive an uploaded deploy to a terminal state.
//!
//! The loop carries its attempt count and deadline explicitly. Time comes
//! from `tokio::time`, so tests run it on a paused clock.

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::client::{DeployClient, DeployClientError};
use crate::provider::{DeployStatus, ProviderDeployState};

/// Bounds on one polling run.
#[derive(Debug, Clone)]
pub struct PollConfig {
    pub interval: Duration,
    /// Wall-clock budget measured from the first poll.
    pub timeout: Duration,
    pub max_attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            timeout: Duration::from_secs(120),
            max_attempts: 60,
        }
    }
}

/// A deploy that reached `ready`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollOutcome {
    pub url: String,
    pub attempts: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum PollError {
    /// The provider reported `error`. The deploy cannot be resumed.
    #[error("Deploy {deploy_id} failed: {message}")]
    Failed {
        deploy_id: String,
        message: String,
        attempts: u32,
    },

    /// The deploy was still in progress when the budget ran out.
    #[error("Deploy {deploy_id} did not finish after {attempts} poll(s) in {elapsed:?}")]
    Timeout {
        deploy_id: String,
        attempts: u32,
        elapsed: Duration,
    },

    /// Status could not be read even after the client's retries.
    #[error(transparent)]
    Client(#[from] DeployClientError),
}

/// Receives every status read, e.g. to persist progress.
#[async_trait]
pub trait PollObserver: Send + Sync {
    async fn observe(&self, attempt: u32, status: &DeployStatus);
}

#[async_trait]
impl PollObserver for () {
    async fn observe(&self, _attempt: u32, _status: &DeployStatus) {}
}

pub struct DeploymentPoller {
    client: DeployClient,
    config: PollConfig,
}

impl DeploymentPoller {
    pub fn new(client: DeployClient, config: PollConfig) -> Self {
        Self { client, config }
    }

    /// Poll `deploy_id` until it is `ready` or `error`, or the attempt or
    /// wall-clock budget is spent. Must only be called after the upload
    /// was acknowledged.
    pub async fn wait_until_terminal(
        &self,
        deploy_id: &str,
        observer: &dyn PollObserver,
    ) -> Result<PollOutcome, PollError> {
        let started = Instant::now();
        let deadline = started + self.config.timeout;
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let status = match tokio::time::timeout_at(
                deadline,
                self.client.get_deploy_status(deploy_id),
            )
            .await
            {
                Ok(status) => status?,
                Err(_) => return Err(self.timed_out(deploy_id, attempts, started)),
            };
            observer.observe(attempts, &status).await;

            match status.state {
                ProviderDeployState::Ready => {
                    let Some(url) = status.url.filter(|u| !u.is_empty()) else {
                        return Err(PollError::Failed {
                            deploy_id: deploy_id.to_string(),
                            message: "provider reported ready without a URL".into(),
                            attempts,
                        });
                    };
                    tracing::info!(deploy_id, attempts, url = %url, "Deploy ready");
                    return Ok(PollOutcome { url, attempts });
                }
                ProviderDeployState::Error => {
                    let message = status
                        .error_message
                        .unwrap_or_else(|| "provider reported error".into());
                    tracing::warn!(deploy_id, attempts, error = %message, "Deploy failed");
                    return Err(PollError::Failed {
                        deploy_id: deploy_id.to_string(),
                        message,
                        attempts,
                    });
                }
                ProviderDeployState::Uploading | ProviderDeployState::Processing => {}
            }

            if attempts >= self.config.max_attempts {
                return Err(self.timed_out(deploy_id, attempts, started));
            }
            let next = Instant::now() + self.config.interval;
            if next >= deadline {
                tokio::time::sleep_until(deadline).await;
                return Err(self.timed_out(deploy_id, attempts, started));
            }
            tokio::time::sleep_until(next).await;
        }
    }

    fn timed_out(&self, deploy_id: &str, attempts: u32, started: Instant) -> PollError {
        let elapsed = started.elapsed();
        tracing::warn!(deploy_id, attempts, elapsed_ms = elapsed.as_millis() as u64, "Deploy poll timed out");
        PollError::Timeout {
            deploy_id: deploy_id.to_string(),
            attempts,
            elapsed,
        }
    }
}

//! [`DeployClient`]: timeout and retry around a [`HostingProvider`].
//!
//! Each operation is bounded by a per-attempt timeout. Transient failures
//! (network, timeout, 5xx, 429) are retried with [`RetryPolicy`] backoff;
//! anything else fails on the first attempt with `retryable: false`. The
//! client keeps no state between calls.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::error::ProviderError;
use crate::provider::{DeployInfo, DeployStatus, HostingProvider, SiteInfo};
use crate::retry::RetryPolicy;

/// A provider operation that failed for good.
#[derive(Debug, thiserror::Error)]
#[error("{operation} failed after {attempts} attempt(s): {source}")]
pub struct DeployClientError {
    pub operation: &'static str,
    pub attempts: u32,
    /// Whether the last failure was transient, i.e. the retry budget ran
    /// out rather than the provider rejecting the request.
    pub retryable: bool,
    #[source]
    pub source: ProviderError,
}

#[derive(Clone)]
pub struct DeployClient {
    provider: Arc<dyn HostingProvider>,
    retry: RetryPolicy,
    request_timeout: Duration,
}

impl DeployClient {
    pub fn new(
        provider: Arc<dyn HostingProvider>,
        retry: RetryPolicy,
        request_timeout: Duration,
    ) -> Self {
        Self {
            provider,
            retry,
            request_timeout,
        }
    }

    pub async fn create_site(&self, name: &str) -> Result<SiteInfo, DeployClientError> {
        self.call("create_site", || self.provider.create_site(name))
            .await
    }

    pub async fn create_deploy(&self, site_id: &str) -> Result<DeployInfo, DeployClientError> {
        self.call("create_deploy", || self.provider.create_deploy(site_id))
            .await
    }

    /// Safe to repeat for the same deploy after a timeout.
    pub async fn upload_archive(
        &self,
        deploy_id: &str,
        archive: &[u8],
    ) -> Result<(), DeployClientError> {
        self.call("upload_archive", || {
            self.provider.upload_archive(deploy_id, archive)
        })
        .await
    }

    pub async fn get_deploy_status(
        &self,
        deploy_id: &str,
    ) -> Result<DeployStatus, DeployClientError> {
        self.call("get_deploy_status", || {
            self.provider.get_deploy_status(deploy_id)
        })
        .await
    }

    async fn call<T, F, Fut>(
        &self,
        operation: &'static str,
        mut attempt_fn: F,
    ) -> Result<T, DeployClientError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let result = match tokio::time::timeout(self.request_timeout, attempt_fn()).await {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout),
            };

            let err = match result {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            let retryable = err.is_retryable();
            if !retryable || attempts > self.retry.max_retries {
                tracing::warn!(operation, attempts, retryable, error = %err, "Hosting call failed");
                return Err(DeployClientError {
                    operation,
                    attempts,
                    retryable,
                    source: err,
                });
            }

            let delay = self.retry.jittered(attempts - 1);
            tracing::debug!(
                operation,
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Transient hosting failure, retrying",
            );
            tokio::time::sleep(delay).await;
        }
    }
}

//! Shared test helpers for hosting integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use launchpad_hosting::{
    DeployClient, DeployInfo, DeployStatus, HostingProvider, ProviderDeployState, ProviderError,
    RetryPolicy, SiteInfo,
};

/// Provider whose answers are scripted per operation.
///
/// Scripted results are consumed in order; once a queue is empty the
/// operation succeeds with a default answer (`processing` for status).
#[derive(Default)]
pub struct ScriptedProvider {
    pub sites: Mutex<VecDeque<Result<SiteInfo, ProviderError>>>,
    pub deploys: Mutex<VecDeque<Result<DeployInfo, ProviderError>>>,
    pub uploads: Mutex<VecDeque<Result<(), ProviderError>>>,
    pub statuses: Mutex<VecDeque<Result<DeployStatus, ProviderError>>>,
    pub create_site_calls: AtomicU32,
    pub upload_calls: AtomicU32,
    pub status_calls: AtomicU32,
}

impl ScriptedProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_status(&self, status: Result<DeployStatus, ProviderError>) {
        self.statuses.lock().unwrap().push_back(status);
    }

    pub fn push_upload(&self, result: Result<(), ProviderError>) {
        self.uploads.lock().unwrap().push_back(result);
    }

    pub fn push_site(&self, result: Result<SiteInfo, ProviderError>) {
        self.sites.lock().unwrap().push_back(result);
    }
}

pub fn status(state: ProviderDeployState) -> DeployStatus {
    DeployStatus {
        state,
        url: None,
        error_message: None,
    }
}

pub fn ready(url: &str) -> DeployStatus {
    DeployStatus {
        state: ProviderDeployState::Ready,
        url: Some(url.to_string()),
        error_message: None,
    }
}

pub fn api_error(status: u16) -> ProviderError {
    ProviderError::Api {
        status,
        body: format!("status {status}"),
    }
}

#[async_trait]
impl HostingProvider for ScriptedProvider {
    async fn create_site(&self, name: &str) -> Result<SiteInfo, ProviderError> {
        self.create_site_calls.fetch_add(1, Ordering::SeqCst);
        self.sites.lock().unwrap().pop_front().unwrap_or_else(|| {
            Ok(SiteInfo {
                id: format!("site-{name}"),
                name: Some(name.to_string()),
                url: None,
            })
        })
    }

    async fn create_deploy(&self, site_id: &str) -> Result<DeployInfo, ProviderError> {
        self.deploys.lock().unwrap().pop_front().unwrap_or_else(|| {
            Ok(DeployInfo {
                id: format!("deploy-{site_id}"),
            })
        })
    }

    async fn upload_archive(&self, _deploy_id: &str, _archive: &[u8]) -> Result<(), ProviderError> {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);
        self.uploads.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }

    async fn get_deploy_status(&self, _deploy_id: &str) -> Result<DeployStatus, ProviderError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        self.statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(status(ProviderDeployState::Processing)))
    }
}

/// Provider that never answers.
pub struct HangingProvider;

#[async_trait]
impl HostingProvider for HangingProvider {
    async fn create_site(&self, _name: &str) -> Result<SiteInfo, ProviderError> {
        std::future::pending().await
    }

    async fn create_deploy(&self, _site_id: &str) -> Result<DeployInfo, ProviderError> {
        std::future::pending().await
    }

    async fn upload_archive(&self, _deploy_id: &str, _archive: &[u8]) -> Result<(), ProviderError> {
        std::future::pending().await
    }

    async fn get_deploy_status(&self, _deploy_id: &str) -> Result<DeployStatus, ProviderError> {
        std::future::pending().await
    }
}

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub fn client(provider: Arc<dyn HostingProvider>) -> DeployClient {
    DeployClient::new(provider, RetryPolicy::default(), REQUEST_TIMEOUT)
}

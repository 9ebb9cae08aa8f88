//! REST client for the hosting provider.
//!
//! Wraps `POST /sites`, `POST /sites/{id}/deploys`, `PUT /deploys/{id}/files`
//! and `GET /deploys/{id}` using [`reqwest`].

use std::time::Duration;

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::provider::{DeployInfo, DeployStatus, HostingProvider, SiteInfo};

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct HostingApiConfig {
    /// Base URL without trailing slash, e.g. `https://api.host.example/v1`.
    pub base_url: String,
    /// Sent as `Authorization: Bearer <token>` when set.
    pub api_token: Option<String>,
    pub request_timeout: Duration,
}

/// HTTP client for one hosting provider account.
pub struct HostingApi {
    client: reqwest::Client,
    base_url: String,
    api_token: Option<String>,
}

impl HostingApi {
    pub fn new(config: HostingApiConfig) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self::with_client(client, config))
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, config: HostingApiConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_token: config.api_token,
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{path}", self.base_url));
        match &self.api_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    // ---- private helpers ----

    /// Return the response unchanged on 2xx, or [`ProviderError::Api`]
    /// carrying the status and body text.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ProviderError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ProviderError> {
        let response = Self::ensure_success(response).await?;
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| ProviderError::Decode(e.to_string()))
    }
}

#[async_trait]
impl HostingProvider for HostingApi {
    async fn create_site(&self, name: &str) -> Result<SiteInfo, ProviderError> {
        let response = self
            .request(reqwest::Method::POST, "/sites")
            .json(&serde_json::json!({ "name": name }))
            .send()
            .await?;
        Self::parse_response(response).await
    }

    async fn create_deploy(&self, site_id: &str) -> Result<DeployInfo, ProviderError> {
        let response = self
            .request(reqwest::Method::POST, &format!("/sites/{site_id}/deploys"))
            .send()
            .await?;
        Self::parse_response(response).await
    }

    async fn upload_archive(&self, deploy_id: &str, archive: &[u8]) -> Result<(), ProviderError> {
        let response = self
            .request(reqwest::Method::PUT, &format!("/deploys/{deploy_id}/files"))
            .header(reqwest::header::CONTENT_TYPE, "application/zip")
            .body(archive.to_vec())
            .send()
            .await?;
        Self::ensure_success(response).await?;
        Ok(())
    }

    async fn get_deploy_status(&self, deploy_id: &str) -> Result<DeployStatus, ProviderError> {
        let response = self
            .request(reqwest::Method::GET, &format!("/deploys/{deploy_id}"))
            .send()
            .await?;
        Self::parse_response(response).await
    }
}

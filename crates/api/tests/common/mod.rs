#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use launchpad_api::config::ServerConfig;
use launchpad_api::router::build_app_router;
use launchpad_api::state::AppState;
use launchpad_core::templates::TemplateCatalog;
use launchpad_db::MemoryStore;
use launchpad_events::{DisabledNotifier, EventBus};
use launchpad_hosting::{
    DeployInfo, DeployStatus, HostingProvider, ProviderDeployState, ProviderError, SiteInfo,
};
use launchpad_pipeline::{Orchestrator, PipelineConfig, PipelineDeps, StaticSiteBuilder};

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
        database_url: None,
        store_timeout_secs: 5,
        hosting_api_url: "http://hosting.test".to_string(),
        hosting_api_token: None,
        template_catalog_path: None,
    }
}

/// Provider where every deploy is ready on the first status read.
#[derive(Default)]
pub struct InstantProvider {
    deploys: AtomicU32,
}

#[async_trait]
impl HostingProvider for InstantProvider {
    async fn create_site(&self, name: &str) -> Result<SiteInfo, ProviderError> {
        Ok(SiteInfo {
            id: name.to_string(),
            name: Some(name.to_string()),
            url: None,
        })
    }

    async fn create_deploy(&self, site_id: &str) -> Result<DeployInfo, ProviderError> {
        let n = self.deploys.fetch_add(1, Ordering::SeqCst);
        Ok(DeployInfo {
            id: format!("{site_id}--{n}"),
        })
    }

    async fn upload_archive(&self, _deploy_id: &str, _archive: &[u8]) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn get_deploy_status(&self, deploy_id: &str) -> Result<DeployStatus, ProviderError> {
        let site = deploy_id.split("--").next().unwrap_or(deploy_id);
        Ok(DeployStatus {
            state: ProviderDeployState::Ready,
            url: Some(format!("https://{site}.hosting.test")),
            error_message: None,
        })
    }
}

pub struct TestApp {
    pub router: Router,
    pub orchestrator: Orchestrator,
}

/// Build the full application router over an in-memory store, with the
/// same middleware stack production uses.
pub fn build_test_app() -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let orchestrator = Orchestrator::new(
        PipelineDeps {
            store: store.clone(),
            provider: Arc::new(InstantProvider::default()),
            builder: Arc::new(StaticSiteBuilder),
            catalog: TemplateCatalog::builtin(),
            notifier: Arc::new(DisabledNotifier),
            events: Arc::new(EventBus::default()),
        },
        PipelineConfig::default(),
    );
    let config = test_config();
    let state = AppState {
        orchestrator: orchestrator.clone(),
        store,
        config: Arc::new(config.clone()),
    };
    TestApp {
        router: build_app_router(state, &config),
        orchestrator,
    }
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_json(app: Router, uri: &str, json: serde_json::Value) -> Response<Body> {
    post_json_with_headers(app, uri, json, &[]).await
}

pub async fn post_json_with_headers(
    app: Router,
    uri: &str,
    json: serde_json::Value,
    headers: &[(&str, &str)],
) -> Response<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json");
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let request = builder.body(Body::from(json.to_string())).unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

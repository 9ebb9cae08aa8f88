use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use launchpad_api::config::ServerConfig;
use launchpad_api::router::build_app_router;
use launchpad_api::state::AppState;
use launchpad_core::templates::TemplateCatalog;
use launchpad_db::{MemoryStore, PgStore, Store};
use launchpad_events::{
    DisabledNotifier, EmailConfig, EmailNotifier, EventBus, Notifier, PlatformEvent,
};
use launchpad_hosting::{HostingApi, HostingApiConfig};
use launchpad_pipeline::{Orchestrator, PipelineConfig, PipelineDeps, StaticSiteBuilder};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "launchpad_api=debug,launchpad_pipeline=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    let pipeline_config = PipelineConfig::from_env().expect("Invalid pipeline configuration");
    tracing::info!(
        host = %config.host,
        port = %config.port,
        option_count = pipeline_config.option_count,
        allow_partial = pipeline_config.allow_partial_proposals,
        "Loaded server configuration",
    );

    // --- Store ---
    let store: Arc<dyn Store> = match &config.database_url {
        Some(database_url) => {
            let pool = launchpad_db::create_pool(database_url)
                .await
                .expect("Failed to connect to database");
            tracing::info!("Database connection pool created");

            launchpad_db::health_check(&pool)
                .await
                .expect("Database health check failed");
            tracing::info!("Database health check passed");

            launchpad_db::run_migrations(&pool)
                .await
                .expect("Failed to run database migrations");
            tracing::info!("Database migrations applied");

            Arc::new(PgStore::new(
                pool,
                Duration::from_secs(config.store_timeout_secs),
            ))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory store; state is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    // --- Template catalog ---
    let catalog = match &config.template_catalog_path {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .unwrap_or_else(|e| panic!("Failed to read template catalog '{path}': {e}"));
            TemplateCatalog::from_json(&json).expect("Invalid template catalog")
        }
        None => TemplateCatalog::builtin(),
    };
    tracing::info!(templates = catalog.templates().len(), "Template catalog loaded");

    // --- Hosting provider ---
    let provider = HostingApi::new(HostingApiConfig {
        base_url: config.hosting_api_url.clone(),
        api_token: config.hosting_api_token.clone(),
        request_timeout: pipeline_config.request_timeout,
    })
    .expect("Failed to build hosting API client");

    // --- Notifications ---
    let notifier: Arc<dyn Notifier> = match EmailConfig::from_env() {
        Some(email_config) => {
            tracing::info!(host = %email_config.smtp_host, "Email notifications enabled");
            Arc::new(EmailNotifier::new(email_config).expect("Invalid SMTP configuration"))
        }
        None => {
            tracing::warn!("SMTP_HOST not set, client notifications are disabled");
            Arc::new(DisabledNotifier)
        }
    };

    // --- Event bus ---
    let event_bus = Arc::new(EventBus::default());
    let event_log_handle = tokio::spawn(log_events(event_bus.subscribe()));

    // --- Orchestrator ---
    let orchestrator = Orchestrator::new(
        PipelineDeps {
            store: Arc::clone(&store),
            provider: Arc::new(provider),
            builder: Arc::new(StaticSiteBuilder),
            catalog,
            notifier,
            events: Arc::clone(&event_bus),
        },
        pipeline_config,
    );

    // --- App state ---
    let state = AppState {
        orchestrator: orchestrator.clone(),
        store,
        config: Arc::new(config.clone()),
    };
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, draining pipeline tasks");

    let drained = orchestrator
        .shutdown(Duration::from_secs(config.shutdown_timeout_secs))
        .await;
    if drained {
        tracing::info!("Pipeline tasks finished");
    } else {
        tracing::warn!("Pipeline tasks still running at shutdown deadline");
    }

    // Dropping the last sender closes the channel and ends the event log.
    drop(orchestrator);
    drop(event_bus);
    let _ = tokio::time::timeout(Duration::from_secs(5), event_log_handle).await;

    tracing::info!("Graceful shutdown complete");
}

/// Log every platform event until the bus is closed.
async fn log_events(mut rx: broadcast::Receiver<PlatformEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => tracing::info!(
                event_type = %event.event_type,
                entity_id = ?event.source_entity_id,
                payload = %event.payload,
                "Platform event",
            ),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Event log lagged behind the bus");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}

/// Server configuration loaded from environment variables.
///
/// Pipeline tuning lives in [`launchpad_pipeline::PipelineConfig`]; this
/// struct covers the HTTP server and the external services it wires up.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Time allowed for in-flight pipeline tasks after the server stops
    /// accepting connections (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// PostgreSQL URL. Unset runs on the in-memory store.
    pub database_url: Option<String>,
    /// Per-query store timeout in seconds (default: `5`).
    pub store_timeout_secs: u64,
    /// Hosting provider API base URL.
    pub hosting_api_url: String,
    pub hosting_api_token: Option<String>,
    /// JSON template catalog. Unset uses the built-in catalog.
    pub template_catalog_path: Option<String>,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                 | Default                    |
    /// |-------------------------|----------------------------|
    /// | `HOST`                  | `0.0.0.0`                  |
    /// | `PORT`                  | `3000`                     |
    /// | `CORS_ORIGINS`          | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS`  | `30`                       |
    /// | `SHUTDOWN_TIMEOUT_SECS` | `30`                       |
    /// | `DATABASE_URL`          | unset (in-memory store)    |
    /// | `STORE_TIMEOUT_SECS`    | `5`                        |
    /// | `HOSTING_API_URL`       | required                   |
    /// | `HOSTING_API_TOKEN`     | unset                      |
    /// | `TEMPLATE_CATALOG_PATH` | unset (built-in catalog)   |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let shutdown_timeout_secs: u64 = std::env::var("SHUTDOWN_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("SHUTDOWN_TIMEOUT_SECS must be a valid u64");

        let store_timeout_secs: u64 = std::env::var("STORE_TIMEOUT_SECS")
            .unwrap_or_else(|_| "5".into())
            .parse()
            .expect("STORE_TIMEOUT_SECS must be a valid u64");

        let hosting_api_url =
            std::env::var("HOSTING_API_URL").expect("HOSTING_API_URL must be set");

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
            database_url: non_empty_var("DATABASE_URL"),
            store_timeout_secs,
            hosting_api_url,
            hosting_api_token: non_empty_var("HOSTING_API_TOKEN"),
            template_catalog_path: non_empty_var("TEMPLATE_CATALOG_PATH"),
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

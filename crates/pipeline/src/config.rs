//! Pipeline configuration: proposal policy and deploy tuning.

use std::str::FromStr;
use std::time::Duration;

use launchpad_core::workflow::DEFAULT_WORKFLOW_TTL_HOURS;
use launchpad_hosting::{PackagerConfig, PollConfig, RetryPolicy};

/// An environment variable that is set but cannot be parsed.
#[derive(Debug, thiserror::Error)]
#[error("{name} must be a valid {expected}, got '{value}'")]
pub struct ConfigError {
    pub name: &'static str,
    pub expected: &'static str,
    pub value: String,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Options per proposal (N).
    pub option_count: usize,
    /// Fresh deploy jobs allowed per mockup. Only timeouts and exhausted
    /// transient errors start another job; provider `error` never does.
    pub mockup_job_attempts: u32,
    /// Send a proposal with fewer than N working previews instead of
    /// failing the workflow.
    pub allow_partial_proposals: bool,
    pub workflow_ttl_hours: i64,
    /// Reject selections once `expires_at` has passed.
    pub enforce_selection_expiry: bool,
    /// Base URL of the client-facing site, used in notification links.
    pub site_base_url: String,
    /// Per-attempt timeout for hosting provider calls.
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
    /// Backoff for background store writes that fail transiently, e.g. a
    /// query timeout.
    pub store_retry: RetryPolicy,
    pub poll: PollConfig,
    pub packager: PackagerConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            option_count: 3,
            mockup_job_attempts: 2,
            allow_partial_proposals: true,
            workflow_ttl_hours: DEFAULT_WORKFLOW_TTL_HOURS,
            enforce_selection_expiry: false,
            site_base_url: "http://localhost:5173".into(),
            request_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            store_retry: RetryPolicy {
                max_retries: 4,
                base_delay: Duration::from_millis(200),
                max_delay: Duration::from_secs(3),
                ..RetryPolicy::default()
            },
            poll: PollConfig::default(),
            packager: PackagerConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                        | Default                 |
    /// |--------------------------------|-------------------------|
    /// | `PROPOSAL_OPTION_COUNT`        | `3`                     |
    /// | `MOCKUP_JOB_ATTEMPTS`          | `2`                     |
    /// | `ALLOW_PARTIAL_PROPOSALS`      | `true`                  |
    /// | `WORKFLOW_TTL_HOURS`           | `168`                   |
    /// | `ENFORCE_SELECTION_EXPIRY`     | `false`                 |
    /// | `SITE_BASE_URL`                | `http://localhost:5173` |
    /// | `HOSTING_REQUEST_TIMEOUT_SECS` | `30`                    |
    /// | `DEPLOY_RETRY_MAX`             | `3`                     |
    /// | `DEPLOY_RETRY_BASE_MS`         | `500`                   |
    /// | `DEPLOY_RETRY_CAP_MS`          | `8000`                  |
    /// | `STORE_RETRY_MAX`              | `4`                     |
    /// | `STORE_RETRY_BASE_MS`          | `200`                   |
    /// | `STORE_RETRY_CAP_MS`           | `3000`                  |
    /// | `POLL_INTERVAL_SECS`           | `2`                     |
    /// | `POLL_TIMEOUT_SECS`            | `120`                   |
    /// | `POLL_MAX_ATTEMPTS`            | `60`                    |
    /// | `MAX_FILE_BYTES`               | `10485760`              |
    /// | `MAX_ARCHIVE_BYTES`            | `52428800`              |
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            option_count: env_or("PROPOSAL_OPTION_COUNT", "integer", defaults.option_count)?.max(1),
            mockup_job_attempts: env_or("MOCKUP_JOB_ATTEMPTS", "integer", defaults.mockup_job_attempts)?
                .max(1),
            allow_partial_proposals: env_or(
                "ALLOW_PARTIAL_PROPOSALS",
                "boolean",
                defaults.allow_partial_proposals,
            )?,
            workflow_ttl_hours: env_or("WORKFLOW_TTL_HOURS", "integer", defaults.workflow_ttl_hours)?,
            enforce_selection_expiry: env_or(
                "ENFORCE_SELECTION_EXPIRY",
                "boolean",
                defaults.enforce_selection_expiry,
            )?,
            site_base_url: std::env::var("SITE_BASE_URL").unwrap_or(defaults.site_base_url),
            request_timeout: Duration::from_secs(env_or(
                "HOSTING_REQUEST_TIMEOUT_SECS",
                "integer",
                30,
            )?),
            retry: RetryPolicy {
                max_retries: env_or("DEPLOY_RETRY_MAX", "integer", defaults.retry.max_retries)?,
                base_delay: Duration::from_millis(env_or("DEPLOY_RETRY_BASE_MS", "integer", 500)?),
                max_delay: Duration::from_millis(env_or("DEPLOY_RETRY_CAP_MS", "integer", 8000)?),
                ..defaults.retry
            },
            store_retry: RetryPolicy {
                max_retries: env_or("STORE_RETRY_MAX", "integer", defaults.store_retry.max_retries)?,
                base_delay: Duration::from_millis(env_or("STORE_RETRY_BASE_MS", "integer", 200)?),
                max_delay: Duration::from_millis(env_or("STORE_RETRY_CAP_MS", "integer", 3000)?),
                ..defaults.store_retry
            },
            poll: PollConfig {
                interval: Duration::from_secs(env_or("POLL_INTERVAL_SECS", "integer", 2)?),
                timeout: Duration::from_secs(env_or("POLL_TIMEOUT_SECS", "integer", 120)?),
                max_attempts: env_or("POLL_MAX_ATTEMPTS", "integer", defaults.poll.max_attempts)?
                    .max(1),
            },
            packager: PackagerConfig {
                max_file_bytes: env_or("MAX_FILE_BYTES", "integer", defaults.packager.max_file_bytes)?,
                max_archive_bytes: env_or(
                    "MAX_ARCHIVE_BYTES",
                    "integer",
                    defaults.packager.max_archive_bytes,
                )?,
            },
        })
    }
}

/// Parse `name` if set, otherwise return `default`.
fn env_or<T: FromStr>(name: &'static str, expected: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value.trim().parse().map_err(|_| ConfigError {
            name,
            expected,
            value,
        }),
        Err(_) => Ok(default),
    }
}

//! Static hosting provider boundary.
//!
//! - [`provider`]: the four provider operations as a trait, and the wire
//!   types they exchange.
//! - [`api`]: the reqwest implementation against the provider's REST API.
//! - [`packager`]: turns a site bundle into one deterministic zip archive.
//! - [`retry`]: exponential backoff with jitter for transient failures.
//! - [`client`]: [`DeployClient`], the timeout-and-retry wrapper the
//!   pipeline calls.
//! - [`poller`]: [`DeploymentPoller`], the bounded status polling loop.

pub mod api;
pub mod client;
pub mod error;
pub mod packager;
pub mod poller;
pub mod provider;
pub mod retry;

pub use api::{HostingApi, HostingApiConfig};
pub use client::{DeployClient, DeployClientError};
pub use error::ProviderError;
pub use packager::{Archive, Packager, PackagerConfig, PackagingError, SiteBundle};
pub use poller::{DeploymentPoller, PollConfig, PollError, PollObserver, PollOutcome};
pub use provider::{DeployInfo, DeployStatus, HostingProvider, ProviderDeployState, SiteInfo};
pub use retry::RetryPolicy;

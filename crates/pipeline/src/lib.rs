//! Launchpad deployment and selection pipeline.
//!
//! - [`orchestrator`]: the workflow state machine and its public
//!   operations (`start_workflow`, `get_status`, `handle_selection`,
//!   `retry_production`).
//! - [`proposal`]: template selection and concurrent mockup deploys.
//! - [`selection`]: exactly-once recording of the client's choice.
//! - [`deploy`]: one build, package, upload and poll cycle per job.
//! - [`builder`]: the site asset builder seam.
//! - [`view`]: the client-facing status projection.

pub mod builder;
pub mod config;
pub mod deploy;
pub mod error;
pub mod orchestrator;
pub mod proposal;
pub mod selection;
mod store_retry;
pub mod view;

pub use builder::{BuildError, ProjectData, SiteBuilder, StaticSiteBuilder};
pub use config::{ConfigError, PipelineConfig};
pub use deploy::{DeployResult, DeployTarget, DeploymentRunner, JobError};
pub use error::PipelineError;
pub use orchestrator::{Orchestrator, PipelineDeps};
pub use proposal::{ProposalError, ProposalGenerator};
pub use selection::{SelectionAck, SelectionHandler, SelectionRequest};
pub use view::WorkflowView;

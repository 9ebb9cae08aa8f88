//! Repository layer: SQL for each table.
//!
//! Each repository is a zero-sized struct providing async methods that accept
//! `&PgPool` and return raw `*Row` structs; [`PgStore`](crate::pg::PgStore)
//! decodes those into domain records.

pub mod deployment_repo;
pub mod proposal_repo;
pub mod selection_repo;
pub mod workflow_repo;

pub use deployment_repo::DeploymentRepo;
pub use proposal_repo::ProposalRepo;
pub use selection_repo::{SelectionOutcome, SelectionRepo};
pub use workflow_repo::WorkflowRepo;

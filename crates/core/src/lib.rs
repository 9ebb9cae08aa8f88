//! Domain types and pure rules for the site launch pipeline.
//!
//! Nothing in this crate performs I/O. The store, hosting, notification
//! and orchestration crates all build on these definitions.

pub mod error;
pub mod intake;
pub mod status;
pub mod templates;
pub mod types;
pub mod workflow;

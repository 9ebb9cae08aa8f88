//! Domain records persisted by the store.
//!
//! Each submodule contains:
//! - The record struct handed to the pipeline, with typed state enums
//! - A `New*` DTO for inserts
//! - A `*Patch` DTO (all `Option` fields) applied alongside a state change

pub mod deployment;
pub mod proposal;
pub mod selection;
pub mod workflow;

//! Client selection event: write-once per workflow.

use launchpad_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};

/// Advisory request metadata captured with a selection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceMetadata {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub device: Option<String>,
}

/// A row from the `selection_events` table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectionEvent {
    pub workflow_id: DbId,
    pub chosen_option: i32,
    pub received_at: Timestamp,
    pub source: SourceMetadata,
}

//! Proposal record: the N candidate options offered to the client.

use launchpad_core::status::ProposalStatus;
use launchpad_core::templates::ThemeDescriptor;
use launchpad_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};

/// One candidate template option, stored inside the proposal's `options` JSONB.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalOption {
    /// 1-based position, as presented to the client.
    pub index: i32,
    pub template_id: String,
    pub name: String,
    pub theme: ThemeDescriptor,
    /// Internal ranking score; never exposed to unauthenticated readers.
    pub score: u32,
    /// Set once the option's mockup deploy reached `READY`.
    pub preview_url: Option<String>,
    /// Set when the option's mockup deploy failed for good.
    pub failure: Option<String>,
}

impl ProposalOption {
    pub fn is_ready(&self) -> bool {
        self.preview_url.is_some()
    }
}

/// A row from the `proposals` table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Proposal {
    pub id: DbId,
    pub workflow_id: DbId,
    pub status: ProposalStatus,
    pub options: Vec<ProposalOption>,
    pub selected_option: Option<i32>,
    pub sent_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Proposal {
    /// Look up an option by its 1-based index.
    pub fn option(&self, index: i32) -> Option<&ProposalOption> {
        usize::try_from(index)
            .ok()
            .and_then(|i| i.checked_sub(1))
            .and_then(|i| self.options.get(i))
    }

    /// Number of options whose mockup is live.
    pub fn ready_count(&self) -> usize {
        self.options.iter().filter(|o| o.is_ready()).count()
    }
}

/// DTO for creating a proposal in `PENDING`.
#[derive(Debug, Clone)]
pub struct NewProposal {
    pub workflow_id: DbId,
    pub options: Vec<ProposalOption>,
}

/// Columns written together with a proposal status change.
#[derive(Debug, Clone, Default)]
pub struct ProposalPatch {
    /// Replaces the whole option list; its length must not change.
    pub options: Option<Vec<ProposalOption>>,
    pub selected_option: Option<i32>,
    pub sent_at: Option<Timestamp>,
}

impl ProposalPatch {
    pub fn apply_to(self, proposal: &mut Proposal) {
        if let Some(options) = self.options {
            proposal.options = options;
        }
        if let Some(option) = self.selected_option {
            proposal.selected_option = Some(option);
        }
        if let Some(at) = self.sent_at {
            proposal.sent_at = Some(at);
        }
    }
}

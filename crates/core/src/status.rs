//! Status enums for workflows, proposals and deployment jobs.
//!
//! Each variant's discriminant is the SMALLINT stored in the corresponding
//! `*_state` / `status` column, so the numbering must never be reordered.

use crate::error::CoreError;

/// Status ID type matching SMALLINT in the database.
pub type StatusId = i16;

macro_rules! define_status_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $val:literal => $label:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(i16)]
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, ::serde::Serialize, ::serde::Deserialize,
        )]
        #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
        pub enum $name {
            $( $(#[$vmeta])* $variant = $val ),+
        }

        impl $name {
            /// Return the database status ID.
            pub fn id(self) -> StatusId {
                self as StatusId
            }

            /// Resolve a database status ID back into the enum.
            pub fn from_id(id: StatusId) -> Result<Self, CoreError> {
                match id {
                    $( $val => Ok(Self::$variant), )+
                    other => Err(CoreError::Internal(format!(
                        "Unknown {} id {other}",
                        stringify!($name)
                    ))),
                }
            }

            /// Wire name, as exposed to API clients.
            pub fn name(self) -> &'static str {
                match self {
                    $( Self::$variant => $label ),+
                }
            }
        }

        impl From<$name> for StatusId {
            fn from(value: $name) -> Self {
                value as StatusId
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.name())
            }
        }
    };
}

define_status_enum! {
    /// Lifecycle of one end-to-end run from intake to published site.
    WorkflowState {
        Pending = 1 => "PENDING",
        MockupsReady = 2 => "MOCKUPS_READY",
        AwaitingSelection = 3 => "AWAITING_SELECTION",
        Selected = 4 => "SELECTED",
        Production = 5 => "PRODUCTION",
        Completed = 6 => "COMPLETED",
        Failed = 7 => "FAILED",
    }
}

define_status_enum! {
    /// Lifecycle of the candidate set offered to the client.
    ProposalStatus {
        Pending = 1 => "PENDING",
        Generated = 2 => "GENERATED",
        Partial = 3 => "PARTIAL",
        Sent = 4 => "SENT",
        Selected = 5 => "SELECTED",
        Failed = 6 => "FAILED",
    }
}

define_status_enum! {
    /// Lifecycle of one upload-and-poll cycle against the hosting provider.
    DeploymentState {
        Created = 1 => "CREATED",
        Uploading = 2 => "UPLOADING",
        Processing = 3 => "PROCESSING",
        Ready = 4 => "READY",
        Error = 5 => "ERROR",
        Timeout = 6 => "TIMEOUT",
    }
}

impl ProposalStatus {
    /// Whether a client may still pick an option from this proposal.
    pub fn accepts_selection(self) -> bool {
        matches!(self, Self::Generated | Self::Partial | Self::Sent)
    }

    /// `PENDING -> GENERATED | PARTIAL | FAILED -> SENT -> SELECTED`.
    ///
    /// A settled proposal may be selected before its notification was sent.
    pub fn can_transition_to(self, next: ProposalStatus) -> bool {
        use ProposalStatus::*;
        matches!(
            (self, next),
            (Pending, Generated | Partial | Failed)
                | (Generated | Partial, Sent | Selected | Failed)
                | (Sent, Selected | Failed)
        )
    }
}

impl DeploymentState {
    /// `READY`, `ERROR` and `TIMEOUT` are final; nothing polls past them.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Ready | Self::Error | Self::Timeout)
    }
}

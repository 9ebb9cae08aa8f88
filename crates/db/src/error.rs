use std::time::Duration;

use launchpad_core::error::CoreError;
use launchpad_core::types::DbId;

/// Errors returned by [`Store`](crate::store::Store) implementations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: DbId },

    /// Compare-and-set lost: the record was no longer in the expected state.
    #[error("{kind} {id} is {actual}, expected {expected}")]
    StateConflict {
        kind: &'static str,
        id: DbId,
        expected: String,
        actual: String,
    },

    /// The requested transition is not an edge of the state graph.
    #[error("{0}")]
    InvalidTransition(String),

    #[error("{kind} for {id} already exists")]
    AlreadyExists { kind: &'static str, id: DbId },

    #[error("Store call timed out after {0:?}")]
    Timeout(Duration),

    /// A stored value could not be decoded into its domain type.
    #[error("Corrupt {kind} record {id}: {message}")]
    Corrupt {
        kind: &'static str,
        id: DbId,
        message: String,
    },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// Whether the call may succeed if repeated unchanged.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::Database(e) => matches!(
                e,
                sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed
            ),
            _ => false,
        }
    }

    /// Whether a compare-and-set lost against a concurrent writer.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::StateConflict { .. } | Self::AlreadyExists { .. })
    }
}

impl From<CoreError> for StoreError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Conflict(msg) => Self::InvalidTransition(msg),
            other => Self::InvalidTransition(other.to_string()),
        }
    }
}

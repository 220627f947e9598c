//! Checkpoint store error types

use thiserror::Error;
use uuid::Uuid;

/// Errors returned by a checkpoint store backend
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{kind} {id} not found in checkpoint store")]
    NotFound { kind: &'static str, id: String },

    #[error("checkpoint rejected: {0}")]
    Rejected(String),

    #[error("checkpoint store unavailable: {0}")]
    Unavailable(String),

    #[error("checkpoint store call timed out after {0}ms")]
    Timeout(u64),

    #[error("checkpoint store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("checkpoint store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn run_not_found(id: Uuid) -> Self {
        StoreError::NotFound {
            kind: "run",
            id: id.to_string(),
        }
    }

    pub fn step_not_found(id: Uuid) -> Self {
        StoreError::NotFound {
            kind: "step",
            id: id.to_string(),
        }
    }

    pub fn session_not_found(id: Uuid) -> Self {
        StoreError::NotFound {
            kind: "session",
            id: id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    /// The write was refused for its content; retrying it cannot succeed
    pub fn is_rejected(&self) -> bool {
        matches!(self, StoreError::Rejected(_))
    }

    /// Unreachable, slow or failing I/O; worth retrying on the next tick
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::Unavailable(_) | StoreError::Timeout(_) | StoreError::Io(_)
        )
    }
}

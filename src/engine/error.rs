use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::store::StoreError;
use crate::types::{RunStatus, StepStatus};

/// Errors surfaced by the run engine and session manager
#[derive(Error, Debug)]
pub enum EngineError {
    // Validation
    #[error("step {0} not found in run")]
    StepNotFound(Uuid),

    #[error("run {run_id} is {status} and accepts no further changes")]
    RunNotMutable { run_id: Uuid, status: RunStatus },

    #[error("step cannot move from {from} to {to}")]
    InvalidStepTransition { from: StepStatus, to: StepStatus },

    #[error("cannot {action} a run that is {status}")]
    InvalidRunTransition {
        action: &'static str,
        status: RunStatus,
    },

    #[error("step index {index} is out of range for {total} steps")]
    StepIndexOutOfRange { index: usize, total: usize },

    #[error("nothing to undo")]
    NothingToUndo,

    #[error("nothing to redo")]
    NothingToRedo,

    #[error("no active session")]
    NoActiveSession,

    #[error("session cannot complete while its run is {0}")]
    RunNotCompleted(RunStatus),

    #[error("run {0} has never been checkpointed")]
    NeverCheckpointed(Uuid),

    #[error("share link not found")]
    ShareNotFound,

    // Recovery
    #[error("session not found")]
    SessionNotFound,

    #[error("session expired at {0}")]
    SessionExpired(DateTime<Utc>),

    #[error("session {0} has no checkpoint data")]
    SessionDataMissing(Uuid),

    #[error("session {0} is completed and cannot be resumed")]
    SessionClosed(Uuid),

    #[error("session {0} checkpoint does not belong to its run")]
    SessionRunMismatch(Uuid),

    // Persistence
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EngineError {
    /// Rejected input or an illegal state change; nothing was modified
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            EngineError::StepNotFound(_)
                | EngineError::RunNotMutable { .. }
                | EngineError::InvalidStepTransition { .. }
                | EngineError::InvalidRunTransition { .. }
                | EngineError::StepIndexOutOfRange { .. }
                | EngineError::NothingToUndo
                | EngineError::NothingToRedo
                | EngineError::NoActiveSession
                | EngineError::RunNotCompleted(_)
                | EngineError::NeverCheckpointed(_)
                | EngineError::ShareNotFound
        ) || matches!(self, EngineError::Store(e) if e.is_rejected())
    }

    /// The store failed or timed out a read or write
    pub fn is_persistence(&self) -> bool {
        matches!(self, EngineError::Store(e) if !e.is_rejected())
    }

    /// A session could not be resumed; callers fall back to a fresh session
    pub fn is_recovery(&self) -> bool {
        matches!(
            self,
            EngineError::SessionNotFound
                | EngineError::SessionExpired(_)
                | EngineError::SessionDataMissing(_)
                | EngineError::SessionClosed(_)
                | EngineError::SessionRunMismatch(_)
        )
    }

    /// Not-found style errors, used for 404 mapping
    pub fn is_not_found(&self) -> bool {
        match self {
            EngineError::StepNotFound(_)
            | EngineError::ShareNotFound
            | EngineError::SessionNotFound => true,
            EngineError::Store(e) => e.is_not_found(),
            _ => false,
        }
    }
}

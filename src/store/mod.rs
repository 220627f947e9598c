//! Checkpoint store - durable home of runs, steps and session checkpoints.
//!
//! The engine only talks to the [`CheckpointStore`] trait. Two backends ship
//! with the crate:
//! - [`MemoryStore`]: process-local, with failure injection for tests
//! - [`FileStore`]: a single JSON document under the state directory
//!
//! All writes are idempotent upserts keyed by run, step or session id, so the
//! autosave scheduler can retry a failed checkpoint without side effects.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::types::{
    CheckpointType, Run, RunSnapshot, SessionData, SessionStatus, SessionSummary, Step, UiState,
};
use crate::workflow::WorkflowDefinition;

mod data;
mod error;
mod file;
mod memory;

pub use error::StoreError;
pub use file::FileStore;
pub use memory::MemoryStore;

/// Persisted form of a session. Holds the digest of the session key, never the key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: Uuid,
    pub run_id: Uuid,
    pub key_hash: String,
    #[serde(default)]
    pub session_name: Option<String>,
    pub status: SessionStatus,
    #[serde(default)]
    pub session_data: Option<SessionData>,
    #[serde(default)]
    pub ui_state: UiState,
    #[serde(default)]
    pub owner: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_checkpoint_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_checkpoint_type: Option<CheckpointType>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub pause_reason: Option<String>,
}

/// One session checkpoint write
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionCheckpoint {
    pub session_id: Uuid,
    pub session_data: SessionData,
    pub ui_state: UiState,
    pub checkpoint_type: CheckpointType,
    pub checkpoint_at: DateTime<Utc>,
    /// Sliding expiry, pushed forward on every write
    pub expires_at: DateTime<Utc>,
}

/// Backend-agnostic persistence contract for the run engine.
///
/// Runs and steps are the source of truth; session records are recovery
/// artifacts. `update_run` never touches the sharing fields, which only
/// `issue_share_token` and `revoke_share_token` own.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Backend name for logging (e.g. "memory", "file")
    fn backend_name(&self) -> &str;

    /// Create a draft run from a definition and return its id
    async fn create_run(
        &self,
        workflow: &WorkflowDefinition,
        title: &str,
        description: Option<&str>,
    ) -> Result<Uuid, StoreError>;

    /// Materialize the definition's steps for a run; returns the step count.
    /// Calling it again on an initialized run returns the existing count.
    async fn initialize_steps(
        &self,
        run_id: Uuid,
        workflow: &WorkflowDefinition,
    ) -> Result<usize, StoreError>;

    async fn load_run(&self, run_id: Uuid) -> Result<RunSnapshot, StoreError>;

    async fn update_run(&self, run: &Run) -> Result<(), StoreError>;

    async fn update_step(&self, step: &Step) -> Result<(), StoreError>;

    async fn create_session(&self, record: &SessionRecord) -> Result<(), StoreError>;

    async fn save_session(&self, checkpoint: &SessionCheckpoint) -> Result<(), StoreError>;

    /// Look a session up by the key the client presents
    async fn resume_session(&self, session_key: &str)
        -> Result<Option<SessionRecord>, StoreError>;

    async fn update_session_status(
        &self,
        session_id: Uuid,
        status: SessionStatus,
        reason: Option<&str>,
    ) -> Result<(), StoreError>;

    /// Sessions that are not completed, optionally filtered by owner label
    async fn list_active_sessions(
        &self,
        owner: Option<&str>,
    ) -> Result<Vec<SessionSummary>, StoreError>;

    /// Return the run's share token, creating one if it has none
    async fn issue_share_token(&self, run_id: Uuid) -> Result<String, StoreError>;

    async fn revoke_share_token(&self, run_id: Uuid) -> Result<(), StoreError>;

    /// Current run and steps for a live token, `None` for unknown or revoked tokens
    async fn resolve_share(&self, token: &str) -> Result<Option<RunSnapshot>, StoreError>;
}

/// Run a store call under a deadline; an elapsed deadline is a `Timeout` error
pub async fn bounded<T, F>(timeout: Duration, call: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(timeout.as_millis() as u64)),
    }
}

/// SHA-256 hex digest used to index sessions by key
pub fn hash_session_key(session_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(session_key.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Unguessable share token: a v4 UUID rendered as 32 hex chars
pub fn generate_share_token() -> String {
    Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_session_key_is_stable_hex() {
        let a = hash_session_key("sk_abc");
        let b = hash_session_key("sk_abc");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, hash_session_key("sk_abd"));
    }

    #[tokio::test]
    async fn test_bounded_times_out() {
        let slow = async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<_, StoreError>(())
        };
        let err = bounded(Duration::from_millis(10), slow).await.unwrap_err();
        assert!(matches!(err, StoreError::Timeout(10)));
        assert!(err.is_transient());

        let fast = async { Ok::<_, StoreError>(7) };
        assert_eq!(bounded(Duration::from_millis(10), fast).await.unwrap(), 7);
    }

    #[test]
    fn test_share_tokens_are_unique() {
        let a = generate_share_token();
        let b = generate_share_token();
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
    }
}

//! Read-only share links.
//!
//! A share token is a capability for one run's public projection. Nothing
//! here accepts a token together with a mutation.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::engine::EngineError;
use crate::store::{bounded, CheckpointStore};
use crate::types::ShareSnapshot;

#[derive(Clone)]
pub struct ShareProjector {
    store: Arc<dyn CheckpointStore>,
    timeout: Duration,
}

impl ShareProjector {
    pub fn new(store: Arc<dyn CheckpointStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Token for the run, reusing the current one until it is revoked
    pub async fn issue(&self, run_id: Uuid) -> Result<String, EngineError> {
        let token = bounded(self.timeout, self.store.issue_share_token(run_id)).await?;
        tracing::info!(run_id = %run_id, "Share link issued");
        Ok(token)
    }

    pub async fn revoke(&self, run_id: Uuid) -> Result<(), EngineError> {
        bounded(self.timeout, self.store.revoke_share_token(run_id)).await?;
        tracing::info!(run_id = %run_id, "Share link revoked");
        Ok(())
    }

    /// Current public projection for a token. Unknown or revoked tokens are
    /// `ShareNotFound`, never an empty run.
    pub async fn resolve(&self, token: &str) -> Result<ShareSnapshot, EngineError> {
        let snapshot = bounded(self.timeout, self.store.resolve_share(token))
            .await?
            .ok_or(EngineError::ShareNotFound)?;
        Ok(ShareSnapshot::project(snapshot))
    }
}

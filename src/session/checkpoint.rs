//! Checkpoint writes for one bound session.
//!
//! The [`Checkpointer`] is shared between the session manager and the
//! autosave task. A tokio mutex acts as the flush gate so manual, pause and
//! automatic saves never overlap; the run state itself sits behind a std
//! mutex that is only held between awaits.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::beacon::BeaconPayload;
use crate::engine::{EngineError, PendingCheckpoint, RunState};
use crate::store::{bounded, CheckpointStore, SessionCheckpoint, StoreError};
use crate::types::{CheckpointType, RunStatus, Session, SessionData, SessionStatus};

pub type SharedRunState = Arc<Mutex<RunState>>;

/// Lock the run state, recovering from a poisoned lock
pub(crate) fn lock_state(state: &Mutex<RunState>) -> MutexGuard<'_, RunState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing was dirty, no write issued
    Clean,
    Written { at: DateTime<Utc> },
}

pub struct Checkpointer {
    store: Arc<dyn CheckpointStore>,
    state: SharedRunState,
    session: Mutex<Session>,
    ttl: chrono::Duration,
    timeout: Duration,
    gate: tokio::sync::Mutex<()>,
}

impl Checkpointer {
    pub fn new(
        store: Arc<dyn CheckpointStore>,
        state: SharedRunState,
        session: Session,
        ttl: chrono::Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            state,
            session: Mutex::new(session),
            ttl,
            timeout,
            gate: tokio::sync::Mutex::new(()),
        }
    }

    pub fn state(&self) -> &SharedRunState {
        &self.state
    }

    pub fn store(&self) -> &Arc<dyn CheckpointStore> {
        &self.store
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Autosave only runs for an active session over a running, dirty run
    pub fn autosave_due(&self) -> bool {
        if self.session().status != SessionStatus::Active {
            return false;
        }
        let state = lock_state(&self.state);
        state.run().status == RunStatus::Running && state.is_dirty()
    }

    /// One autosave tick. Failures are logged and retried on the next tick.
    pub async fn autosave_tick(&self) {
        if !self.autosave_due() {
            return;
        }
        match self.flush(CheckpointType::Auto, true).await {
            Ok(FlushOutcome::Written { at }) => {
                tracing::debug!(checkpoint_at = %at, "Autosave checkpoint written");
            }
            Ok(FlushOutcome::Clean) => {}
            Err(e) => {
                tracing::warn!(
                    session_id = %self.session().session_id,
                    error = %e,
                    "Autosave failed, will retry on next tick"
                );
            }
        }
    }

    /// Write a checkpoint: dirty steps in step order, then the run, then the
    /// session record. `only_if_dirty` skips the write when nothing changed.
    pub async fn flush(
        &self,
        checkpoint_type: CheckpointType,
        only_if_dirty: bool,
    ) -> Result<FlushOutcome, EngineError> {
        let _gate = self.gate.lock().await;

        let pending = {
            let mut state = lock_state(&self.state);
            if only_if_dirty && !state.is_dirty() {
                return Ok(FlushOutcome::Clean);
            }
            state.begin_checkpoint()
        };

        let checkpoint_at = Utc::now();
        let expires_at = checkpoint_at + self.ttl;
        let result = self
            .write(&pending, checkpoint_type, checkpoint_at, expires_at)
            .await;

        lock_state(&self.state).finish_checkpoint(
            pending.revision,
            result.as_ref().map(|_| ()).map_err(ToString::to_string),
        );

        if let Err(e) = result {
            tracing::warn!(
                run_id = %pending.run.id,
                checkpoint_type = %checkpoint_type,
                error = %e,
                "Checkpoint write failed"
            );
            return Err(e.into());
        }

        {
            let mut session = self.session();
            session.last_checkpoint_at = Some(checkpoint_at);
            session.last_checkpoint_type = Some(checkpoint_type);
            session.expires_at = expires_at;
            session.ui_state = pending.ui_state;
        }

        tracing::info!(
            run_id = %pending.run.id,
            checkpoint_type = %checkpoint_type,
            steps_written = pending.steps.len(),
            revision = pending.revision,
            "Checkpoint saved"
        );
        Ok(FlushOutcome::Written { at: checkpoint_at })
    }

    async fn write(
        &self,
        pending: &PendingCheckpoint,
        checkpoint_type: CheckpointType,
        checkpoint_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        for step in &pending.steps {
            bounded(self.timeout, self.store.update_step(step)).await?;
        }
        bounded(self.timeout, self.store.update_run(&pending.run)).await?;

        let checkpoint = SessionCheckpoint {
            session_id: self.session().session_id,
            session_data: pending.session_data.clone(),
            ui_state: pending.ui_state.clone(),
            checkpoint_type,
            checkpoint_at,
            expires_at,
        };
        bounded(self.timeout, self.store.save_session(&checkpoint)).await
    }

    /// Snapshot for an unload beacon. Never blocks: returns `None` when the
    /// state is locked by another caller.
    pub fn beacon_payload(&self, reason: &str) -> Option<BeaconPayload> {
        let state = match self.state.try_lock() {
            Ok(state) => state,
            Err(std::sync::TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(std::sync::TryLockError::WouldBlock) => return None,
        };
        let session_data = SessionData::capture(state.run(), state.steps());
        let ui_state = state.ui_state().clone();
        drop(state);

        Some(BeaconPayload {
            session_id: self.session().session_id,
            session_data,
            ui_state,
            reason: Some(reason.to_string()),
        })
    }
}

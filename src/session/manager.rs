//! Session lifecycle for one client.
//!
//! The manager binds at most one session at a time. Binding builds the
//! in-memory [`RunState`], wraps it in a [`Checkpointer`] and starts the
//! autosave scheduler; every user operation goes through the bound state.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use super::autosave::AutosaveScheduler;
use super::beacon::{BeaconTransport, HttpBeacon, StoreBeacon, PAGE_UNLOAD};
use super::checkpoint::{lock_state, Checkpointer, FlushOutcome};
use crate::config::{AutosaveConfig, Config, HistoryConfig};
use crate::engine::{Command, EngineError, RunState, RunView, StepChange};
use crate::share::ShareProjector;
use crate::store::{bounded, hash_session_key, CheckpointStore, SessionRecord};
use crate::telemetry::{TelemetryEvent, TelemetryService};
use crate::types::{
    CheckpointType, RunStatus, Session, SessionData, SessionStatus, SessionSummary, StepStatus,
    UiState, ViewMode,
};
use crate::workflow::WorkflowDefinition;

/// How [`SessionManager::open`] bound the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionInit {
    Fresh,
    Resumed,
}

/// New client-held session key
pub fn generate_session_key() -> String {
    format!("sk_{}", Uuid::new_v4().simple())
}

struct Bound {
    checkpointer: Arc<Checkpointer>,
    scheduler: Option<AutosaveScheduler>,
}

pub struct SessionManager {
    store: Arc<dyn CheckpointStore>,
    autosave: AutosaveConfig,
    history: HistoryConfig,
    ttl: chrono::Duration,
    owner: Option<String>,
    timeout: Duration,
    telemetry: TelemetryService,
    beacon: Arc<dyn BeaconTransport>,
    shares: ShareProjector,
    bound: Option<Bound>,
}

impl SessionManager {
    pub fn new(store: Arc<dyn CheckpointStore>, config: &Config, telemetry: TelemetryService) -> Self {
        let ttl = config.session.ttl();
        let timeout = config.store.timeout();
        let beacon: Arc<dyn BeaconTransport> = match &config.api.beacon_base_url {
            Some(url) => Arc::new(HttpBeacon::new(url.clone())),
            None => Arc::new(StoreBeacon::new(store.clone(), ttl)),
        };

        Self {
            shares: ShareProjector::new(store.clone(), timeout),
            store,
            autosave: config.autosave.clone(),
            history: config.history.clone(),
            ttl,
            owner: config.session.owner.clone(),
            timeout,
            telemetry,
            beacon,
            bound: None,
        }
    }

    pub fn with_beacon(mut self, beacon: Arc<dyn BeaconTransport>) -> Self {
        self.beacon = beacon;
        self
    }

    pub fn store(&self) -> &Arc<dyn CheckpointStore> {
        &self.store
    }

    pub fn shares(&self) -> &ShareProjector {
        &self.shares
    }

    // ─────────────────────────────────────────────────────────────────────
    // Run setup
    // ─────────────────────────────────────────────────────────────────────

    /// Create a draft run and its steps from a workflow definition
    pub async fn create_run(
        &self,
        workflow: &WorkflowDefinition,
        title: &str,
        description: Option<&str>,
    ) -> Result<Uuid, EngineError> {
        let run_id = bounded(
            self.timeout,
            self.store.create_run(workflow, title, description),
        )
        .await?;
        let steps = bounded(self.timeout, self.store.initialize_steps(run_id, workflow)).await?;
        tracing::info!(
            run_id = %run_id,
            workflow_id = %workflow.id,
            steps,
            "Run created"
        );
        Ok(run_id)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Session lifecycle
    // ─────────────────────────────────────────────────────────────────────

    /// Resume with `existing_key` when it still binds this run, otherwise
    /// start a fresh session
    pub async fn open(
        &mut self,
        run_id: Uuid,
        existing_key: Option<&str>,
        session_name: Option<&str>,
    ) -> Result<SessionInit, EngineError> {
        if let Some(key) = existing_key {
            match self.resume(key).await {
                Ok(session) if session.run_id == run_id => return Ok(SessionInit::Resumed),
                Ok(session) => {
                    tracing::warn!(
                        session_id = %session.session_id,
                        run_id = %run_id,
                        "Session key belongs to another run"
                    );
                    self.teardown().await;
                }
                Err(e) if e.is_recovery() => {
                    tracing::info!(run_id = %run_id, reason = %e, "Starting fresh session");
                }
                Err(e) => return Err(e),
            }
        }
        self.create(run_id, session_name).await?;
        Ok(SessionInit::Fresh)
    }

    /// Start a new session over the stored run. The returned session holds
    /// the only clear copy of the session key.
    pub async fn create(
        &mut self,
        run_id: Uuid,
        session_name: Option<&str>,
    ) -> Result<Session, EngineError> {
        self.teardown().await;

        let snapshot = bounded(self.timeout, self.store.load_run(run_id)).await?;
        let state = RunState::new(snapshot, &self.history);

        let now = Utc::now();
        let session = Session {
            session_id: Uuid::new_v4(),
            run_id,
            session_key: generate_session_key(),
            session_name: session_name.map(str::to_string),
            status: SessionStatus::Active,
            ui_state: state.ui_state().clone(),
            owner: self.owner.clone(),
            created_at: now,
            last_checkpoint_at: None,
            last_checkpoint_type: None,
            expires_at: now + self.ttl,
            pause_reason: None,
        };

        let record = SessionRecord {
            session_id: session.session_id,
            run_id,
            key_hash: hash_session_key(&session.session_key),
            session_name: session.session_name.clone(),
            status: SessionStatus::Active,
            session_data: Some(SessionData::capture(state.run(), state.steps())),
            ui_state: session.ui_state.clone(),
            owner: session.owner.clone(),
            created_at: now,
            last_checkpoint_at: None,
            last_checkpoint_type: None,
            expires_at: session.expires_at,
            pause_reason: None,
        };
        bounded(self.timeout, self.store.create_session(&record)).await?;

        tracing::info!(session_id = %session.session_id, run_id = %run_id, "Session created");
        self.telemetry.notify(TelemetryEvent::SessionCreated {
            session_id: session.session_id,
            run_id,
        });

        self.bind(session.clone(), state);
        Ok(session)
    }

    /// Rebuild state from the session's last checkpoint
    pub async fn resume(&mut self, session_key: &str) -> Result<Session, EngineError> {
        let record = bounded(self.timeout, self.store.resume_session(session_key))
            .await?
            .ok_or(EngineError::SessionNotFound)?;

        if record.status == SessionStatus::Completed {
            return Err(EngineError::SessionClosed(record.session_id));
        }
        if record.expires_at <= Utc::now() {
            return Err(EngineError::SessionExpired(record.expires_at));
        }
        let data = record
            .session_data
            .clone()
            .ok_or(EngineError::SessionDataMissing(record.session_id))?;
        if data.run.id != record.run_id || data.steps.iter().any(|s| s.run_id != record.run_id) {
            return Err(EngineError::SessionRunMismatch(record.session_id));
        }

        bounded(
            self.timeout,
            self.store
                .update_session_status(record.session_id, SessionStatus::Active, None),
        )
        .await?;

        self.teardown().await;

        let mut state = RunState::new(data.into_snapshot(), &self.history)
            .with_ui_state(record.ui_state.clone())
            .with_saved_at(record.last_checkpoint_at);
        // An unload beacon may have outrun the row writes; rewrite everything
        if record.last_checkpoint_type == Some(CheckpointType::Unload) {
            state.mark_all_dirty();
        }

        let session = Session {
            session_id: record.session_id,
            run_id: record.run_id,
            session_key: session_key.to_string(),
            session_name: record.session_name,
            status: SessionStatus::Active,
            ui_state: state.ui_state().clone(),
            owner: record.owner,
            created_at: record.created_at,
            last_checkpoint_at: record.last_checkpoint_at,
            last_checkpoint_type: record.last_checkpoint_type,
            expires_at: record.expires_at,
            pause_reason: None,
        };

        let progress = state.run().progress;
        tracing::info!(
            session_id = %session.session_id,
            run_id = %session.run_id,
            progress,
            "Session resumed"
        );
        self.telemetry.notify(TelemetryEvent::SessionResumed {
            session_id: session.session_id,
            run_id: session.run_id,
            progress,
        });

        self.bind(session.clone(), state);
        Ok(session)
    }

    /// Write a checkpoint now, dirty or not
    pub async fn save(&self, checkpoint_type: CheckpointType) -> Result<FlushOutcome, EngineError> {
        let checkpointer = self.checkpointer()?;
        checkpointer.flush(checkpoint_type, false).await
    }

    /// Pause the run, write a final checkpoint and mark the session paused.
    /// Autosave stays stopped afterwards; a failed write restarts it.
    pub async fn pause(&mut self, reason: Option<&str>) -> Result<(), EngineError> {
        let checkpointer = self.checkpointer()?;
        if checkpointer.session().status == SessionStatus::Paused {
            return Ok(());
        }

        {
            let mut state = lock_state(checkpointer.state());
            if state.run().status == RunStatus::Running {
                state.pause()?;
            }
        }

        self.stop_scheduler().await;
        let closed = self
            .close_out(&checkpointer, CheckpointType::Pause, SessionStatus::Paused, reason)
            .await;
        if let Err(e) = closed {
            self.restart_scheduler();
            return Err(e);
        }

        let (session_id, run_id) = {
            let mut session = checkpointer.session();
            session.status = SessionStatus::Paused;
            session.pause_reason = reason.map(str::to_string);
            (session.session_id, session.run_id)
        };
        tracing::info!(session_id = %session_id, reason = ?reason, "Session paused");
        self.telemetry.notify(TelemetryEvent::SessionPaused {
            session_id,
            run_id,
            reason: reason.map(str::to_string),
        });
        Ok(())
    }

    /// Close the session over a completed run
    pub async fn complete(&mut self) -> Result<(), EngineError> {
        let checkpointer = self.checkpointer()?;
        let status = lock_state(checkpointer.state()).run().status;
        if status != RunStatus::Completed {
            return Err(EngineError::RunNotCompleted(status));
        }

        self.stop_scheduler().await;
        self.close_out(&checkpointer, CheckpointType::Manual, SessionStatus::Completed, None)
            .await?;

        let session_id = {
            let mut session = checkpointer.session();
            session.status = SessionStatus::Completed;
            session.session_id
        };
        tracing::info!(session_id = %session_id, "Session completed");
        Ok(())
    }

    /// Stop autosave and unbind without writing anything
    pub async fn teardown(&mut self) {
        if let Some(mut bound) = self.bound.take() {
            if let Some(scheduler) = bound.scheduler.take() {
                scheduler.stop().await;
            }
            tracing::debug!(
                session_id = %bound.checkpointer.session().session_id,
                "Session unbound"
            );
        }
    }

    /// Best-effort flush while the page goes away. Never waits on the store.
    pub fn on_page_hide(&self) -> bool {
        let Some(bound) = &self.bound else {
            return false;
        };
        if !bound.checkpointer.session().is_active() {
            return false;
        }
        match bound.checkpointer.beacon_payload(PAGE_UNLOAD) {
            Some(payload) => self.beacon.send_beacon(payload),
            None => false,
        }
    }

    pub async fn list_active_sessions(
        &self,
        owner: Option<&str>,
    ) -> Result<Vec<SessionSummary>, EngineError> {
        Ok(bounded(self.timeout, self.store.list_active_sessions(owner)).await?)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────

    pub fn session(&self) -> Option<Session> {
        self.bound
            .as_ref()
            .map(|b| b.checkpointer.session().clone())
    }

    pub fn view(&self) -> Result<RunView, EngineError> {
        let checkpointer = self.checkpointer()?;
        let active = checkpointer.session().is_active();
        let view = lock_state(checkpointer.state()).view(active);
        Ok(view)
    }

    pub fn autosave_running(&self) -> bool {
        self.bound
            .as_ref()
            .and_then(|b| b.scheduler.as_ref())
            .is_some_and(AutosaveScheduler::is_running)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Run operations
    // ─────────────────────────────────────────────────────────────────────

    /// Start or continue the run. Autosave is brought back when a run-level
    /// pause stopped it while the session stayed active.
    pub fn start_run(&mut self) -> Result<(), EngineError> {
        let event = self.with_state(|state| {
            let was_draft = state.run().status == RunStatus::Draft;
            state.start()?;
            Ok(was_draft.then(|| TelemetryEvent::RunStarted {
                run_id: state.run_id(),
                workflow_id: state.run().workflow_id.clone(),
                total_steps: state.run().total_steps,
            }))
        })?;
        if !self.autosave_running() && self.session().is_some_and(|s| s.is_active()) {
            self.restart_scheduler();
        }
        if let Some(event) = event {
            self.telemetry.notify(event);
        }
        Ok(())
    }

    /// Pause the run and stop autosave. The session itself stays active.
    pub async fn pause_run(&mut self) -> Result<(), EngineError> {
        self.with_state(RunState::pause)?;
        self.stop_scheduler().await;
        Ok(())
    }

    pub async fn complete_run(&mut self) -> Result<(), EngineError> {
        let event = self.with_state(|state| {
            state.complete()?;
            let run = state.run();
            Ok(TelemetryEvent::RunCompleted {
                run_id: run.id,
                completed_steps: run.completed_steps,
                total_steps: run.total_steps,
                duration_seconds: run.actual_completion_time,
            })
        })?;
        self.stop_scheduler().await;
        self.telemetry.notify(event);
        Ok(())
    }

    pub async fn fail_run(&mut self, reason: &str) -> Result<(), EngineError> {
        let run_id = self.with_state(|state| {
            state.fail(reason)?;
            Ok(state.run_id())
        })?;
        self.stop_scheduler().await;
        self.telemetry.notify(TelemetryEvent::RunFailed {
            run_id,
            reason: reason.to_string(),
        });
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Step operations
    // ─────────────────────────────────────────────────────────────────────

    pub fn transition(
        &self,
        step_id: Uuid,
        to: StepStatus,
        notes: Option<String>,
        output: Option<Value>,
    ) -> Result<StepChange, EngineError> {
        let (change, event) = self.with_state(|state| {
            let change = state.transition(step_id, to, notes, output)?;
            let event = (change.changed() && change.to == StepStatus::Completed).then(|| {
                TelemetryEvent::StepCompleted {
                    run_id: state.run_id(),
                    step_id,
                    step_number: change.step_number,
                    progress: state.run().progress,
                    time_spent_seconds: state.step(step_id).and_then(|s| s.actual_time_spent),
                }
            });
            Ok((change, event))
        })?;
        if let Some(event) = event {
            self.telemetry.notify(event);
        }
        Ok(change)
    }

    pub fn toggle_checked(&self, step_id: Uuid) -> Result<bool, EngineError> {
        self.with_state(|state| state.toggle_checked(step_id))
    }

    pub fn update_notes(&self, step_id: Uuid, notes: String) -> Result<(), EngineError> {
        self.with_state(|state| state.update_notes(step_id, notes))
    }

    pub fn update_step_data(
        &self,
        step_id: Uuid,
        input: Option<Value>,
        output: Option<Value>,
    ) -> Result<(), EngineError> {
        self.with_state(|state| state.update_step_data(step_id, input, output))
    }

    pub fn set_current_step(&self, index: usize) -> Result<(), EngineError> {
        self.with_state(|state| state.set_current_step(index))
    }

    pub fn toggle_expanded(&self, step_id: Uuid) -> Result<bool, EngineError> {
        self.with_state(|state| state.toggle_expanded(step_id))
    }

    pub fn set_view_mode(&self, mode: ViewMode) -> Result<(), EngineError> {
        self.with_state(|state| {
            state.set_view_mode(mode);
            Ok(())
        })
    }

    pub fn undo(&self) -> Result<Command, EngineError> {
        self.with_state(RunState::undo)
    }

    pub fn redo(&self) -> Result<Command, EngineError> {
        self.with_state(RunState::redo)
    }

    pub fn ui_state(&self) -> Result<UiState, EngineError> {
        self.with_state(|state| Ok(state.ui_state().clone()))
    }

    // ─────────────────────────────────────────────────────────────────────
    // Sharing
    // ─────────────────────────────────────────────────────────────────────

    /// Share the bound run. Refused until the run has been checkpointed at
    /// least once, so the link never shows a row the store has not seen.
    pub async fn issue_share_token(&self) -> Result<String, EngineError> {
        let checkpointer = self.checkpointer()?;
        let (run_id, saved) = {
            let state = lock_state(checkpointer.state());
            (state.run_id(), state.last_saved_at())
        };
        if saved.is_none() {
            return Err(EngineError::NeverCheckpointed(run_id));
        }

        let token = self.shares.issue(run_id).await?;
        lock_state(checkpointer.state()).set_sharing(Some(token.clone()));
        Ok(token)
    }

    pub async fn revoke_share_token(&self) -> Result<(), EngineError> {
        let checkpointer = self.checkpointer()?;
        let run_id = lock_state(checkpointer.state()).run_id();
        self.shares.revoke(run_id).await?;
        lock_state(checkpointer.state()).set_sharing(None);
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────

    fn checkpointer(&self) -> Result<Arc<Checkpointer>, EngineError> {
        self.bound
            .as_ref()
            .map(|b| b.checkpointer.clone())
            .ok_or(EngineError::NoActiveSession)
    }

    fn with_state<T>(
        &self,
        f: impl FnOnce(&mut RunState) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        let checkpointer = self.checkpointer()?;
        let mut state = lock_state(checkpointer.state());
        f(&mut state)
    }

    fn bind(&mut self, session: Session, state: RunState) {
        let checkpointer = Arc::new(Checkpointer::new(
            self.store.clone(),
            Arc::new(Mutex::new(state)),
            session,
            self.ttl,
            self.timeout,
        ));
        let scheduler = self.spawn_scheduler(&checkpointer);
        self.bound = Some(Bound {
            checkpointer,
            scheduler,
        });
    }

    fn spawn_scheduler(&self, checkpointer: &Arc<Checkpointer>) -> Option<AutosaveScheduler> {
        self.autosave
            .enabled
            .then(|| AutosaveScheduler::start(checkpointer.clone(), self.autosave.interval()))
    }

    async fn stop_scheduler(&mut self) {
        let scheduler = self.bound.as_mut().and_then(|b| b.scheduler.take());
        if let Some(scheduler) = scheduler {
            scheduler.stop().await;
        }
    }

    fn restart_scheduler(&mut self) {
        let Some(checkpointer) = self.bound.as_ref().map(|b| b.checkpointer.clone()) else {
            return;
        };
        let scheduler = self.spawn_scheduler(&checkpointer);
        if let Some(bound) = self.bound.as_mut() {
            bound.scheduler = scheduler;
        }
    }

    /// Final checkpoint followed by the session status change
    async fn close_out(
        &self,
        checkpointer: &Checkpointer,
        checkpoint_type: CheckpointType,
        status: SessionStatus,
        reason: Option<&str>,
    ) -> Result<(), EngineError> {
        checkpointer.flush(checkpoint_type, false).await?;
        let session_id = checkpointer.session().session_id;
        bounded(
            self.timeout,
            self.store.update_session_status(session_id, status, reason),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::beacon::BeaconPayload;
    use crate::store::MemoryStore;
    use crate::workflow::WorkflowStep;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn definition(steps: u32) -> WorkflowDefinition {
        WorkflowDefinition {
            id: "wf-manager".into(),
            title: "Manager".into(),
            description: None,
            estimated_total_time: None,
            steps: (1..=steps)
                .map(|i| WorkflowStep {
                    step_number: Some(i),
                    tool_name: "Figma".into(),
                    tool_action: format!("Frame {}", i),
                    details: None,
                    step_type: Default::default(),
                    estimated_time: None,
                })
                .collect(),
        }
    }

    fn config(autosave: bool) -> Config {
        let mut config = Config::default();
        config.autosave.enabled = autosave;
        config.autosave.interval_ms = 20;
        config.store.timeout_ms = 1000;
        config
    }

    async fn manager(autosave: bool) -> (Arc<MemoryStore>, SessionManager, Uuid) {
        let store = Arc::new(MemoryStore::new());
        let manager =
            SessionManager::new(store.clone(), &config(autosave), TelemetryService::disabled());
        let run_id = manager.create_run(&definition(3), "Managed", None).await.unwrap();
        (store, manager, run_id)
    }

    #[derive(Default)]
    struct CountingBeacon(AtomicUsize);

    impl BeaconTransport for CountingBeacon {
        fn name(&self) -> &str {
            "counting"
        }

        fn send_beacon(&self, _payload: BeaconPayload) -> bool {
            self.0.fetch_add(1, Ordering::SeqCst);
            true
        }
    }

    #[tokio::test]
    async fn test_operations_require_session() {
        let (_store, mut manager, _run_id) = manager(false).await;
        assert!(matches!(manager.start_run(), Err(EngineError::NoActiveSession)));
        assert!(matches!(manager.view(), Err(EngineError::NoActiveSession)));
        assert!(!manager.on_page_hide());
    }

    #[tokio::test]
    async fn test_create_then_resume_restores_state() {
        let (_store, mut manager, run_id) = manager(false).await;
        let session = manager.create(run_id, Some("desk")).await.unwrap();
        assert!(session.session_key.starts_with("sk_"));

        manager.start_run().unwrap();
        let first = manager.view().unwrap().steps[0].id;
        manager.transition(first, StepStatus::Completed, None, None).unwrap();
        manager.save(CheckpointType::Manual).await.unwrap();
        let before = manager.view().unwrap();
        manager.teardown().await;

        let resumed = manager.resume(&session.session_key).await.unwrap();
        assert_eq!(resumed.session_id, session.session_id);
        let after = manager.view().unwrap();
        assert_eq!(after.run, before.run);
        assert_eq!(after.steps, before.steps);
        assert_eq!(after.progress, 33);
        assert!(after.session_active);
    }

    #[tokio::test]
    async fn test_open_falls_back_to_fresh_on_unknown_key() {
        let (_store, mut manager, run_id) = manager(false).await;
        let init = manager.open(run_id, Some("sk_missing"), None).await.unwrap();
        assert_eq!(init, SessionInit::Fresh);

        let key = manager.session().unwrap().session_key;
        manager.teardown().await;
        let init = manager.open(run_id, Some(&key), None).await.unwrap();
        assert_eq!(init, SessionInit::Resumed);
    }

    #[tokio::test]
    async fn test_pause_writes_checkpoint_and_stops_autosave() {
        let (store, mut manager, run_id) = manager(true).await;
        manager.create(run_id, None).await.unwrap();
        assert!(manager.autosave_running());
        manager.start_run().unwrap();

        manager.pause(Some("lunch")).await.unwrap();
        assert!(!manager.autosave_running());

        let session = manager.session().unwrap();
        assert_eq!(session.status, SessionStatus::Paused);
        assert_eq!(session.last_checkpoint_type, Some(CheckpointType::Pause));
        assert_eq!(
            store.load_run(run_id).await.unwrap().run.status,
            RunStatus::Paused
        );
        assert!(!manager.view().unwrap().session_active);
    }

    #[tokio::test]
    async fn test_failed_pause_keeps_session_active() {
        let (store, mut manager, run_id) = manager(true).await;
        manager.create(run_id, None).await.unwrap();
        manager.start_run().unwrap();

        store.set_fail_writes(true);
        let err = manager.pause(None).await.unwrap_err();
        assert!(err.is_persistence());
        assert_eq!(manager.session().unwrap().status, SessionStatus::Active);
        assert!(manager.autosave_running());
        manager.teardown().await;
    }

    #[tokio::test]
    async fn test_run_level_pause_complete_and_fail_stop_autosave() {
        let (_store, mut manager, run_id) = manager(true).await;
        manager.create(run_id, None).await.unwrap();
        manager.start_run().unwrap();
        assert!(manager.autosave_running());

        manager.pause_run().await.unwrap();
        assert!(!manager.autosave_running());
        tokio::time::sleep(std::time::Duration::from_millis(60)).await;
        assert!(!manager.autosave_running());
        assert!(manager.session().unwrap().is_active());

        manager.start_run().unwrap();
        assert!(manager.autosave_running());
        manager.complete_run().await.unwrap();
        assert!(!manager.autosave_running());
        manager.teardown().await;

        let run_id = manager.create_run(&definition(2), "Doomed", None).await.unwrap();
        manager.create(run_id, None).await.unwrap();
        manager.start_run().unwrap();
        manager.fail_run("vendor down").await.unwrap();
        assert!(!manager.autosave_running());
        manager.teardown().await;
    }

    #[tokio::test]
    async fn test_complete_requires_completed_run() {
        let (_store, mut manager, run_id) = manager(false).await;
        let session = manager.create(run_id, None).await.unwrap();
        manager.start_run().unwrap();
        assert!(matches!(
            manager.complete().await,
            Err(EngineError::RunNotCompleted(RunStatus::Running))
        ));

        manager.complete_run().await.unwrap();
        manager.complete().await.unwrap();
        manager.teardown().await;

        assert!(matches!(
            manager.resume(&session.session_key).await,
            Err(EngineError::SessionClosed(_))
        ));
    }

    #[tokio::test]
    async fn test_share_refused_before_first_checkpoint() {
        let (_store, mut manager, run_id) = manager(false).await;
        manager.create(run_id, None).await.unwrap();
        assert!(matches!(
            manager.issue_share_token().await,
            Err(EngineError::NeverCheckpointed(id)) if id == run_id
        ));

        manager.save(CheckpointType::Manual).await.unwrap();
        let token = manager.issue_share_token().await.unwrap();
        assert_eq!(manager.view().unwrap().run.share_token, Some(token.clone()));

        let shared = manager.shares().resolve(&token).await.unwrap();
        assert_eq!(shared.run.id, run_id);
    }

    #[tokio::test]
    async fn test_page_hide_sends_beacon_only_while_active() {
        let (_store, manager, run_id) = manager(false).await;
        let beacon = Arc::new(CountingBeacon::default());
        let mut manager = manager.with_beacon(beacon.clone());
        manager.create(run_id, None).await.unwrap();

        assert!(manager.on_page_hide());
        manager.pause(None).await.unwrap();
        assert!(!manager.on_page_hide());
        assert_eq!(beacon.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_resume_after_unload_rewrites_all_rows() {
        let (store, mut manager, run_id) = manager(false).await;
        let session = manager.create(run_id, None).await.unwrap();
        manager.start_run().unwrap();

        let payload = {
            let checkpointer = manager.checkpointer().unwrap();
            checkpointer.beacon_payload(PAGE_UNLOAD).unwrap()
        };
        store
            .save_session(&payload.into_checkpoint(chrono::Duration::hours(1)))
            .await
            .unwrap();
        manager.teardown().await;

        manager.resume(&session.session_key).await.unwrap();
        let view = manager.view().unwrap();
        assert_eq!(view.run.status, RunStatus::Running);
        assert!(lock_state(manager.checkpointer().unwrap().state()).is_dirty());

        manager.save(CheckpointType::Manual).await.unwrap();
        assert_eq!(
            store.load_run(run_id).await.unwrap().run.status,
            RunStatus::Running
        );
    }

    #[tokio::test]
    async fn test_step_completion_moves_cursor() {
        let (_store, mut manager, run_id) = manager(false).await;
        manager.create(run_id, None).await.unwrap();
        manager.start_run().unwrap();
        let first = manager.view().unwrap().steps[0].id;
        manager.transition(first, StepStatus::Completed, None, None).unwrap();
        assert_eq!(manager.ui_state().unwrap().current_step_index, 1);

        manager.undo().unwrap();
        let view = manager.view().unwrap();
        assert_eq!(view.steps[0].status, StepStatus::Pending);
        assert!(view.can_redo);
    }
}

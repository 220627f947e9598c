//! In-memory run state.
//!
//! `RunState` owns one run, its ordered steps, the client's UI cursor and
//! the undo history. Every mutation bumps `revision` and marks the touched
//! rows dirty; the autosave scheduler uses the revision to tell whether a
//! checkpoint it just wrote is still current.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use super::error::EngineError;
use super::history::{Change, Command, CommandHistory};
use super::machine::{apply_status, can_transition, merge_payload};
use super::view::{RunView, SaveStatus};
use crate::config::HistoryConfig;
use crate::types::{
    progress_percent, Run, RunSnapshot, RunStatus, SessionData, Step, StepStatus, UiState,
    ViewMode,
};

/// Result of a step transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepChange {
    pub step_id: Uuid,
    pub step_number: u32,
    pub from: StepStatus,
    pub to: StepStatus,
}

impl StepChange {
    pub fn changed(&self) -> bool {
        self.from != self.to
    }
}

/// Everything one checkpoint write needs, copied out of the state so the
/// lock is released before any store call
#[derive(Debug, Clone)]
pub struct PendingCheckpoint {
    pub revision: u64,
    pub run: Run,
    /// Dirty steps in step order
    pub steps: Vec<Step>,
    pub session_data: SessionData,
    pub ui_state: UiState,
}

#[derive(Debug)]
pub struct RunState {
    run: Run,
    steps: Vec<Step>,
    ui: UiState,
    history: CommandHistory,
    track_notes: bool,
    track_checked: bool,

    dirty: bool,
    dirty_steps: BTreeSet<Uuid>,
    revision: u64,

    saving: bool,
    last_saved_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

impl RunState {
    pub fn new(snapshot: RunSnapshot, history: &HistoryConfig) -> Self {
        let RunSnapshot { run, steps } = snapshot.sorted();
        let ui = UiState {
            current_step_index: run.current_step_index,
            ..UiState::default()
        };
        let mut state = Self {
            run,
            steps,
            ui,
            history: CommandHistory::new(history.max_entries),
            track_notes: history.track_notes,
            track_checked: history.track_checked,
            dirty: false,
            dirty_steps: BTreeSet::new(),
            revision: 0,
            saving: false,
            last_saved_at: None,
            last_error: None,
        };
        state.recompute_progress();
        state
    }

    /// Restore view flags from a checkpoint. The cursor always follows the run.
    pub fn with_ui_state(mut self, ui: UiState) -> Self {
        self.ui = UiState {
            current_step_index: self.run.current_step_index,
            ..ui
        };
        self
    }

    /// Treat the restored state as the last successful checkpoint
    pub(crate) fn with_saved_at(mut self, saved_at: Option<DateTime<Utc>>) -> Self {
        self.last_saved_at = saved_at;
        self
    }

    /// Mirror the store-owned sharing fields; not a tracked mutation
    pub(crate) fn set_sharing(&mut self, share_token: Option<String>) {
        self.run.is_public = share_token.is_some();
        self.run.share_token = share_token;
    }

    /// Mark every row dirty so the next checkpoint rewrites all of them
    pub(crate) fn mark_all_dirty(&mut self) {
        self.dirty = true;
        self.dirty_steps = self.steps.iter().map(|s| s.id).collect();
        self.revision += 1;
    }

    // ─────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────

    pub fn run(&self) -> &Run {
        &self.run
    }

    pub fn run_id(&self) -> Uuid {
        self.run.id
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn step(&self, step_id: Uuid) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == step_id)
    }

    /// Step at a 1-based step number
    pub fn step_by_number(&self, step_number: u32) -> Option<&Step> {
        self.steps.iter().find(|s| s.step_number == step_number)
    }

    pub fn ui_state(&self) -> &UiState {
        &self.ui
    }

    pub fn snapshot(&self) -> RunSnapshot {
        RunSnapshot {
            run: self.run.clone(),
            steps: self.steps.clone(),
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn last_saved_at(&self) -> Option<DateTime<Utc>> {
        self.last_saved_at
    }

    pub fn save_status(&self) -> SaveStatus {
        if self.saving {
            SaveStatus::Saving
        } else if let Some(err) = &self.last_error {
            SaveStatus::Error(err.clone())
        } else if self.dirty {
            SaveStatus::Unsaved
        } else {
            SaveStatus::Saved
        }
    }

    pub fn view(&self, session_active: bool) -> RunView {
        RunView {
            run: self.run.clone(),
            steps: self.steps.clone(),
            progress: self.run.progress,
            can_undo: self.can_undo(),
            can_redo: self.can_redo(),
            session_active,
            save_status: self.save_status(),
            ui_state: self.ui.clone(),
            last_saved_at: self.last_saved_at,
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Step operations
    // ─────────────────────────────────────────────────────────────────────

    /// Move a step to `to`, merging notes and output, and record the change
    pub fn transition(
        &mut self,
        step_id: Uuid,
        to: StepStatus,
        notes: Option<String>,
        output: Option<Value>,
    ) -> Result<StepChange, EngineError> {
        let change = self.apply_transition(step_id, to, notes, output)?;
        if change.changed() {
            self.history.record(Command::new(
                step_id,
                Change::Status {
                    old: change.from,
                    new: change.to,
                },
            ));
        }
        Ok(change)
    }

    /// Flip the acknowledgment flag; returns the new value
    pub fn toggle_checked(&mut self, step_id: Uuid) -> Result<bool, EngineError> {
        self.ensure_mutable()?;
        let idx = self.step_index(step_id)?;
        let old = self.steps[idx].is_checked;
        self.steps[idx].is_checked = !old;
        self.touch(Some(step_id));

        if self.track_checked {
            self.history
                .record(Command::new(step_id, Change::Checked { old, new: !old }));
        }
        Ok(!old)
    }

    pub fn update_notes(&mut self, step_id: Uuid, notes: String) -> Result<(), EngineError> {
        self.ensure_mutable()?;
        let idx = self.step_index(step_id)?;
        let old = self.steps[idx].notes.clone();
        if old.as_deref() == Some(notes.as_str()) {
            return Ok(());
        }

        self.steps[idx].notes = Some(notes.clone());
        self.touch(Some(step_id));

        if self.track_notes {
            self.history.record(Command::new(
                step_id,
                Change::Notes {
                    old,
                    new: Some(notes),
                },
            ));
        }
        Ok(())
    }

    /// Merge input and output payloads; `None` leaves a field untouched
    pub fn update_step_data(
        &mut self,
        step_id: Uuid,
        input: Option<Value>,
        output: Option<Value>,
    ) -> Result<(), EngineError> {
        self.ensure_mutable()?;
        let idx = self.step_index(step_id)?;
        if input.is_none() && output.is_none() {
            return Ok(());
        }

        let step = &mut self.steps[idx];
        if let Some(input) = input {
            step.input_data = Some(input);
        }
        merge_payload(step, None, output);
        self.touch(Some(step_id));
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Run operations
    // ─────────────────────────────────────────────────────────────────────

    pub fn start(&mut self) -> Result<(), EngineError> {
        self.ensure_mutable()?;
        match self.run.status {
            RunStatus::Draft | RunStatus::Paused => {}
            status => {
                return Err(EngineError::InvalidRunTransition {
                    action: "start",
                    status,
                })
            }
        }

        let now = Utc::now();
        self.run.status = RunStatus::Running;
        self.run.started_at.get_or_insert(now);
        self.touch(None);
        tracing::info!(run_id = %self.run.id, "Run started");
        Ok(())
    }

    pub fn pause(&mut self) -> Result<(), EngineError> {
        self.ensure_mutable()?;
        if self.run.status != RunStatus::Running {
            return Err(EngineError::InvalidRunTransition {
                action: "pause",
                status: self.run.status,
            });
        }

        self.run.status = RunStatus::Paused;
        self.run.paused_at = Some(Utc::now());
        self.touch(None);
        tracing::info!(run_id = %self.run.id, "Run paused");
        Ok(())
    }

    /// Finish the run. Does not require every step to be completed.
    pub fn complete(&mut self) -> Result<(), EngineError> {
        self.ensure_active("complete")?;

        let now = Utc::now();
        self.run.status = RunStatus::Completed;
        self.run.completed_at = Some(now);
        self.run.actual_completion_time = self
            .run
            .started_at
            .map(|started| (now - started).num_seconds().max(0));
        self.recompute_progress();
        self.touch(None);
        tracing::info!(
            run_id = %self.run.id,
            completed_steps = self.run.completed_steps,
            total_steps = self.run.total_steps,
            "Run completed"
        );
        Ok(())
    }

    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), EngineError> {
        self.ensure_active("fail")?;

        let reason = reason.into();
        self.run.status = RunStatus::Failed;
        self.run.failure_reason = Some(reason.clone());
        self.touch(None);
        tracing::warn!(run_id = %self.run.id, reason = %reason, "Run failed");
        Ok(())
    }

    /// Derive `total_steps`, `completed_steps` and `progress` from the steps.
    /// A completed run always reports 100.
    pub fn recompute_progress(&mut self) {
        let completed = self.steps.iter().filter(|s| s.is_completed()).count() as u32;
        self.run.total_steps = self.steps.len() as u32;
        self.run.completed_steps = completed;
        self.run.progress = if self.run.status == RunStatus::Completed {
            100
        } else {
            progress_percent(completed, self.run.total_steps)
        };
    }

    // ─────────────────────────────────────────────────────────────────────
    // Cursor and view
    // ─────────────────────────────────────────────────────────────────────

    pub fn set_current_step(&mut self, index: usize) -> Result<(), EngineError> {
        self.ensure_mutable()?;
        if index >= self.steps.len() {
            return Err(EngineError::StepIndexOutOfRange {
                index,
                total: self.steps.len(),
            });
        }
        if index != self.run.current_step_index {
            self.set_cursor(index);
            self.touch(None);
        }
        Ok(())
    }

    /// Expand or collapse a step in the UI; returns whether it is now expanded
    pub fn toggle_expanded(&mut self, step_id: Uuid) -> Result<bool, EngineError> {
        self.step_index(step_id)?;
        if self.ui.expanded_steps.remove(&step_id) {
            Ok(false)
        } else {
            self.ui.expanded_steps.insert(step_id);
            Ok(true)
        }
    }

    pub fn set_view_mode(&mut self, mode: ViewMode) {
        self.ui.view_mode = mode;
    }

    // ─────────────────────────────────────────────────────────────────────
    // Undo / redo
    // ─────────────────────────────────────────────────────────────────────

    /// Revert the most recent command. On error the history is unchanged.
    pub fn undo(&mut self) -> Result<Command, EngineError> {
        let command = self
            .history
            .peek_undo()
            .cloned()
            .ok_or(EngineError::NothingToUndo)?;
        self.apply_change(command.step_id, &command.change.inverse())?;
        self.history.step_back();
        tracing::debug!(step_id = %command.step_id, field = command.change.field(), "Undo");
        Ok(command)
    }

    /// Re-apply the most recently undone command
    pub fn redo(&mut self) -> Result<Command, EngineError> {
        let command = self
            .history
            .peek_redo()
            .cloned()
            .ok_or(EngineError::NothingToRedo)?;
        self.apply_change(command.step_id, &command.change)?;
        self.history.step_forward();
        tracing::debug!(step_id = %command.step_id, field = command.change.field(), "Redo");
        Ok(command)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Checkpoint bookkeeping
    // ─────────────────────────────────────────────────────────────────────

    /// Copy out what the next checkpoint writes and flag the save as running
    pub fn begin_checkpoint(&mut self) -> PendingCheckpoint {
        self.saving = true;
        PendingCheckpoint {
            revision: self.revision,
            run: self.run.clone(),
            steps: self
                .steps
                .iter()
                .filter(|s| self.dirty_steps.contains(&s.id))
                .cloned()
                .collect(),
            session_data: SessionData::capture(&self.run, &self.steps),
            ui_state: self.ui.clone(),
        }
    }

    /// Record a checkpoint outcome. Dirty state only clears when nothing
    /// changed while the write was in flight.
    pub fn finish_checkpoint(&mut self, revision: u64, result: Result<(), String>) {
        self.saving = false;
        match result {
            Ok(()) => {
                self.last_saved_at = Some(Utc::now());
                self.last_error = None;
                if self.revision == revision {
                    self.dirty = false;
                    self.dirty_steps.clear();
                }
            }
            Err(message) => {
                self.last_error = Some(message);
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────

    fn apply_transition(
        &mut self,
        step_id: Uuid,
        to: StepStatus,
        notes: Option<String>,
        output: Option<Value>,
    ) -> Result<StepChange, EngineError> {
        self.ensure_mutable()?;
        let idx = self.step_index(step_id)?;
        let from = self.steps[idx].status;
        if !can_transition(from, to) {
            return Err(EngineError::InvalidStepTransition { from, to });
        }

        let has_payload = notes.is_some() || output.is_some();
        let step = &mut self.steps[idx];
        apply_status(step, to, Utc::now());
        merge_payload(step, notes, output);
        let step_number = step.step_number;

        if from != to || has_payload {
            self.touch(Some(step_id));
        }
        if from != to {
            self.recompute_progress();
            if to == StepStatus::Completed {
                self.advance_cursor_past(step_number);
            }
            tracing::debug!(
                run_id = %self.run.id,
                step_number,
                from = %from,
                to = %to,
                "Step transition"
            );
        }

        Ok(StepChange {
            step_id,
            step_number,
            from,
            to,
        })
    }

    fn apply_change(&mut self, step_id: Uuid, change: &Change) -> Result<(), EngineError> {
        match change {
            Change::Status { new, .. } => {
                self.apply_transition(step_id, *new, None, None)?;
            }
            Change::Notes { new, .. } => {
                self.ensure_mutable()?;
                let idx = self.step_index(step_id)?;
                self.steps[idx].notes = new.clone();
                self.touch(Some(step_id));
            }
            Change::Checked { new, .. } => {
                self.ensure_mutable()?;
                let idx = self.step_index(step_id)?;
                self.steps[idx].is_checked = *new;
                self.touch(Some(step_id));
            }
        }
        Ok(())
    }

    fn advance_cursor_past(&mut self, step_number: u32) {
        if let Some(next) = self
            .steps
            .iter()
            .position(|s| s.step_number == step_number + 1)
        {
            self.set_cursor(next);
        }
    }

    fn set_cursor(&mut self, index: usize) {
        self.run.current_step_index = index;
        self.ui.current_step_index = index;
    }

    fn touch(&mut self, step_id: Option<Uuid>) {
        self.dirty = true;
        self.revision += 1;
        self.run.updated_at = Utc::now();
        if let Some(id) = step_id {
            self.dirty_steps.insert(id);
        }
    }

    fn step_index(&self, step_id: Uuid) -> Result<usize, EngineError> {
        self.steps
            .iter()
            .position(|s| s.id == step_id)
            .ok_or(EngineError::StepNotFound(step_id))
    }

    fn ensure_mutable(&self) -> Result<(), EngineError> {
        if self.run.status.is_terminal() {
            return Err(EngineError::RunNotMutable {
                run_id: self.run.id,
                status: self.run.status,
            });
        }
        Ok(())
    }

    /// Running or paused, as `complete` and `fail` require
    fn ensure_active(&self, action: &'static str) -> Result<(), EngineError> {
        self.ensure_mutable()?;
        match self.run.status {
            RunStatus::Running | RunStatus::Paused => Ok(()),
            status => Err(EngineError::InvalidRunTransition { action, status }),
        }
    }
}

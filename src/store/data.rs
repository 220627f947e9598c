//! In-process tables shared by the memory and file backends.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{generate_share_token, hash_session_key, SessionCheckpoint, SessionRecord, StoreError};
use crate::types::{
    progress_percent, Run, RunSnapshot, SessionData, SessionStatus, SessionSummary, Step,
    StepStatus,
};
use crate::workflow::WorkflowDefinition;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct StoreData {
    #[serde(default)]
    runs: BTreeMap<Uuid, Run>,
    /// Steps per run, kept ordered by step number
    #[serde(default)]
    steps: BTreeMap<Uuid, Vec<Step>>,
    #[serde(default)]
    sessions: BTreeMap<Uuid, SessionRecord>,
    /// share token -> run id
    #[serde(default)]
    shares: BTreeMap<String, Uuid>,
}

impl StoreData {
    pub fn create_run(
        &mut self,
        workflow: &WorkflowDefinition,
        title: &str,
        description: Option<&str>,
    ) -> Uuid {
        let mut run = Run::new(workflow.id.clone(), title);
        run.description = description
            .map(str::to_string)
            .or_else(|| workflow.description.clone());
        run.estimated_total_time = workflow.estimated_total_time.clone();

        let id = run.id;
        self.runs.insert(id, run);
        self.steps.insert(id, Vec::new());
        id
    }

    pub fn initialize_steps(
        &mut self,
        run_id: Uuid,
        workflow: &WorkflowDefinition,
    ) -> Result<usize, StoreError> {
        let run = self
            .runs
            .get_mut(&run_id)
            .ok_or_else(|| StoreError::run_not_found(run_id))?;
        let steps = self.steps.entry(run_id).or_default();

        if steps.is_empty() {
            *steps = workflow.build_steps(run_id);
        }

        let completed = steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .count() as u32;
        run.total_steps = steps.len() as u32;
        run.completed_steps = completed;
        run.progress = progress_percent(completed, run.total_steps);

        Ok(steps.len())
    }

    pub fn load_run(&self, run_id: Uuid) -> Result<RunSnapshot, StoreError> {
        let run = self
            .runs
            .get(&run_id)
            .ok_or_else(|| StoreError::run_not_found(run_id))?;
        let steps = self.steps.get(&run_id).cloned().unwrap_or_default();
        Ok(RunSnapshot {
            run: run.clone(),
            steps,
        }
        .sorted())
    }

    pub fn update_run(&mut self, run: &Run) -> Result<(), StoreError> {
        let existing = self
            .runs
            .get_mut(&run.id)
            .ok_or_else(|| StoreError::run_not_found(run.id))?;

        let share_token = existing.share_token.take();
        let is_public = existing.is_public;
        *existing = run.clone();
        existing.share_token = share_token;
        existing.is_public = is_public;
        Ok(())
    }

    pub fn update_step(&mut self, step: &Step) -> Result<(), StoreError> {
        let slot = self
            .steps
            .get_mut(&step.run_id)
            .and_then(|steps| steps.iter_mut().find(|s| s.id == step.id))
            .ok_or_else(|| StoreError::step_not_found(step.id))?;
        *slot = step.clone();
        Ok(())
    }

    pub fn create_session(&mut self, record: &SessionRecord) -> Result<(), StoreError> {
        if !self.runs.contains_key(&record.run_id) {
            return Err(StoreError::run_not_found(record.run_id));
        }
        if let Some(data) = &record.session_data {
            ensure_bound(record, data)?;
        }
        self.sessions.insert(record.session_id, record.clone());
        Ok(())
    }

    pub fn save_session(&mut self, checkpoint: &SessionCheckpoint) -> Result<(), StoreError> {
        let record = self
            .sessions
            .get_mut(&checkpoint.session_id)
            .ok_or_else(|| StoreError::session_not_found(checkpoint.session_id))?;

        ensure_bound(record, &checkpoint.session_data)?;

        record.session_data = Some(checkpoint.session_data.clone());
        record.ui_state = checkpoint.ui_state.clone();
        record.last_checkpoint_at = Some(checkpoint.checkpoint_at);
        record.last_checkpoint_type = Some(checkpoint.checkpoint_type);
        record.expires_at = checkpoint.expires_at;
        Ok(())
    }

    pub fn resume_session(&self, session_key: &str) -> Option<SessionRecord> {
        let key_hash = hash_session_key(session_key);
        self.sessions
            .values()
            .find(|r| r.key_hash == key_hash)
            .cloned()
    }

    pub fn update_session_status(
        &mut self,
        session_id: Uuid,
        status: SessionStatus,
        reason: Option<&str>,
    ) -> Result<(), StoreError> {
        let record = self
            .sessions
            .get_mut(&session_id)
            .ok_or_else(|| StoreError::session_not_found(session_id))?;

        record.status = status;
        record.pause_reason = match status {
            SessionStatus::Paused => reason.map(str::to_string),
            _ => None,
        };
        Ok(())
    }

    pub fn list_active_sessions(&self, owner: Option<&str>) -> Vec<SessionSummary> {
        let mut summaries: Vec<SessionSummary> = self
            .sessions
            .values()
            .filter(|r| r.status != SessionStatus::Completed)
            .filter(|r| owner.is_none() || r.owner.as_deref() == owner)
            .map(|r| {
                let run = self.runs.get(&r.run_id);
                SessionSummary {
                    session_id: r.session_id,
                    run_id: r.run_id,
                    session_name: r.session_name.clone(),
                    status: r.status,
                    run_title: run.map(|run| run.title.clone()),
                    run_status: run.map(|run| run.status),
                    progress: run.map(|run| run.progress),
                    last_checkpoint_at: r.last_checkpoint_at,
                    expires_at: r.expires_at,
                }
            })
            .collect();

        // Most recently checkpointed first
        summaries.sort_by(|a, b| b.last_checkpoint_at.cmp(&a.last_checkpoint_at));
        summaries
    }

    pub fn issue_share_token(&mut self, run_id: Uuid) -> Result<String, StoreError> {
        let run = self
            .runs
            .get_mut(&run_id)
            .ok_or_else(|| StoreError::run_not_found(run_id))?;

        if let Some(token) = &run.share_token {
            run.is_public = true;
            return Ok(token.clone());
        }

        let token = generate_share_token();
        run.share_token = Some(token.clone());
        run.is_public = true;
        self.shares.insert(token.clone(), run_id);
        Ok(token)
    }

    pub fn revoke_share_token(&mut self, run_id: Uuid) -> Result<(), StoreError> {
        let run = self
            .runs
            .get_mut(&run_id)
            .ok_or_else(|| StoreError::run_not_found(run_id))?;

        if let Some(token) = run.share_token.take() {
            self.shares.remove(&token);
        }
        run.is_public = false;
        Ok(())
    }

    pub fn resolve_share(&self, token: &str) -> Option<RunSnapshot> {
        let run_id = self.shares.get(token)?;
        let run = self.runs.get(run_id)?;
        if !run.is_public || run.share_token.as_deref() != Some(token) {
            return None;
        }
        self.load_run(*run_id).ok()
    }
}

/// A session belongs to one run for its whole life
fn ensure_bound(record: &SessionRecord, data: &SessionData) -> Result<(), StoreError> {
    if data.run.id != record.run_id || data.steps.iter().any(|s| s.run_id != record.run_id) {
        return Err(StoreError::Rejected(format!(
            "session {} is bound to run {}",
            record.session_id, record.run_id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CheckpointType, UiState};
    use crate::workflow::WorkflowStep;
    use chrono::{Duration, Utc};

    fn definition(n: usize) -> WorkflowDefinition {
        WorkflowDefinition {
            id: "wf-test".to_string(),
            title: "Test workflow".to_string(),
            description: Some("from definition".to_string()),
            estimated_total_time: Some("10 min".to_string()),
            steps: (0..n)
                .map(|i| WorkflowStep {
                    step_number: None,
                    tool_name: "Tool".to_string(),
                    tool_action: format!("Action {}", i + 1),
                    details: None,
                    step_type: Default::default(),
                    estimated_time: None,
                })
                .collect(),
        }
    }

    fn record(run_id: Uuid, key: &str) -> SessionRecord {
        let now = Utc::now();
        SessionRecord {
            session_id: Uuid::new_v4(),
            run_id,
            key_hash: hash_session_key(key),
            session_name: None,
            status: SessionStatus::Active,
            session_data: None,
            ui_state: UiState::default(),
            owner: Some("alice".to_string()),
            created_at: now,
            last_checkpoint_at: None,
            last_checkpoint_type: None,
            expires_at: now + Duration::hours(1),
            pause_reason: None,
        }
    }

    #[test]
    fn test_create_and_initialize_run() {
        let mut data = StoreData::default();
        let def = definition(3);
        let run_id = data.create_run(&def, "My run", None);

        assert_eq!(data.initialize_steps(run_id, &def).unwrap(), 3);
        // Second call is a no-op
        assert_eq!(data.initialize_steps(run_id, &def).unwrap(), 3);

        let snapshot = data.load_run(run_id).unwrap();
        assert_eq!(snapshot.run.total_steps, 3);
        assert_eq!(snapshot.run.description.as_deref(), Some("from definition"));
        assert_eq!(snapshot.steps.len(), 3);
    }

    #[test]
    fn test_initialize_unknown_run() {
        let mut data = StoreData::default();
        let err = data
            .initialize_steps(Uuid::new_v4(), &definition(1))
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_update_run_preserves_share_fields() {
        let mut data = StoreData::default();
        let run_id = data.create_run(&definition(1), "Run", None);
        let token = data.issue_share_token(run_id).unwrap();

        let mut stale = data.load_run(run_id).unwrap().run;
        stale.share_token = None;
        stale.is_public = false;
        stale.title = "Renamed".to_string();
        data.update_run(&stale).unwrap();

        let stored = data.load_run(run_id).unwrap().run;
        assert_eq!(stored.title, "Renamed");
        assert_eq!(stored.share_token.as_deref(), Some(token.as_str()));
        assert!(stored.is_public);
    }

    #[test]
    fn test_update_unknown_step() {
        let mut data = StoreData::default();
        let run_id = data.create_run(&definition(1), "Run", None);
        let step = Step::new(run_id, 9, "ghost");
        assert!(data.update_step(&step).unwrap_err().is_not_found());
    }

    #[test]
    fn test_session_lookup_by_key_digest() {
        let mut data = StoreData::default();
        let run_id = data.create_run(&definition(1), "Run", None);
        let rec = record(run_id, "sk_secret");
        data.create_session(&rec).unwrap();

        assert!(data.resume_session("sk_secret").is_some());
        assert!(data.resume_session("sk_other").is_none());
    }

    #[test]
    fn test_save_session_updates_checkpoint_fields() {
        let mut data = StoreData::default();
        let def = definition(2);
        let run_id = data.create_run(&def, "Run", None);
        data.initialize_steps(run_id, &def).unwrap();
        let rec = record(run_id, "sk_1");
        data.create_session(&rec).unwrap();

        let snapshot = data.load_run(run_id).unwrap();
        let now = Utc::now();
        data.save_session(&SessionCheckpoint {
            session_id: rec.session_id,
            session_data: SessionData::capture(&snapshot.run, &snapshot.steps),
            ui_state: UiState {
                current_step_index: 1,
                ..UiState::default()
            },
            checkpoint_type: CheckpointType::Manual,
            checkpoint_at: now,
            expires_at: now + Duration::hours(2),
        })
        .unwrap();

        let stored = data.resume_session("sk_1").unwrap();
        assert_eq!(stored.ui_state.current_step_index, 1);
        assert_eq!(stored.last_checkpoint_type, Some(CheckpointType::Manual));
        assert_eq!(stored.session_data.unwrap().steps.len(), 2);
    }

    #[test]
    fn test_save_session_rejects_foreign_run() {
        let mut data = StoreData::default();
        let def = definition(2);
        let own = data.create_run(&def, "Own", None);
        let other = data.create_run(&def, "Other", None);
        data.initialize_steps(own, &def).unwrap();
        data.initialize_steps(other, &def).unwrap();
        let rec = record(own, "sk_bound");
        data.create_session(&rec).unwrap();

        let checkpoint = |session_data: SessionData| {
            let now = Utc::now();
            SessionCheckpoint {
                session_id: rec.session_id,
                session_data,
                ui_state: UiState::default(),
                checkpoint_type: CheckpointType::Unload,
                checkpoint_at: now,
                expires_at: now + Duration::hours(1),
            }
        };

        let foreign = data.load_run(other).unwrap();
        let err = data
            .save_session(&checkpoint(SessionData::capture(&foreign.run, &foreign.steps)))
            .unwrap_err();
        assert!(err.is_rejected());

        // Own run header with another run's rows
        let own_run = data.load_run(own).unwrap().run;
        let err = data
            .save_session(&checkpoint(SessionData::capture(&own_run, &foreign.steps)))
            .unwrap_err();
        assert!(err.is_rejected());

        let stored = data.resume_session("sk_bound").unwrap();
        assert!(stored.session_data.is_none());
        assert!(stored.last_checkpoint_type.is_none());

        let mut stray = record(own, "sk_stray");
        stray.session_data = Some(SessionData::capture(&foreign.run, &foreign.steps));
        assert!(data.create_session(&stray).unwrap_err().is_rejected());
        assert!(data.resume_session("sk_stray").is_none());
    }

    #[test]
    fn test_list_active_sessions_filters() {
        let mut data = StoreData::default();
        let run_id = data.create_run(&definition(1), "Run", None);
        let a = record(run_id, "a");
        let mut b = record(run_id, "b");
        b.owner = Some("bob".to_string());
        let c = record(run_id, "c");
        data.create_session(&a).unwrap();
        data.create_session(&b).unwrap();
        data.create_session(&c).unwrap();
        data.update_session_status(c.session_id, SessionStatus::Completed, None)
            .unwrap();

        assert_eq!(data.list_active_sessions(None).len(), 2);
        let alice = data.list_active_sessions(Some("alice"));
        assert_eq!(alice.len(), 1);
        assert_eq!(alice[0].session_id, a.session_id);
        assert_eq!(alice[0].run_title.as_deref(), Some("Run"));
    }

    #[test]
    fn test_share_token_idempotent_and_revocable() {
        let mut data = StoreData::default();
        let run_id = data.create_run(&definition(1), "Run", None);

        let first = data.issue_share_token(run_id).unwrap();
        let second = data.issue_share_token(run_id).unwrap();
        assert_eq!(first, second);
        assert_eq!(data.resolve_share(&first).unwrap().run.id, run_id);

        data.revoke_share_token(run_id).unwrap();
        assert!(data.resolve_share(&first).is_none());

        let third = data.issue_share_token(run_id).unwrap();
        assert_ne!(first, third);
    }

    #[test]
    fn test_resolve_fabricated_token() {
        let data = StoreData::default();
        assert!(data.resolve_share("not-a-token").is_none());
    }
}

//! Process-local checkpoint store.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use uuid::Uuid;

use super::data::StoreData;
use super::{CheckpointStore, SessionCheckpoint, SessionRecord, StoreError};
use crate::types::{Run, RunSnapshot, SessionStatus, SessionSummary, Step};
use crate::workflow::WorkflowDefinition;

/// In-memory store.
///
/// Writes can be made to fail on demand (`set_fail_writes`) to exercise the
/// retry paths of the autosave scheduler and manual save.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: Mutex<StoreData>,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
    session_saves: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write return `StoreError::Unavailable`
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful write calls
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Number of successful `save_session` calls
    pub fn session_save_count(&self) -> usize {
        self.session_saves.load(Ordering::SeqCst)
    }

    fn data(&self) -> MutexGuard<'_, StoreData> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "memory store is rejecting writes".to_string(),
            ));
        }
        Ok(())
    }

    fn write<T>(
        &self,
        op: impl FnOnce(&mut StoreData) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        self.check_writable()?;
        let result = op(&mut *self.data())?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(result)
    }
}

#[async_trait]
impl CheckpointStore for MemoryStore {
    fn backend_name(&self) -> &str {
        "memory"
    }

    async fn create_run(
        &self,
        workflow: &WorkflowDefinition,
        title: &str,
        description: Option<&str>,
    ) -> Result<Uuid, StoreError> {
        self.write(|data| Ok(data.create_run(workflow, title, description)))
    }

    async fn initialize_steps(
        &self,
        run_id: Uuid,
        workflow: &WorkflowDefinition,
    ) -> Result<usize, StoreError> {
        self.write(|data| data.initialize_steps(run_id, workflow))
    }

    async fn load_run(&self, run_id: Uuid) -> Result<RunSnapshot, StoreError> {
        self.data().load_run(run_id)
    }

    async fn update_run(&self, run: &Run) -> Result<(), StoreError> {
        self.write(|data| data.update_run(run))
    }

    async fn update_step(&self, step: &Step) -> Result<(), StoreError> {
        self.write(|data| data.update_step(step))
    }

    async fn create_session(&self, record: &SessionRecord) -> Result<(), StoreError> {
        self.write(|data| data.create_session(record))
    }

    async fn save_session(&self, checkpoint: &SessionCheckpoint) -> Result<(), StoreError> {
        self.write(|data| data.save_session(checkpoint))?;
        self.session_saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn resume_session(
        &self,
        session_key: &str,
    ) -> Result<Option<SessionRecord>, StoreError> {
        Ok(self.data().resume_session(session_key))
    }

    async fn update_session_status(
        &self,
        session_id: Uuid,
        status: SessionStatus,
        reason: Option<&str>,
    ) -> Result<(), StoreError> {
        self.write(|data| data.update_session_status(session_id, status, reason))
    }

    async fn list_active_sessions(
        &self,
        owner: Option<&str>,
    ) -> Result<Vec<SessionSummary>, StoreError> {
        Ok(self.data().list_active_sessions(owner))
    }

    async fn issue_share_token(&self, run_id: Uuid) -> Result<String, StoreError> {
        self.write(|data| data.issue_share_token(run_id))
    }

    async fn revoke_share_token(&self, run_id: Uuid) -> Result<(), StoreError> {
        self.write(|data| data.revoke_share_token(run_id))
    }

    async fn resolve_share(&self, token: &str) -> Result<Option<RunSnapshot>, StoreError> {
        Ok(self.data().resolve_share(token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::WorkflowStep;

    fn definition() -> WorkflowDefinition {
        WorkflowDefinition {
            id: "wf".to_string(),
            title: "WF".to_string(),
            description: None,
            estimated_total_time: None,
            steps: vec![WorkflowStep {
                step_number: None,
                tool_name: "Figma".to_string(),
                tool_action: "Sketch".to_string(),
                details: None,
                step_type: Default::default(),
                estimated_time: None,
            }],
        }
    }

    #[tokio::test]
    async fn test_failing_writes_leave_data_untouched() {
        let store = MemoryStore::new();
        let run_id = store.create_run(&definition(), "Run", None).await.unwrap();
        store.initialize_steps(run_id, &definition()).await.unwrap();
        let writes_before = store.write_count();

        let mut run = store.load_run(run_id).await.unwrap().run;
        run.title = "Changed".to_string();

        store.set_fail_writes(true);
        let err = store.update_run(&run).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(store.write_count(), writes_before);
        assert_eq!(store.load_run(run_id).await.unwrap().run.title, "Run");

        store.set_fail_writes(false);
        store.update_run(&run).await.unwrap();
        assert_eq!(store.load_run(run_id).await.unwrap().run.title, "Changed");
    }

    #[tokio::test]
    async fn test_reads_work_while_writes_fail() {
        let store = MemoryStore::new();
        let run_id = store.create_run(&definition(), "Run", None).await.unwrap();
        store.set_fail_writes(true);

        assert!(store.load_run(run_id).await.is_ok());
        assert!(store.list_active_sessions(None).await.unwrap().is_empty());
        assert!(store.resolve_share("nope").await.unwrap().is_none());
    }
}

//! JSON-file checkpoint store.
//!
//! Keeps every run, step, session record and share token in one
//! `checkpoints.json` document under the state directory. Each write rewrites
//! the document through a temp file and a rename so a crash mid-write leaves
//! the previous checkpoint intact.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::data::StoreData;
use super::{CheckpointStore, SessionCheckpoint, SessionRecord, StoreError};
use crate::types::{Run, RunSnapshot, SessionStatus, SessionSummary, Step};
use crate::workflow::WorkflowDefinition;

const STORE_FILE: &str = "checkpoints.json";

pub struct FileStore {
    path: PathBuf,
    data: Mutex<StoreData>,
}

impl FileStore {
    /// Open (or start) the store in `state_dir`
    pub async fn open(state_dir: &Path) -> Result<Self, StoreError> {
        tokio::fs::create_dir_all(state_dir).await?;
        let path = state_dir.join(STORE_FILE);

        let data = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => serde_json::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StoreData::default(),
            Err(e) => return Err(e.into()),
        };

        tracing::debug!(path = %path.display(), "Opened file checkpoint store");

        Ok(Self {
            path,
            data: Mutex::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply `op` and persist. The in-memory copy is only replaced once the
    /// file write succeeded, so a failed write changes nothing.
    async fn write<T>(
        &self,
        op: impl FnOnce(&mut StoreData) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut guard = self.data.lock().await;
        let mut next = guard.clone();
        let result = op(&mut next)?;

        let contents = serde_json::to_string_pretty(&next)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, contents).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        *guard = next;
        Ok(result)
    }
}

#[async_trait]
impl CheckpointStore for FileStore {
    fn backend_name(&self) -> &str {
        "file"
    }

    async fn create_run(
        &self,
        workflow: &WorkflowDefinition,
        title: &str,
        description: Option<&str>,
    ) -> Result<Uuid, StoreError> {
        self.write(|data| Ok(data.create_run(workflow, title, description)))
            .await
    }

    async fn initialize_steps(
        &self,
        run_id: Uuid,
        workflow: &WorkflowDefinition,
    ) -> Result<usize, StoreError> {
        self.write(|data| data.initialize_steps(run_id, workflow))
            .await
    }

    async fn load_run(&self, run_id: Uuid) -> Result<RunSnapshot, StoreError> {
        self.data.lock().await.load_run(run_id)
    }

    async fn update_run(&self, run: &Run) -> Result<(), StoreError> {
        self.write(|data| data.update_run(run)).await
    }

    async fn update_step(&self, step: &Step) -> Result<(), StoreError> {
        self.write(|data| data.update_step(step)).await
    }

    async fn create_session(&self, record: &SessionRecord) -> Result<(), StoreError> {
        self.write(|data| data.create_session(record)).await
    }

    async fn save_session(&self, checkpoint: &SessionCheckpoint) -> Result<(), StoreError> {
        self.write(|data| data.save_session(checkpoint)).await
    }

    async fn resume_session(
        &self,
        session_key: &str,
    ) -> Result<Option<SessionRecord>, StoreError> {
        Ok(self.data.lock().await.resume_session(session_key))
    }

    async fn update_session_status(
        &self,
        session_id: Uuid,
        status: SessionStatus,
        reason: Option<&str>,
    ) -> Result<(), StoreError> {
        self.write(|data| data.update_session_status(session_id, status, reason))
            .await
    }

    async fn list_active_sessions(
        &self,
        owner: Option<&str>,
    ) -> Result<Vec<SessionSummary>, StoreError> {
        Ok(self.data.lock().await.list_active_sessions(owner))
    }

    async fn issue_share_token(&self, run_id: Uuid) -> Result<String, StoreError> {
        self.write(|data| data.issue_share_token(run_id)).await
    }

    async fn revoke_share_token(&self, run_id: Uuid) -> Result<(), StoreError> {
        self.write(|data| data.revoke_share_token(run_id)).await
    }

    async fn resolve_share(&self, token: &str) -> Result<Option<RunSnapshot>, StoreError> {
        Ok(self.data.lock().await.resolve_share(token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::WorkflowStep;
    use tempfile::TempDir;

    fn definition() -> WorkflowDefinition {
        WorkflowDefinition {
            id: "wf-file".to_string(),
            title: "File workflow".to_string(),
            description: None,
            estimated_total_time: None,
            steps: vec![
                WorkflowStep {
                    step_number: None,
                    tool_name: "Canva".to_string(),
                    tool_action: "Design cover".to_string(),
                    details: None,
                    step_type: Default::default(),
                    estimated_time: None,
                },
                WorkflowStep {
                    step_number: None,
                    tool_name: "Gumroad".to_string(),
                    tool_action: "Publish".to_string(),
                    details: None,
                    step_type: Default::default(),
                    estimated_time: None,
                },
            ],
        }
    }

    #[tokio::test]
    async fn test_data_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let def = definition();

        let run_id = {
            let store = FileStore::open(dir.path()).await.unwrap();
            let run_id = store.create_run(&def, "Persisted", None).await.unwrap();
            store.initialize_steps(run_id, &def).await.unwrap();
            run_id
        };

        let reopened = FileStore::open(dir.path()).await.unwrap();
        let snapshot = reopened.load_run(run_id).await.unwrap();
        assert_eq!(snapshot.run.title, "Persisted");
        assert_eq!(snapshot.steps.len(), 2);
        assert!(reopened.path().ends_with(STORE_FILE));
    }

    #[tokio::test]
    async fn test_share_token_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let def = definition();

        let (run_id, token) = {
            let store = FileStore::open(dir.path()).await.unwrap();
            let run_id = store.create_run(&def, "Shared", None).await.unwrap();
            let token = store.issue_share_token(run_id).await.unwrap();
            (run_id, token)
        };

        let reopened = FileStore::open(dir.path()).await.unwrap();
        let resolved = reopened.resolve_share(&token).await.unwrap().unwrap();
        assert_eq!(resolved.run.id, run_id);
    }

    #[tokio::test]
    async fn test_failed_op_does_not_touch_file() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();

        let err = store
            .initialize_steps(Uuid::new_v4(), &definition())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_reported() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(STORE_FILE), "{ not json").unwrap();

        let result = FileStore::open(dir.path()).await;
        assert!(matches!(result, Err(StoreError::Serialization(_))));
    }
}

//! Integration tests for the run lifecycle driven through a session.
//!
//! These tests use the file-backed store in a temp directory so every
//! checkpoint goes through the same code path as the CLI.

use std::sync::Arc;

use tempfile::TempDir;
use uuid::Uuid;

use workflow_runner::config::Config;
use workflow_runner::engine::EngineError;
use workflow_runner::session::SessionManager;
use workflow_runner::store::{CheckpointStore, FileStore};
use workflow_runner::telemetry::TelemetryService;
use workflow_runner::types::{CheckpointType, RunStatus, StepStatus};
use workflow_runner::workflow::{WorkflowDefinition, WorkflowStep};

// ─── Fixtures ─────────────────────────────────────────────────────────────────

fn definition() -> WorkflowDefinition {
    let steps = [
        ("ChatGPT", "Draft the brief"),
        ("Midjourney", "Generate a logo"),
        ("Canva", "Assemble the deck"),
    ];
    WorkflowDefinition {
        id: "brand-kit".into(),
        title: "Brand kit".into(),
        description: None,
        estimated_total_time: Some("1h".into()),
        steps: steps
            .iter()
            .map(|(tool, action)| WorkflowStep {
                step_number: None,
                tool_name: (*tool).into(),
                tool_action: (*action).into(),
                details: None,
                step_type: Default::default(),
                estimated_time: None,
            })
            .collect(),
    }
}

fn config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.paths.state = dir.path().to_string_lossy().to_string();
    config.autosave.enabled = false;
    config
}

async fn setup() -> (TempDir, Arc<FileStore>, SessionManager, Uuid) {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    let store = Arc::new(FileStore::open(&config.state_path()).await.unwrap());
    let mut manager = SessionManager::new(store.clone(), &config, TelemetryService::disabled());

    let run_id = manager
        .create_run(&definition(), "Acme brand kit", None)
        .await
        .unwrap();
    manager.create(run_id, Some("laptop")).await.unwrap();
    (dir, store, manager, run_id)
}

fn step_id(manager: &SessionManager, number: u32) -> Uuid {
    manager
        .view()
        .unwrap()
        .steps
        .iter()
        .find(|s| s.step_number == number)
        .unwrap()
        .id
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_new_run_is_draft_with_pending_steps() {
    let (_dir, _store, manager, _run_id) = setup().await;
    let view = manager.view().unwrap();

    assert_eq!(view.run.status, RunStatus::Draft);
    assert_eq!(view.run.total_steps, 3);
    assert_eq!(view.progress, 0);
    assert!(view.steps.iter().all(|s| s.status == StepStatus::Pending));
    assert_eq!(view.steps[1].title, "Midjourney: Generate a logo");
    assert!(!view.can_undo);
}

#[tokio::test]
async fn test_completing_first_step_updates_progress_and_cursor() {
    let (_dir, _store, mut manager, _run_id) = setup().await;
    manager.start_run().unwrap();
    manager
        .transition(step_id(&manager, 1), StepStatus::Completed, None, None)
        .unwrap();

    let view = manager.view().unwrap();
    assert_eq!(view.progress, 33);
    assert_eq!(view.run.completed_steps, 1);
    assert_eq!(view.run.current_step_index, 1);
    assert!(view.can_undo);
}

#[tokio::test]
async fn test_undo_reverts_completion() {
    let (_dir, _store, mut manager, _run_id) = setup().await;
    manager.start_run().unwrap();
    let first = step_id(&manager, 1);
    manager
        .transition(first, StepStatus::Completed, None, None)
        .unwrap();

    manager.undo().unwrap();
    let view = manager.view().unwrap();
    assert_eq!(view.steps[0].status, StepStatus::Pending);
    assert_eq!(view.progress, 0);
    assert!(view.can_redo);

    manager.redo().unwrap();
    assert_eq!(manager.view().unwrap().progress, 33);
}

#[tokio::test]
async fn test_completed_run_rejects_transitions() {
    let (_dir, store, mut manager, run_id) = setup().await;
    manager.start_run().unwrap();
    for n in 1..=3 {
        manager
            .transition(step_id(&manager, n), StepStatus::Completed, None, None)
            .unwrap();
    }
    manager.complete_run().await.unwrap();

    let view = manager.view().unwrap();
    assert_eq!(view.run.status, RunStatus::Completed);
    assert_eq!(view.progress, 100);

    let err = manager
        .transition(step_id(&manager, 2), StepStatus::Pending, None, None)
        .unwrap_err();
    assert!(err.is_validation());

    manager.complete().await.unwrap();
    let stored = store.load_run(run_id).await.unwrap();
    assert_eq!(stored.run.status, RunStatus::Completed);
    assert!(stored.run.completed_at.is_some());
}

#[tokio::test]
async fn test_checkpoint_persists_notes_and_checks() {
    let (_dir, store, mut manager, run_id) = setup().await;
    manager.start_run().unwrap();
    let second = step_id(&manager, 2);
    manager
        .transition(
            second,
            StepStatus::InProgress,
            Some("waiting on palette".into()),
            None,
        )
        .unwrap();
    assert!(manager.toggle_checked(second).unwrap());
    manager.save(CheckpointType::Manual).await.unwrap();

    let stored = store.load_run(run_id).await.unwrap();
    let step = stored.steps.iter().find(|s| s.id == second).unwrap();
    assert_eq!(step.status, StepStatus::InProgress);
    assert_eq!(step.notes.as_deref(), Some("waiting on palette"));
    assert!(step.is_checked);
    assert!(step.started_at.is_some());
    assert_eq!(stored.run.status, RunStatus::Running);
}

#[tokio::test]
async fn test_failed_run_records_reason() {
    let (_dir, store, mut manager, run_id) = setup().await;
    manager.start_run().unwrap();
    manager.fail_run("tool outage").await.unwrap();
    manager.save(CheckpointType::Manual).await.unwrap();

    let stored = store.load_run(run_id).await.unwrap();
    assert_eq!(stored.run.status, RunStatus::Failed);
    assert_eq!(stored.run.failure_reason.as_deref(), Some("tool outage"));
}

#[tokio::test]
async fn test_share_link_reflects_saved_state_only() {
    let (_dir, _store, mut manager, run_id) = setup().await;
    manager.start_run().unwrap();
    assert!(matches!(
        manager.issue_share_token().await,
        Err(EngineError::NeverCheckpointed(_))
    ));

    manager
        .transition(step_id(&manager, 1), StepStatus::Completed, None, None)
        .unwrap();
    manager.save(CheckpointType::Manual).await.unwrap();
    let token = manager.issue_share_token().await.unwrap();

    // Unsaved edits stay private until the next checkpoint
    manager
        .transition(step_id(&manager, 2), StepStatus::Completed, None, None)
        .unwrap();
    let shared = manager.shares().resolve(&token).await.unwrap();
    assert_eq!(shared.run.id, run_id);
    assert_eq!(shared.completion_rate, 33);
    assert!(shared.run.share_token.is_none());

    manager.revoke_share_token().await.unwrap();
    assert!(matches!(
        manager.shares().resolve(&token).await,
        Err(EngineError::ShareNotFound)
    ));
}

#[tokio::test]
async fn test_fabricated_share_token_is_not_found() {
    let (_dir, _store, manager, _run_id) = setup().await;
    let err = manager.shares().resolve("f00dfeed").await.unwrap_err();
    assert!(err.is_not_found());
}

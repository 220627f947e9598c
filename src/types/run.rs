//! Run types - one execution instance of a workflow definition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use super::step::Step;

/// Overall status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, Default)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum RunStatus {
    /// Created, not yet started
    #[default]
    Draft,
    Running,
    Paused,
    Completed,
    Failed,
}

impl RunStatus {
    /// Completed and failed runs accept no further changes
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Draft => write!(f, "draft"),
            RunStatus::Running => write!(f, "running"),
            RunStatus::Paused => write!(f, "paused"),
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Run {
    pub id: Uuid,

    /// Reference to the external workflow definition
    pub workflow_id: String,

    pub title: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub status: RunStatus,

    pub total_steps: u32,

    /// Derived: number of steps in `completed`
    #[serde(default)]
    pub completed_steps: u32,

    /// Derived: 0-100
    #[serde(default)]
    pub progress: u8,

    /// 0-based cursor into the ordered steps
    #[serde(default)]
    pub current_step_index: usize,

    #[serde(default)]
    pub estimated_total_time: Option<String>,

    // ─────────────────────────────────────────────────────────────────────
    // Timestamps
    // ─────────────────────────────────────────────────────────────────────
    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub paused_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,

    /// Seconds between `started_at` and `completed_at`
    #[serde(default)]
    pub actual_completion_time: Option<i64>,

    #[serde(default)]
    pub failure_reason: Option<String>,

    // ─────────────────────────────────────────────────────────────────────
    // Sharing
    // ─────────────────────────────────────────────────────────────────────
    #[serde(default)]
    pub share_token: Option<String>,

    #[serde(default)]
    pub is_public: bool,
}

impl Run {
    /// Create a draft run with no steps yet
    pub fn new(workflow_id: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            workflow_id: workflow_id.into(),
            title: title.into(),
            description: None,
            status: RunStatus::Draft,
            total_steps: 0,
            completed_steps: 0,
            progress: 0,
            current_step_index: 0,
            estimated_total_time: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            paused_at: None,
            completed_at: None,
            actual_completion_time: None,
            failure_reason: None,
            share_token: None,
            is_public: false,
        }
    }
}

/// `round(100 * completed / total)`, or 0 for an empty run
pub fn progress_percent(completed: u32, total: u32) -> u8 {
    if total == 0 {
        return 0;
    }
    ((f64::from(completed) * 100.0) / f64::from(total)).round() as u8
}

/// A run together with its ordered steps, as held by the checkpoint store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RunSnapshot {
    pub run: Run,
    pub steps: Vec<Step>,
}

impl RunSnapshot {
    /// Sort steps by `step_number`
    pub fn sorted(mut self) -> Self {
        self.steps.sort_by_key(|s| s.step_number);
        self
    }
}

//! Session types - a recoverable binding between one client and one run.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use super::run::{Run, RunSnapshot, RunStatus};
use super::step::Step;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, Default)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum SessionStatus {
    #[default]
    Active,
    Paused,
    Completed,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::Active => write!(f, "active"),
            SessionStatus::Paused => write!(f, "paused"),
            SessionStatus::Completed => write!(f, "completed"),
        }
    }
}

/// Why a checkpoint was written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum CheckpointType {
    /// Autosave tick
    Auto,
    /// User-triggered save
    Manual,
    /// Final write before the session pauses
    Pause,
    /// Best-effort beacon sent while the page goes away
    Unload,
}

impl std::fmt::Display for CheckpointType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckpointType::Auto => write!(f, "auto"),
            CheckpointType::Manual => write!(f, "manual"),
            CheckpointType::Pause => write!(f, "pause"),
            CheckpointType::Unload => write!(f, "unload"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, Default)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum ViewMode {
    #[default]
    Timeline,
    List,
    Compact,
}

/// Client cursor and view flags saved alongside each checkpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, Default)]
#[ts(export)]
pub struct UiState {
    #[serde(default)]
    pub current_step_index: usize,
    #[serde(default)]
    pub expanded_steps: BTreeSet<Uuid>,
    #[serde(default)]
    pub view_mode: ViewMode,
}

/// Last-known run and steps captured at checkpoint time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SessionData {
    pub run: Run,
    pub steps: Vec<Step>,
    pub captured_at: DateTime<Utc>,
}

impl SessionData {
    pub fn capture(run: &Run, steps: &[Step]) -> Self {
        Self {
            run: run.clone(),
            steps: steps.to_vec(),
            captured_at: Utc::now(),
        }
    }

    pub fn into_snapshot(self) -> RunSnapshot {
        RunSnapshot {
            run: self.run,
            steps: self.steps,
        }
        .sorted()
    }
}

/// A client's binding to a run, as the session manager holds it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: Uuid,
    pub run_id: Uuid,
    /// Capability token presented to resume; never persisted in clear
    pub session_key: String,
    pub session_name: Option<String>,
    pub status: SessionStatus,
    pub ui_state: UiState,
    pub owner: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_checkpoint_at: Option<DateTime<Utc>>,
    pub last_checkpoint_type: Option<CheckpointType>,
    pub expires_at: DateTime<Utc>,
    pub pause_reason: Option<String>,
}

impl Session {
    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }
}

/// Listing entry for recovery pickers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub run_id: Uuid,
    pub session_name: Option<String>,
    pub status: SessionStatus,
    pub run_title: Option<String>,
    pub run_status: Option<RunStatus>,
    pub progress: Option<u8>,
    pub last_checkpoint_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
}

//! Read model handed to UI callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::types::{Run, Step, UiState};

/// Save indicator derived from the dirty flag and the last write outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum SaveStatus {
    Saved,
    Unsaved,
    Saving,
    Error(String),
}

impl std::fmt::Display for SaveStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SaveStatus::Saved => write!(f, "saved"),
            SaveStatus::Unsaved => write!(f, "unsaved"),
            SaveStatus::Saving => write!(f, "saving"),
            SaveStatus::Error(msg) => write!(f, "error: {}", msg),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RunView {
    pub run: Run,
    pub steps: Vec<Step>,
    pub progress: u8,
    pub can_undo: bool,
    pub can_redo: bool,
    pub session_active: bool,
    pub save_status: SaveStatus,
    pub ui_state: UiState,
    pub last_saved_at: Option<DateTime<Utc>>,
}

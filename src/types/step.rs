//! Step types - one checklist item inside a run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

/// How a step is carried out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, Default)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum StepType {
    /// The user performs the action in a third-party tool
    #[default]
    Manual,
    /// Read-only guidance, nothing to produce
    Instruction,
    /// Produces output (e.g. a generated prompt) that is captured on the step
    Generator,
}

impl std::fmt::Display for StepType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepType::Manual => write!(f, "manual"),
            StepType::Instruction => write!(f, "instruction"),
            StepType::Generator => write!(f, "generator"),
        }
    }
}

/// Lifecycle status of a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, Default)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum StepStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Skipped,
    Failed,
}

impl StepStatus {
    /// Completed, skipped and failed are resting states
    pub fn is_settled(self) -> bool {
        matches!(
            self,
            StepStatus::Completed | StepStatus::Skipped | StepStatus::Failed
        )
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepStatus::Pending => write!(f, "pending"),
            StepStatus::InProgress => write!(f, "in_progress"),
            StepStatus::Completed => write!(f, "completed"),
            StepStatus::Skipped => write!(f, "skipped"),
            StepStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for StepStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "pending" => Ok(StepStatus::Pending),
            "in_progress" | "started" => Ok(StepStatus::InProgress),
            "completed" | "done" => Ok(StepStatus::Completed),
            "skipped" => Ok(StepStatus::Skipped),
            "failed" => Ok(StepStatus::Failed),
            other => Err(format!("unknown step status '{}'", other)),
        }
    }
}

/// A checklist item owned by exactly one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Step {
    pub id: Uuid,

    /// Owning run (back-reference only)
    pub run_id: Uuid,

    /// 1-based position, unique within the run
    pub step_number: u32,

    pub title: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(rename = "type", default)]
    pub step_type: StepType,

    /// Tool this step is performed in, copied from the workflow definition
    #[serde(default)]
    pub tool_name: Option<String>,

    /// Free-form estimate from the workflow definition (e.g. "5 min")
    #[serde(default)]
    pub estimated_time: Option<String>,

    #[serde(default)]
    pub status: StepStatus,

    /// User acknowledgment flag, independent of `status`
    #[serde(default)]
    pub is_checked: bool,

    #[serde(default)]
    pub notes: Option<String>,

    #[serde(default)]
    pub input_data: Option<serde_json::Value>,

    #[serde(default)]
    pub output_data: Option<serde_json::Value>,

    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,

    /// Seconds between `started_at` and `completed_at`
    #[serde(default)]
    pub actual_time_spent: Option<i64>,
}

impl Step {
    /// Create a pending step
    pub fn new(run_id: Uuid, step_number: u32, title: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            run_id,
            step_number,
            title: title.into(),
            description: None,
            step_type: StepType::Manual,
            tool_name: None,
            estimated_time: None,
            status: StepStatus::Pending,
            is_checked: false,
            notes: None,
            input_data: None,
            output_data: None,
            started_at: None,
            completed_at: None,
            actual_time_spent: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == StepStatus::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display_matches_serde() {
        for status in [
            StepStatus::Pending,
            StepStatus::InProgress,
            StepStatus::Completed,
            StepStatus::Skipped,
            StepStatus::Failed,
        ] {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status));
        }
    }

    #[test]
    fn test_status_from_str_aliases() {
        assert_eq!("done".parse::<StepStatus>(), Ok(StepStatus::Completed));
        assert_eq!("in-progress".parse::<StepStatus>(), Ok(StepStatus::InProgress));
        assert!("finished".parse::<StepStatus>().is_err());
    }

    #[test]
    fn test_step_type_serializes_as_type() {
        let step = Step::new(Uuid::new_v4(), 1, "Open the editor");
        let value = serde_json::to_value(&step).unwrap();
        assert_eq!(value["type"], "manual");
        assert_eq!(value["status"], "pending");
    }
}

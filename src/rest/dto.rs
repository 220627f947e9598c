//! Data Transfer Objects for the REST API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

// Note: ToSchema is derived on all DTOs for OpenAPI documentation generation

use crate::types::{RunSnapshot, SessionData, SessionSummary, ShareSnapshot, Step, UiState};

// =============================================================================
// Health DTOs
// =============================================================================

/// Health check response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Service status with store info
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StatusResponse {
    pub status: String,
    pub version: String,
    pub store_backend: String,
    pub session_ttl_hours: u64,
    pub autosave_interval_ms: u64,
}

// =============================================================================
// Run DTOs
// =============================================================================

/// A run with its ordered steps
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RunResponse {
    pub id: Uuid,
    pub workflow_id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: String,
    pub total_steps: u32,
    pub completed_steps: u32,
    pub progress: u8,
    pub current_step_index: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_completion_time: Option<i64>,
    pub is_public: bool,
    pub steps: Vec<StepResponse>,
}

impl From<RunSnapshot> for RunResponse {
    fn from(snapshot: RunSnapshot) -> Self {
        let RunSnapshot { run, steps } = snapshot.sorted();
        Self {
            id: run.id,
            workflow_id: run.workflow_id,
            title: run.title,
            description: run.description,
            status: run.status.to_string(),
            total_steps: run.total_steps,
            completed_steps: run.completed_steps,
            progress: run.progress,
            current_step_index: run.current_step_index,
            created_at: run.created_at,
            updated_at: run.updated_at,
            started_at: run.started_at,
            completed_at: run.completed_at,
            actual_completion_time: run.actual_completion_time,
            is_public: run.is_public,
            steps: steps.iter().map(StepResponse::from).collect(),
        }
    }
}

/// One checklist step
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StepResponse {
    pub id: Uuid,
    pub step_number: u32,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub step_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_time: Option<String>,
    pub status: String,
    pub is_checked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub output_data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_time_spent: Option<i64>,
}

impl From<&Step> for StepResponse {
    fn from(step: &Step) -> Self {
        Self {
            id: step.id,
            step_number: step.step_number,
            title: step.title.clone(),
            description: step.description.clone(),
            step_type: step.step_type.to_string(),
            tool_name: step.tool_name.clone(),
            estimated_time: step.estimated_time.clone(),
            status: step.status.to_string(),
            is_checked: step.is_checked,
            notes: step.notes.clone(),
            output_data: step.output_data.clone(),
            started_at: step.started_at,
            completed_at: step.completed_at,
            actual_time_spent: step.actual_time_spent,
        }
    }
}

// =============================================================================
// Share DTOs
// =============================================================================

/// Public projection behind a share link
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ShareResponse {
    pub run: RunResponse,
    pub shared_at: DateTime<Utc>,
    pub is_completed: bool,
    pub completion_rate: u8,
}

impl From<ShareSnapshot> for ShareResponse {
    fn from(share: ShareSnapshot) -> Self {
        Self {
            run: RunResponse::from(RunSnapshot {
                run: share.run,
                steps: share.steps,
            }),
            shared_at: share.shared_at,
            is_completed: share.is_completed,
            completion_rate: share.completion_rate,
        }
    }
}

// =============================================================================
// Session DTOs
// =============================================================================

/// Query for the active session listing
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ActiveSessionsQuery {
    /// Only sessions carrying this owner label
    pub owner: Option<String>,
}

/// Listing entry for recovery pickers
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SessionSummaryResponse {
    pub session_id: Uuid,
    pub run_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_name: Option<String>,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_checkpoint_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
}

impl From<SessionSummary> for SessionSummaryResponse {
    fn from(s: SessionSummary) -> Self {
        Self {
            session_id: s.session_id,
            run_id: s.run_id,
            session_name: s.session_name,
            status: s.status.to_string(),
            run_title: s.run_title,
            run_status: s.run_status.map(|st| st.to_string()),
            progress: s.progress,
            last_checkpoint_at: s.last_checkpoint_at,
            expires_at: s.expires_at,
        }
    }
}

/// Unload beacon body. The session id comes from the path.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BeaconRequest {
    #[schema(value_type = Object)]
    pub session_data: SessionData,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub ui_state: UiState,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Acknowledgment for a stored beacon
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BeaconAccepted {
    pub session_id: Uuid,
    pub checkpoint_at: DateTime<Utc>,
}

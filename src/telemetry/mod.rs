//! Telemetry for run and session lifecycle events.
//!
//! Events fan out to sinks (structured log lines, webhooks). Delivery is
//! fire-and-forget: a failing sink is logged and never affects run state.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

mod log_sink;
mod service;
mod sink;
mod webhook_sink;

pub use log_sink::LogSink;
pub use service::TelemetryService;
pub use sink::TelemetrySink;
pub use webhook_sink::WebhookSink;

/// All telemetry events the engine emits
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data")]
pub enum TelemetryEvent {
    #[serde(rename = "run.started")]
    RunStarted {
        run_id: Uuid,
        workflow_id: String,
        total_steps: u32,
    },

    #[serde(rename = "step.completed")]
    StepCompleted {
        run_id: Uuid,
        step_id: Uuid,
        step_number: u32,
        progress: u8,
        #[serde(skip_serializing_if = "Option::is_none")]
        time_spent_seconds: Option<i64>,
    },

    #[serde(rename = "run.completed")]
    RunCompleted {
        run_id: Uuid,
        completed_steps: u32,
        total_steps: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        duration_seconds: Option<i64>,
    },

    #[serde(rename = "run.failed")]
    RunFailed { run_id: Uuid, reason: String },

    #[serde(rename = "session.created")]
    SessionCreated { session_id: Uuid, run_id: Uuid },

    #[serde(rename = "session.resumed")]
    SessionResumed {
        session_id: Uuid,
        run_id: Uuid,
        progress: u8,
    },

    #[serde(rename = "session.paused")]
    SessionPaused {
        session_id: Uuid,
        run_id: Uuid,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

impl TelemetryEvent {
    /// Event type string for filtering (e.g., "run.started")
    pub fn event_type(&self) -> &'static str {
        match self {
            TelemetryEvent::RunStarted { .. } => "run.started",
            TelemetryEvent::StepCompleted { .. } => "step.completed",
            TelemetryEvent::RunCompleted { .. } => "run.completed",
            TelemetryEvent::RunFailed { .. } => "run.failed",
            TelemetryEvent::SessionCreated { .. } => "session.created",
            TelemetryEvent::SessionResumed { .. } => "session.resumed",
            TelemetryEvent::SessionPaused { .. } => "session.paused",
        }
    }

    pub fn run_id(&self) -> Uuid {
        match self {
            TelemetryEvent::RunStarted { run_id, .. }
            | TelemetryEvent::StepCompleted { run_id, .. }
            | TelemetryEvent::RunCompleted { run_id, .. }
            | TelemetryEvent::RunFailed { run_id, .. }
            | TelemetryEvent::SessionCreated { run_id, .. }
            | TelemetryEvent::SessionResumed { run_id, .. }
            | TelemetryEvent::SessionPaused { run_id, .. } => *run_id,
        }
    }

    pub fn session_id(&self) -> Option<Uuid> {
        match self {
            TelemetryEvent::SessionCreated { session_id, .. }
            | TelemetryEvent::SessionResumed { session_id, .. }
            | TelemetryEvent::SessionPaused { session_id, .. } => Some(*session_id),
            _ => None,
        }
    }

    /// Run progress at the time of the event, where the event records it
    pub fn progress(&self) -> Option<u8> {
        match self {
            TelemetryEvent::StepCompleted { progress, .. }
            | TelemetryEvent::SessionResumed { progress, .. } => Some(*progress),
            TelemetryEvent::RunCompleted { .. } => Some(100),
            _ => None,
        }
    }
}

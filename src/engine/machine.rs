//! Step status transitions.
//!
//! Settled steps (completed, skipped, failed) may only be reopened, which
//! keeps every recorded transition reversible by undo.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::types::{Step, StepStatus};

/// Whether `from -> to` is allowed. Staying in place is always allowed.
pub fn can_transition(from: StepStatus, to: StepStatus) -> bool {
    if from == to {
        return true;
    }
    match from {
        StepStatus::Pending | StepStatus::InProgress => true,
        StepStatus::Completed | StepStatus::Skipped | StepStatus::Failed => {
            matches!(to, StepStatus::Pending | StepStatus::InProgress)
        }
    }
}

/// Set `to` on the step and maintain its timestamps.
///
/// `completed_at` is present iff the status is completed. `started_at` is
/// stamped on the first move out of pending and kept afterwards.
pub(crate) fn apply_status(step: &mut Step, to: StepStatus, now: DateTime<Utc>) {
    if step.status == to {
        return;
    }

    if step.status == StepStatus::Pending && step.started_at.is_none() {
        step.started_at = Some(now);
    }

    step.status = to;
    if to == StepStatus::Completed {
        step.completed_at = Some(now);
        step.actual_time_spent = step
            .started_at
            .map(|started| (now - started).num_seconds().max(0));
    } else {
        step.completed_at = None;
    }
}

/// Merge provided notes and output; `None` leaves the field as is
pub(crate) fn merge_payload(step: &mut Step, notes: Option<String>, output: Option<Value>) {
    if let Some(notes) = notes {
        step.notes = Some(notes);
    }
    if let Some(output) = output {
        step.output_data = Some(output);
    }
}

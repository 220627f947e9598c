//! Read-only projection served to share-link viewers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use super::run::{Run, RunSnapshot, RunStatus};
use super::step::Step;

/// Frozen copy of a run and its steps, addressed by share token.
///
/// The share token itself and step `input_data` are stripped: a viewer holding
/// the link should not be able to read back what the owner typed in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ShareSnapshot {
    pub run: Run,
    pub steps: Vec<Step>,
    pub shared_at: DateTime<Utc>,
    pub is_completed: bool,
    pub completion_rate: u8,
}

impl ShareSnapshot {
    pub fn project(snapshot: RunSnapshot) -> Self {
        let RunSnapshot { mut run, steps } = snapshot.sorted();
        run.share_token = None;

        let steps = steps
            .into_iter()
            .map(|mut step| {
                step.input_data = None;
                step
            })
            .collect();

        Self {
            is_completed: run.status == RunStatus::Completed,
            completion_rate: run.progress,
            run,
            steps,
            shared_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_projection_strips_sensitive_fields() {
        let mut run = Run::new("wf", "Shared");
        run.share_token = Some("secret".to_string());
        run.is_public = true;
        run.progress = 50;
        let mut step = Step::new(run.id, 1, "Paste API key");
        step.input_data = Some(serde_json::json!({"key": "sk-123"}));
        step.output_data = Some(serde_json::json!({"result": "ok"}));

        let projected = ShareSnapshot::project(RunSnapshot {
            run,
            steps: vec![step],
        });

        assert!(projected.run.share_token.is_none());
        assert!(projected.run.is_public);
        assert!(projected.steps[0].input_data.is_none());
        assert!(projected.steps[0].output_data.is_some());
        assert_eq!(projected.completion_rate, 50);
        assert!(!projected.is_completed);
    }
}

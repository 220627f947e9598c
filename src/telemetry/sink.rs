//! Telemetry sink trait definition.

use anyhow::Result;
use async_trait::async_trait;

use super::TelemetryEvent;

/// A destination for telemetry events.
///
/// Each sink decides which event types it receives and whether it is
/// currently enabled.
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    /// Sink name (for logging and config identification)
    fn name(&self) -> &str;

    /// Whether this sink should receive the event
    fn handles_event(&self, event: &TelemetryEvent) -> bool;

    fn is_enabled(&self) -> bool;

    /// Deliver one event. Errors are logged by the dispatcher, never propagated.
    async fn send(&self, event: &TelemetryEvent) -> Result<()>;
}

/// Shared filter rule: an empty subscription list accepts everything
pub(crate) fn subscribed(subscriptions: &[String], event: &TelemetryEvent) -> bool {
    subscriptions.is_empty() || subscriptions.iter().any(|s| s == event.event_type())
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn started() -> TelemetryEvent {
        TelemetryEvent::RunStarted {
            run_id: Uuid::new_v4(),
            workflow_id: "wf".into(),
            total_steps: 1,
        }
    }

    #[test]
    fn test_empty_filter_matches_all() {
        assert!(subscribed(&[], &started()));
    }

    #[test]
    fn test_specific_filter() {
        let subs = vec!["run.completed".to_string()];
        assert!(!subscribed(&subs, &started()));

        let subs = vec!["run.started".to_string()];
        assert!(subscribed(&subs, &started()));
    }
}

//! Telemetry sink that writes each event as a structured log line.

use anyhow::Result;
use async_trait::async_trait;

use super::sink::TelemetrySink;
use super::TelemetryEvent;

pub struct LogSink {
    enabled: bool,
}

impl LogSink {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}

#[async_trait]
impl TelemetrySink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    fn handles_event(&self, _event: &TelemetryEvent) -> bool {
        true
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    async fn send(&self, event: &TelemetryEvent) -> Result<()> {
        let data = serde_json::to_string(event)?;
        tracing::info!(
            target: "telemetry",
            event = event.event_type(),
            run_id = %event.run_id(),
            data = %data,
            "Telemetry event"
        );
        Ok(())
    }
}

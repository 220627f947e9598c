//! Central telemetry dispatcher.

use std::sync::Arc;

use super::log_sink::LogSink;
use super::sink::TelemetrySink;
use super::webhook_sink::WebhookSink;
use super::TelemetryEvent;
use crate::config::TelemetryConfig;

/// Receives events and dispatches them to every enabled sink that handles
/// the event type.
#[derive(Clone)]
pub struct TelemetryService {
    sinks: Vec<Arc<dyn TelemetrySink>>,
    enabled: bool,
}

impl TelemetryService {
    pub fn from_config(config: &TelemetryConfig) -> Self {
        let mut sinks: Vec<Arc<dyn TelemetrySink>> = Vec::new();

        if config.log_events {
            sinks.push(Arc::new(LogSink::new(true)));
        }

        for webhook_config in &config.webhooks {
            if webhook_config.enabled && !webhook_config.url.is_empty() {
                sinks.push(Arc::new(WebhookSink::new(webhook_config)));
            } else {
                tracing::debug!(
                    webhook = webhook_config.name.as_deref().unwrap_or("unnamed"),
                    "Skipping disabled telemetry webhook"
                );
            }
        }

        Self {
            sinks,
            enabled: config.enabled,
        }
    }

    /// Dispatcher over an explicit sink list
    pub fn with_sinks(sinks: Vec<Arc<dyn TelemetrySink>>) -> Self {
        Self {
            sinks,
            enabled: true,
        }
    }

    pub fn disabled() -> Self {
        Self {
            sinks: Vec::new(),
            enabled: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    /// Dispatch an event to all matching sinks.
    ///
    /// Fire-and-forget: each delivery is spawned as its own task and errors
    /// are logged, never returned. Outside a tokio runtime the event is dropped.
    pub fn notify(&self, event: TelemetryEvent) {
        if !self.enabled {
            return;
        }

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::debug!(
                event = event.event_type(),
                "No tokio runtime available for telemetry"
            );
            return;
        };

        for sink in &self.sinks {
            if sink.is_enabled() && sink.handles_event(&event) {
                let sink = sink.clone();
                let event = event.clone();

                handle.spawn(async move {
                    if let Err(e) = sink.send(&event).await {
                        tracing::warn!(
                            sink = %sink.name(),
                            event = %event.event_type(),
                            error = %e,
                            "Telemetry delivery failed"
                        );
                    }
                });
            }
        }
    }
}

impl std::fmt::Debug for TelemetryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryService")
            .field("sinks", &self.sinks.iter().map(|s| s.name()).collect::<Vec<_>>())
            .field("enabled", &self.enabled)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WebhookConfig;
    use anyhow::Result;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    struct CountingSink {
        enabled: bool,
        events: Vec<String>,
        count: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl TelemetrySink for CountingSink {
        fn name(&self) -> &str {
            "counting"
        }

        fn handles_event(&self, event: &TelemetryEvent) -> bool {
            super::super::sink::subscribed(&self.events, event)
        }

        fn is_enabled(&self) -> bool {
            self.enabled
        }

        async fn send(&self, _event: &TelemetryEvent) -> Result<()> {
            self.count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingSink;

    #[async_trait::async_trait]
    impl TelemetrySink for FailingSink {
        fn name(&self) -> &str {
            "failing"
        }

        fn handles_event(&self, _event: &TelemetryEvent) -> bool {
            true
        }

        fn is_enabled(&self) -> bool {
            true
        }

        async fn send(&self, _event: &TelemetryEvent) -> Result<()> {
            anyhow::bail!("collector offline")
        }
    }

    fn started() -> TelemetryEvent {
        TelemetryEvent::RunStarted {
            run_id: Uuid::new_v4(),
            workflow_id: "wf".into(),
            total_steps: 2,
        }
    }

    fn webhook(name: &str, enabled: bool, url: &str) -> WebhookConfig {
        WebhookConfig {
            name: Some(name.into()),
            enabled,
            url: url.into(),
            auth_type: None,
            token_env: None,
            username: None,
            password_env: None,
            events: None,
        }
    }

    #[test]
    fn test_from_config_builds_sinks() {
        let config = TelemetryConfig {
            enabled: true,
            log_events: true,
            webhooks: vec![
                webhook("ops", true, "https://hooks.example.com/a"),
                webhook("off", false, "https://hooks.example.com/b"),
                webhook("no-url", true, ""),
            ],
        };
        let service = TelemetryService::from_config(&config);
        assert!(service.is_enabled());
        assert_eq!(service.sink_count(), 2); // log + one enabled webhook
    }

    #[test]
    fn test_disabled_service() {
        let service = TelemetryService::disabled();
        assert!(!service.is_enabled());
        assert_eq!(service.sink_count(), 0);
    }

    #[tokio::test]
    async fn test_notify_dispatches_to_matching_sinks() {
        let all = Arc::new(AtomicUsize::new(0));
        let completed_only = Arc::new(AtomicUsize::new(0));
        let off = Arc::new(AtomicUsize::new(0));

        let service = TelemetryService::with_sinks(vec![
            Arc::new(CountingSink {
                enabled: true,
                events: vec![],
                count: all.clone(),
            }),
            Arc::new(CountingSink {
                enabled: true,
                events: vec!["run.completed".into()],
                count: completed_only.clone(),
            }),
            Arc::new(CountingSink {
                enabled: false,
                events: vec![],
                count: off.clone(),
            }),
            Arc::new(FailingSink),
        ]);

        service.notify(started());
        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;

        assert_eq!(all.load(Ordering::SeqCst), 1);
        assert_eq!(completed_only.load(Ordering::SeqCst), 0);
        assert_eq!(off.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_notify_respects_global_enabled() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut service = TelemetryService::with_sinks(vec![Arc::new(CountingSink {
            enabled: true,
            events: vec![],
            count: count.clone(),
        })]);
        service.enabled = false;

        service.notify(started());
        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_notify_outside_runtime_is_dropped() {
        let service = TelemetryService::from_config(&TelemetryConfig::default());
        service.notify(started());
    }
}

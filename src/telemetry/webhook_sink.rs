//! Webhook telemetry sink.
//!
//! Each event is posted as one flat JSON document keyed by run, so a
//! receiver can index deliveries without knowing every event shape.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder};
use serde::Serialize;
use uuid::Uuid;

use super::sink::{subscribed, TelemetrySink};
use super::TelemetryEvent;
use crate::config::WebhookConfig;

/// How requests to the endpoint are signed
#[derive(Debug, Clone, PartialEq)]
enum Credentials {
    Anonymous,
    Token(String),
    Login { user: String, password: String },
}

impl Credentials {
    fn from_config(config: &WebhookConfig, sink: &str) -> Self {
        match config.auth_type.as_deref() {
            Some("bearer") => Credentials::Token(env_secret(sink, config.token_env.as_deref())),
            Some("basic") => Credentials::Login {
                user: config.username.clone().unwrap_or_default(),
                password: env_secret(sink, config.password_env.as_deref()),
            },
            _ => Credentials::Anonymous,
        }
    }

    fn sign(&self, request: RequestBuilder) -> RequestBuilder {
        match self {
            Credentials::Anonymous => request,
            Credentials::Token(token) => request.bearer_auth(token),
            Credentials::Login { user, password } => request.basic_auth(user, Some(password)),
        }
    }
}

fn env_secret(sink: &str, var: Option<&str>) -> String {
    let Some(var) = var.filter(|v| !v.is_empty()) else {
        return String::new();
    };
    match std::env::var(var) {
        Ok(value) if !value.is_empty() => value,
        _ => {
            tracing::warn!(sink, env_var = var, "Webhook secret is not set");
            String::new()
        }
    }
}

/// Body of one webhook delivery
#[derive(Debug, Serialize)]
struct RunDelivery {
    event: &'static str,
    run_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    progress: Option<u8>,
    sent_at: DateTime<Utc>,
    /// Remaining event fields
    details: serde_json::Value,
}

impl RunDelivery {
    fn new(event: &TelemetryEvent, sent_at: DateTime<Utc>) -> Result<Self> {
        let mut details = match serde_json::to_value(event)? {
            serde_json::Value::Object(mut tagged) => {
                tagged.remove("data").unwrap_or(serde_json::Value::Null)
            }
            other => other,
        };
        if let Some(fields) = details.as_object_mut() {
            for key in ["run_id", "session_id", "progress"] {
                fields.remove(key);
            }
        }

        Ok(Self {
            event: event.event_type(),
            run_id: event.run_id(),
            session_id: event.session_id(),
            progress: event.progress(),
            sent_at,
            details,
        })
    }
}

/// Posts run and session events to an HTTP endpoint
pub struct WebhookSink {
    name: String,
    url: String,
    credentials: Credentials,
    events: Vec<String>,
    enabled: bool,
    client: Client,
}

impl WebhookSink {
    pub fn new(config: &WebhookConfig) -> Self {
        let name = config.name.clone().unwrap_or_else(|| "webhook".to_string());
        Self {
            credentials: Credentials::from_config(config, &name),
            url: config.url.clone(),
            events: config.events.clone().unwrap_or_default(),
            enabled: config.enabled,
            client: Client::new(),
            name,
        }
    }
}

#[async_trait]
impl TelemetrySink for WebhookSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn handles_event(&self, event: &TelemetryEvent) -> bool {
        subscribed(&self.events, event)
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    async fn send(&self, event: &TelemetryEvent) -> Result<()> {
        let delivery = RunDelivery::new(event, Utc::now())?;
        let request = self.credentials.sign(self.client.post(&self.url).json(&delivery));

        let status = request
            .send()
            .await
            .with_context(|| format!("POST {} failed", self.url))?
            .error_for_status()
            .with_context(|| format!("{} rejected {}", self.url, delivery.event))?
            .status();

        tracing::debug!(
            webhook = %self.name,
            event = delivery.event,
            run_id = %delivery.run_id,
            %status,
            "Telemetry webhook delivered"
        );
        Ok(())
    }
}

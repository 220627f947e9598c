//! Best-effort unload flush.
//!
//! A beacon is queued synchronously and delivered in the background. There
//! is no delivery guarantee and no result: the next session reconciles
//! whatever did not make it. Reliable saves go through the checkpointer.

use std::sync::Arc;

use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::store::{CheckpointStore, SessionCheckpoint};
use crate::types::{CheckpointType, SessionData, UiState};

/// Reason recorded for beacons sent when the page goes away
pub const PAGE_UNLOAD: &str = "page_unload";

/// Body of an unload beacon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeaconPayload {
    pub session_id: Uuid,
    pub session_data: SessionData,
    #[serde(default)]
    pub ui_state: UiState,
    #[serde(default)]
    pub reason: Option<String>,
}

impl BeaconPayload {
    /// Turn the beacon into an unload checkpoint expiring `ttl` from now
    pub fn into_checkpoint(self, ttl: chrono::Duration) -> SessionCheckpoint {
        let now = Utc::now();
        SessionCheckpoint {
            session_id: self.session_id,
            session_data: self.session_data,
            ui_state: self.ui_state,
            checkpoint_type: CheckpointType::Unload,
            checkpoint_at: now,
            expires_at: now + ttl,
        }
    }
}

/// Fire-and-forget transport for unload beacons.
///
/// `send_beacon` must not block; it returns whether the beacon was queued.
pub trait BeaconTransport: Send + Sync {
    fn name(&self) -> &str;

    fn send_beacon(&self, payload: BeaconPayload) -> bool;
}

/// Posts beacons to a runner server's `/api/v1/sessions/{id}/beacon`
pub struct HttpBeacon {
    base_url: String,
    client: Client,
}

impl HttpBeacon {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }

    fn endpoint(&self, session_id: Uuid) -> String {
        format!("{}/api/v1/sessions/{}/beacon", self.base_url, session_id)
    }
}

impl BeaconTransport for HttpBeacon {
    fn name(&self) -> &str {
        "http"
    }

    fn send_beacon(&self, payload: BeaconPayload) -> bool {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return false;
        };

        let request = self.client.post(self.endpoint(payload.session_id)).json(&payload);
        let session_id = payload.session_id;
        handle.spawn(async move {
            match request.send().await {
                Ok(response) if response.status().is_success() => {
                    tracing::debug!(session_id = %session_id, "Beacon delivered");
                }
                Ok(response) => {
                    tracing::debug!(
                        session_id = %session_id,
                        status = %response.status(),
                        "Beacon rejected"
                    );
                }
                Err(e) => {
                    tracing::debug!(session_id = %session_id, error = %e, "Beacon lost");
                }
            }
        });
        true
    }
}

/// Writes beacons straight to a local store as unload checkpoints
pub struct StoreBeacon {
    store: Arc<dyn CheckpointStore>,
    ttl: chrono::Duration,
}

impl StoreBeacon {
    pub fn new(store: Arc<dyn CheckpointStore>, ttl: chrono::Duration) -> Self {
        Self { store, ttl }
    }
}

impl BeaconTransport for StoreBeacon {
    fn name(&self) -> &str {
        "store"
    }

    fn send_beacon(&self, payload: BeaconPayload) -> bool {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return false;
        };

        let store = self.store.clone();
        let checkpoint = payload.into_checkpoint(self.ttl);
        handle.spawn(async move {
            if let Err(e) = store.save_session(&checkpoint).await {
                tracing::debug!(
                    session_id = %checkpoint.session_id,
                    error = %e,
                    "Beacon write failed"
                );
            }
        });
        true
    }
}

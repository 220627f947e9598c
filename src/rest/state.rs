//! API state management for the REST server.

use std::sync::Arc;

use crate::config::Config;
use crate::share::ShareProjector;
use crate::store::CheckpointStore;

/// Shared state for the REST API
#[derive(Clone)]
pub struct ApiState {
    /// Checkpoint store the runner writes to
    pub store: Arc<dyn CheckpointStore>,
    /// Application configuration (session TTL, store timeout)
    pub config: Arc<Config>,
    /// Share-link resolution over the same store
    pub shares: ShareProjector,
}

impl ApiState {
    pub fn new(store: Arc<dyn CheckpointStore>, config: Config) -> Self {
        let shares = ShareProjector::new(store.clone(), config.store.timeout());
        Self {
            store,
            config: Arc::new(config),
            shares,
        }
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        self.config.session.ttl()
    }

    pub fn store_timeout(&self) -> std::time::Duration {
        self.config.store.timeout()
    }
}

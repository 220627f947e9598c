//! REST API server lifecycle management.
//!
//! Binds the listener up front so callers learn the real address (port 0
//! picks a free one), then serves in a background task until stopped.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::rest::{build_router, ApiState};

/// Status of the REST API server
#[derive(Debug, Clone, PartialEq)]
pub enum RestApiStatus {
    Running { addr: SocketAddr },
    Stopped,
    Error(String),
}

impl RestApiStatus {
    /// Returns true if the server is running
    pub fn is_running(&self) -> bool {
        matches!(self, RestApiStatus::Running { .. })
    }
}

/// REST API server handle for lifecycle management
pub struct RestApiServer {
    addr: SocketAddr,
    status: Arc<Mutex<RestApiStatus>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task_handle: Option<JoinHandle<()>>,
}

impl RestApiServer {
    /// Bind `addr` and start serving
    pub async fn start(state: ApiState, addr: SocketAddr) -> Result<Self> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind REST API to {}", addr))?;
        let addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let status = Arc::new(Mutex::new(RestApiStatus::Running { addr }));
        let router = build_router(state);

        let task_status = status.clone();
        let handle = tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;

            let mut status = task_status.lock().unwrap_or_else(PoisonError::into_inner);
            *status = match result {
                Ok(()) => RestApiStatus::Stopped,
                Err(e) => {
                    tracing::error!(error = %e, "REST API server failed");
                    RestApiStatus::Error(e.to_string())
                }
            };
        });

        tracing::info!("REST API listening on http://{}", addr);
        Ok(Self {
            addr,
            status,
            shutdown_tx: Some(shutdown_tx),
            task_handle: Some(handle),
        })
    }

    /// Address actually bound
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get current server status
    pub fn status(&self) -> RestApiStatus {
        self.status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Check if server is running
    pub fn is_running(&self) -> bool {
        self.status().is_running()
    }

    /// Stop the server and wait for in-flight requests to finish
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.task_handle.take() {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "REST API task ended abnormally");
            }
        }
        tracing::info!("REST API server stopped");
    }
}

impl Drop for RestApiServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::store::MemoryStore;

    fn state() -> ApiState {
        ApiState::new(Arc::new(MemoryStore::new()), Config::default())
    }

    #[test]
    fn test_rest_api_status_is_running() {
        assert!(!RestApiStatus::Stopped.is_running());
        assert!(RestApiStatus::Running {
            addr: SocketAddr::from(([127, 0, 0, 1], 7018))
        }
        .is_running());
        assert!(!RestApiStatus::Error("test".to_string()).is_running());
    }

    #[tokio::test]
    async fn test_start_on_free_port_then_stop() {
        let server = RestApiServer::start(state(), SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .unwrap();
        assert_ne!(server.addr().port(), 0);
        assert!(server.is_running());

        let status = server.status.clone();
        server.stop().await;
        assert_eq!(*status.lock().unwrap(), RestApiStatus::Stopped);
    }

    #[tokio::test]
    async fn test_bind_conflict_is_an_error() {
        let first = RestApiServer::start(state(), SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .unwrap();
        let second = RestApiServer::start(state(), first.addr()).await;
        assert!(second.is_err());
        first.stop().await;
    }
}

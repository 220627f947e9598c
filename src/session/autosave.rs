//! Autosave scheduler.
//!
//! A background task ticks on a fixed interval and asks the checkpointer to
//! flush when the session is active, the run is running and something is
//! dirty. Ticks are awaited one at a time, so a slow save delays the next
//! tick instead of overlapping it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::checkpoint::Checkpointer;

pub struct AutosaveScheduler {
    interval: Duration,
    shutdown_tx: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl AutosaveScheduler {
    /// Spawn the autosave loop. The first tick fires one interval from now.
    pub fn start(checkpointer: Arc<Checkpointer>, interval: Duration) -> Self {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            tracing::debug!(interval = ?interval, "Autosave scheduler started");

            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => {
                        break;
                    }
                    _ = ticker.tick() => {
                        checkpointer.autosave_tick().await;
                    }
                }
            }

            tracing::debug!("Autosave scheduler stopped");
        });

        Self {
            interval,
            shutdown_tx,
            handle: Some(handle),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the loop and wait for it to exit. A save already in flight
    /// finishes first; no tick fires after this returns.
    pub async fn stop(mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Autosave task ended abnormally");
            }
        }
    }
}

impl Drop for AutosaveScheduler {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

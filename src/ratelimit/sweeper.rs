//! Background sweep of idle rate limit windows.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::limiter::RateLimiter;
use crate::clock::Clock;

/// Handle to a running sweeper task.
///
/// Dropping the handle without calling [`SweeperHandle::shutdown`] aborts the
/// task.
pub struct SweeperHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    /// Stop the sweeper and wait for it to exit.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Spawn a task that sweeps the limiter every `interval`, independent of
/// request traffic.
pub fn spawn_sweeper(
    limiter: Arc<RateLimiter>,
    clock: Arc<dyn Clock>,
    interval: Duration,
) -> SweeperHandle {
    let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; there is nothing to sweep yet.
        ticker.tick().await;

        info!(interval_secs = interval.as_secs(), "Window sweeper started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = limiter.sweep(clock.now_ms());
                    debug!(removed, "Sweeper tick");
                }
                _ = &mut shutdown_rx => {
                    info!("Window sweeper stopped");
                    break;
                }
            }
        }
    });

    SweeperHandle {
        shutdown_tx: Some(shutdown_tx),
        task: Some(task),
    }
}

//! Background sweeper for expired sessions
//!
//! A tokio task ticks at a fixed interval and asks the manager to sweep.
//! The task runs until `SweeperHandle::stop` is called or the handle is
//! dropped.

use crate::manager::SessionManager;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// Handle to a running sweep task
pub struct SweeperHandle {
    stop_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    /// Spawn the sweep loop; the first sweep runs immediately
    pub(crate) fn spawn(manager: Arc<SessionManager>, period: Duration) -> Self {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        // tokio intervals reject a zero period
        let period = period.max(Duration::from_millis(1));

        tracing::info!(interval_secs = period.as_secs_f64(), "Session sweeper started");

        let task = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = manager.run_sweep().await {
                            tracing::warn!(error = %e, "Session sweep failed");
                        }
                    }
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            tracing::info!("Session sweeper stopped");
        });

        Self {
            stop_tx,
            task: Some(task),
        }
    }

    /// Signal the task to stop and wait for it to finish
    ///
    /// A sweep already in progress completes first.
    pub async fn stop(mut self) {
        let _ = self.stop_tx.send(true);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Session sweeper task ended abnormally");
            }
        }
    }

    /// Whether the task has exited
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |t| t.is_finished())
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(true);
    }
}

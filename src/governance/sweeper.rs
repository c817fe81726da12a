//! Cleanup scheduler for the request registry
//!
//! Runs the expiry sweep on a one-shot timer instead of a standing
//! interval: the task sits idle while the registry is empty, arms when
//! the first request lands, and re-arms after each pass only if entries
//! remain. Expired status is assigned nowhere else.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::manager::GovernanceManager;

/// Default time between sweep passes while the registry is occupied
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// Drives periodic expiry sweeps while there is anything to sweep
pub struct CleanupScheduler {
    manager: Arc<GovernanceManager>,
    interval: Duration,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl CleanupScheduler {
    pub fn new(manager: Arc<GovernanceManager>, interval: Duration) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            manager,
            interval,
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// Spawn the scheduler task.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let scheduler = self.clone();
        tokio::spawn(async move {
            scheduler.run().await;
        })
    }

    /// Cancel the pending timer, if any, and stop the task.
    pub fn shutdown(&self) {
        // The scheduler holds its own receiver, so send cannot fail.
        let _ = self.shutdown_tx.send(true);
    }

    async fn run(&self) {
        let mut shutdown = self.shutdown_rx.clone();
        loop {
            if self.manager.is_registry_empty().await {
                // Idle: no timer pending until a request arrives. The
                // occupancy permit may be stale, so re-check emptiness
                // before arming.
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                    _ = self.manager.occupancy_changed() => {}
                }
                continue;
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = tokio::time::sleep(self.interval) => {
                    let report = self.manager.sweep_expired(Utc::now()).await;
                    if report.expired > 0 || report.requeued > 0 || report.pruned > 0 {
                        tracing::info!(
                            expired = report.expired,
                            requeued = report.requeued,
                            pruned = report.pruned,
                            remaining = report.remaining,
                            "Cleanup sweep finished"
                        );
                    }
                }
            }
        }
        tracing::debug!("Cleanup scheduler stopped");
    }
}

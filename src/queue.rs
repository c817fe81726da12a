//! Execution queue for approved catalog updates
//!
//! Bounded in-process FIFO between the governance engine and the catalog
//! updater, plus the worker that drains it. A full queue refuses new work
//! instead of blocking; callers surface that as backpressure.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex, Notify};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::updater::CatalogUpdater;

/// Most recent executions kept for the stats surface.
const HISTORY_CAP: usize = 50;

/// Why an update entered the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateKind {
    /// Approved by admin vote quorum
    Democratic,
    /// The owner's own request, auto-approved at creation
    OwnerRequest,
    /// A pending request resolved by owner approval
    OwnerApproval,
    /// Owner force-update, no request involved
    Forced,
}

impl UpdateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateKind::Democratic => "democratic",
            UpdateKind::OwnerRequest => "owner_request",
            UpdateKind::OwnerApproval => "owner_approval",
            UpdateKind::Forced => "forced",
        }
    }
}

impl std::str::FromStr for UpdateKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "democratic" => Ok(UpdateKind::Democratic),
            "owner_request" => Ok(UpdateKind::OwnerRequest),
            "owner_approval" => Ok(UpdateKind::OwnerApproval),
            "forced" => Ok(UpdateKind::Forced),
            _ => Err(format!("Invalid update kind: {}", s)),
        }
    }
}

/// A unit of approved work awaiting execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedUpdate {
    pub id: Uuid,
    /// Registry id of the originating request; absent for forced updates
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub requested_by: Uuid,
    pub requester_name: String,
    pub kind: UpdateKind,
    /// Set when the owner created or resolved this work
    pub owner_initiated: bool,
    /// Set when the work never went through a vote
    pub bypass_democratic: bool,
    pub enqueued_at: DateTime<Utc>,
}

impl QueuedUpdate {
    pub fn new(
        request_id: Option<String>,
        requested_by: Uuid,
        requester_name: impl Into<String>,
        kind: UpdateKind,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            request_id,
            requested_by,
            requester_name: requester_name.into(),
            kind,
            owner_initiated: kind != UpdateKind::Democratic,
            bypass_democratic: matches!(kind, UpdateKind::OwnerRequest | UpdateKind::Forced),
            enqueued_at: Utc::now(),
        }
    }
}

/// Queue health and counters
#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    pub depth: usize,
    pub capacity: usize,
    pub total_enqueued: u64,
    pub total_rejected: u64,
    pub total_cleared: u64,
    pub is_healthy: bool,
}

#[derive(Default)]
struct QueueState {
    items: VecDeque<QueuedUpdate>,
    total_enqueued: u64,
    total_rejected: u64,
    total_cleared: u64,
}

/// Bounded FIFO of approved updates
pub struct UpdateQueue {
    state: Mutex<QueueState>,
    capacity: usize,
    work_ready: Notify,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl UpdateQueue {
    pub fn new(capacity: usize) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            state: Mutex::new(QueueState::default()),
            capacity,
            work_ready: Notify::new(),
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// Add work. Returns false when the queue is at capacity.
    pub async fn enqueue(&self, item: QueuedUpdate) -> bool {
        let accepted = {
            let mut state = self.state.lock().await;
            if state.items.len() >= self.capacity {
                state.total_rejected += 1;
                false
            } else {
                tracing::debug!(item_id = %item.id, kind = item.kind.as_str(), "Enqueued update");
                state.items.push_back(item);
                state.total_enqueued += 1;
                true
            }
        };
        if accepted {
            self.work_ready.notify_one();
        }
        accepted
    }

    pub async fn dequeue(&self) -> Option<QueuedUpdate> {
        self.state.lock().await.items.pop_front()
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.items.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn is_healthy(&self) -> bool {
        self.state.lock().await.items.len() < self.capacity
    }

    pub async fn stats(&self) -> QueueStats {
        let state = self.state.lock().await;
        QueueStats {
            depth: state.items.len(),
            capacity: self.capacity,
            total_enqueued: state.total_enqueued,
            total_rejected: state.total_rejected,
            total_cleared: state.total_cleared,
            is_healthy: state.items.len() < self.capacity,
        }
    }

    /// Copy of the queued items, oldest first.
    pub async fn snapshot(&self) -> Vec<QueuedUpdate> {
        self.state.lock().await.items.iter().cloned().collect()
    }

    /// Nudge the worker to drain without waiting for the next poll.
    pub fn force_process(&self) {
        self.work_ready.notify_one();
    }

    /// Drop all queued work. Returns how many items were removed.
    pub async fn clear(&self) -> usize {
        let mut state = self.state.lock().await;
        let removed = state.items.len();
        state.items.clear();
        state.total_cleared += removed as u64;
        if removed > 0 {
            tracing::info!(removed, "Cleared execution queue");
        }
        removed
    }

    /// Signal the worker to stop after its current item.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    /// Resolves when new work arrives or a force-process nudge fires.
    pub async fn work_ready(&self) {
        self.work_ready.notified().await;
    }
}

/// One line of execution history
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionRecord {
    pub item_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub kind: UpdateKind,
    pub requested_by: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Execution counters for the stats surface
#[derive(Debug, Clone, Serialize)]
pub struct ProcessorStats {
    pub total_executed: u64,
    pub total_failed: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_finished_at: Option<DateTime<Utc>>,
    pub history_len: usize,
}

#[derive(Default)]
struct ProcessorState {
    total_executed: u64,
    total_failed: u64,
    history: VecDeque<ExecutionRecord>,
}

/// Worker that drains the queue into the catalog updater
pub struct ExecutionProcessor {
    queue: Arc<UpdateQueue>,
    updater: Arc<CatalogUpdater>,
    state: Mutex<ProcessorState>,
    poll_interval: Duration,
}

impl ExecutionProcessor {
    pub fn new(
        queue: Arc<UpdateQueue>,
        updater: Arc<CatalogUpdater>,
        poll_interval: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            queue,
            updater,
            state: Mutex::new(ProcessorState::default()),
            poll_interval,
        })
    }

    /// Spawn the drain loop. It runs until the queue signals shutdown.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.run().await })
    }

    async fn run(&self) {
        let mut shutdown = self.queue.shutdown_signal();
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tracing::info!(
            interval_secs = self.poll_interval.as_secs_f64(),
            "Execution processor started"
        );

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => self.drain().await,
                _ = self.queue.work_ready() => self.drain().await,
            }
        }

        tracing::info!("Execution processor stopped");
    }

    async fn drain(&self) {
        while let Some(item) = self.queue.dequeue().await {
            self.execute(item).await;
        }
    }

    async fn execute(&self, item: QueuedUpdate) {
        let started_at = Utc::now();
        let result = self.updater.run_update(&item).await;
        let finished_at = Utc::now();

        let error = match &result {
            Ok(report) => {
                tracing::info!(
                    item_id = %item.id,
                    kind = item.kind.as_str(),
                    processed = report.processed,
                    "Catalog update completed"
                );
                None
            }
            Err(e) => {
                tracing::warn!(item_id = %item.id, error = %e, "Catalog update failed");
                Some(e.to_string())
            }
        };

        let mut state = self.state.lock().await;
        if error.is_none() {
            state.total_executed += 1;
        } else {
            state.total_failed += 1;
        }
        state.history.push_back(ExecutionRecord {
            item_id: item.id,
            request_id: item.request_id,
            kind: item.kind,
            requested_by: item.requested_by,
            started_at,
            finished_at,
            success: error.is_none(),
            error,
        });
        while state.history.len() > HISTORY_CAP {
            state.history.pop_front();
        }
    }

    pub async fn stats(&self) -> ProcessorStats {
        let state = self.state.lock().await;
        ProcessorStats {
            total_executed: state.total_executed,
            total_failed: state.total_failed,
            last_finished_at: state.history.back().map(|r| r.finished_at),
            history_len: state.history.len(),
        }
    }

    /// Most recent executions, newest last.
    pub async fn execution_history(&self, limit: usize) -> Vec<ExecutionRecord> {
        let state = self.state.lock().await;
        let skip = state.history.len().saturating_sub(limit);
        state.history.iter().skip(skip).cloned().collect()
    }
}

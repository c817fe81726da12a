//! Catalog updater - HTTP client for the catalog-data service
//!
//! Executes approved update jobs against the internal catalog-data service
//! and tracks daily-job status (running flag, last completion, run totals).

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::queue::QueuedUpdate;

/// Aggregate outcome counters across update runs
#[derive(Debug, Clone, Default, Serialize)]
pub struct UpdateRunStats {
    pub total_runs: u64,
    pub total_failures: u64,
    pub products_processed: u64,
    pub products_accepted: u64,
    pub products_denied: u64,
}

/// Daily-job status snapshot
#[derive(Debug, Clone, Serialize)]
pub struct DailyUpdateStatus {
    pub is_updating: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_update_time: Option<DateTime<Utc>>,
    pub stats: UpdateRunStats,
}

/// Result payload reported by the catalog-data service
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateReport {
    pub processed: u64,
    pub accepted: u64,
    pub denied: u64,
}

#[derive(Debug, Serialize)]
struct RunUpdateBody<'a> {
    trigger: &'a str,
    requested_by: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_id: Option<&'a str>,
}

#[derive(Default)]
struct UpdaterState {
    is_updating: bool,
    last_update_time: Option<DateTime<Utc>>,
    stats: UpdateRunStats,
}

/// Client for the catalog-data service's update job
pub struct CatalogUpdater {
    client: Client,
    base_url: String,
    state: RwLock<UpdaterState>,
}

impl CatalogUpdater {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            state: RwLock::new(UpdaterState::default()),
        }
    }

    /// Run one approved update job. At most one runs at a time; a second
    /// caller gets a conflict instead of a second job.
    pub async fn run_update(&self, item: &QueuedUpdate) -> Result<UpdateReport> {
        {
            let mut state = self.state.write().await;
            if state.is_updating {
                return Err(AppError::Conflict(
                    "Catalog update is already running".to_string(),
                ));
            }
            state.is_updating = true;
        }

        let result = self.execute(item).await;

        let mut state = self.state.write().await;
        state.is_updating = false;
        match &result {
            Ok(report) => {
                state.last_update_time = Some(Utc::now());
                state.stats.total_runs += 1;
                state.stats.products_processed += report.processed;
                state.stats.products_accepted += report.accepted;
                state.stats.products_denied += report.denied;
            }
            Err(_) => {
                state.stats.total_failures += 1;
            }
        }
        result
    }

    async fn execute(&self, item: &QueuedUpdate) -> Result<UpdateReport> {
        let body = RunUpdateBody {
            trigger: item.kind.as_str(),
            requested_by: item.requested_by,
            request_id: item.request_id.as_deref(),
        };

        let response = self
            .client
            .post(format!("{}/internal/daily-update", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Upstream(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream(format!(
                "Update job failed: {} - {}",
                status, text
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Upstream(e.to_string()))
    }

    /// Daily-job status for cooldown checks and the stats surface.
    pub async fn status(&self) -> DailyUpdateStatus {
        let state = self.state.read().await;
        DailyUpdateStatus {
            is_updating: state.is_updating,
            last_update_time: state.last_update_time,
            stats: state.stats.clone(),
        }
    }

    pub async fn is_updating(&self) -> bool {
        self.state.read().await.is_updating
    }

    pub async fn last_update_time(&self) -> Option<DateTime<Utc>> {
        self.state.read().await.last_update_time
    }

    /// Record an update completed outside this process, such as the
    /// scheduled overnight job. Cooldown windows count from it.
    pub async fn mark_updated_at(&self, at: DateTime<Utc>) {
        self.state.write().await.last_update_time = Some(at);
    }

    #[cfg(test)]
    pub(crate) async fn set_updating(&self, updating: bool) {
        self.state.write().await.is_updating = updating;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::UpdateKind;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn forced_item() -> QueuedUpdate {
        QueuedUpdate::new(None, Uuid::new_v4(), "Owner", UpdateKind::Forced)
    }

    #[tokio::test]
    async fn test_run_update_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/internal/daily-update"))
            .and(body_partial_json(serde_json::json!({ "trigger": "forced" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "processed": 120,
                "accepted": 100,
                "denied": 20
            })))
            .mount(&server)
            .await;

        let updater = CatalogUpdater::new(server.uri());
        let report = updater.run_update(&forced_item()).await.unwrap();
        assert_eq!(report.processed, 120);
        assert_eq!(report.accepted, 100);
        assert_eq!(report.denied, 20);

        let status = updater.status().await;
        assert!(!status.is_updating);
        assert!(status.last_update_time.is_some());
        assert_eq!(status.stats.total_runs, 1);
        assert_eq!(status.stats.products_processed, 120);
    }

    #[tokio::test]
    async fn test_run_update_failure_counts_but_keeps_last_update() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/internal/daily-update"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let updater = CatalogUpdater::new(server.uri());
        let err = updater.run_update(&forced_item()).await.unwrap_err();
        assert!(matches!(err, AppError::Upstream(_)));

        let status = updater.status().await;
        assert!(!status.is_updating);
        assert!(status.last_update_time.is_none());
        assert_eq!(status.stats.total_failures, 1);
        assert_eq!(status.stats.total_runs, 0);
    }

    #[tokio::test]
    async fn test_concurrent_run_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/internal/daily-update"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({
                        "processed": 1,
                        "accepted": 1,
                        "denied": 0
                    }))
                    .set_delay(Duration::from_millis(200)),
            )
            .mount(&server)
            .await;

        let updater = std::sync::Arc::new(CatalogUpdater::new(server.uri()));
        let first = {
            let updater = updater.clone();
            tokio::spawn(async move { updater.run_update(&forced_item()).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let second = updater.run_update(&forced_item()).await;
        assert!(matches!(second, Err(AppError::Conflict(_))));

        assert!(first.await.unwrap().is_ok());
        assert!(!updater.is_updating().await);
    }

    #[tokio::test]
    async fn test_mark_updated_at() {
        let updater = CatalogUpdater::new("http://unused.invalid");
        assert!(updater.last_update_time().await.is_none());

        let at = Utc::now();
        updater.mark_updated_at(at).await;
        assert_eq!(updater.last_update_time().await, Some(at));
    }
}

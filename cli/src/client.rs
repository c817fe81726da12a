//! HTTP client for the ClearLabel governance server

use anyhow::{anyhow, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::messages::{
    Ballot, ErrorBody, ForceUpdateResponse, Identity, OwnerActionResponse,
    PendingRequestsResponse, ProcessorStatsResponse, QueueActionResponse, QueueStatusResponse,
    RequestUpdateResponse, SecurityStatsView, VoteStatusView, VoteUpdateResponse,
};

/// HTTP client bound to one admin identity
pub struct ClearLabelClient {
    http: reqwest::Client,
    base_url: String,
    admin_id: Uuid,
    admin_name: String,
}

impl ClearLabelClient {
    pub fn new(base_url: &str, admin_id: Uuid, admin_name: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            admin_id,
            admin_name: admin_name.to_string(),
        }
    }

    pub fn admin_id(&self) -> Uuid {
        self.admin_id
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn identity(&self) -> Identity {
        Identity {
            admin_id: self.admin_id,
            admin_name: self.admin_name.clone(),
        }
    }

    /// Decode a response, turning server error bodies into readable failures.
    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }
        let body: ErrorBody = response.json().await.unwrap_or_else(|_| ErrorBody {
            error: format!("request failed with status {}", status),
            remaining_minutes: None,
        });
        match body.remaining_minutes {
            Some(minutes) => Err(anyhow!("{} (retry in ~{} minutes)", body.error, minutes)),
            None => Err(anyhow!("{}", body.error)),
        }
    }

    /// GET with the caller's id in the `x-admin-id` header
    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        tracing::debug!("GET {}", path);
        let response = self
            .http
            .get(self.url(path))
            .header("x-admin-id", self.admin_id.to_string())
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        tracing::debug!("POST {}", path);
        let response = self.http.post(self.url(path)).json(body).send().await?;
        Self::decode(response).await
    }

    /// POST with no body, identity in the `x-admin-id` header
    async fn post_empty<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        tracing::debug!("POST {}", path);
        let response = self
            .http
            .post(self.url(path))
            .header("x-admin-id", self.admin_id.to_string())
            .send()
            .await?;
        Self::decode(response).await
    }

    /// File a catalog update request
    pub async fn request_update(&self) -> Result<RequestUpdateResponse> {
        self.post("/request-update", &self.identity()).await
    }

    /// Cast a vote on a pending request
    pub async fn cast_vote(&self, request_id: &str, vote: &str) -> Result<VoteUpdateResponse> {
        let body = Ballot {
            admin_id: self.admin_id,
            admin_name: self.admin_name.clone(),
            vote: vote.to_string(),
        };
        self.post(&format!("/vote-update/{}", request_id), &body)
            .await
    }

    /// List pending requests; the listing needs no identity
    pub async fn pending_requests(&self) -> Result<PendingRequestsResponse> {
        tracing::debug!("GET /pending-requests");
        let response = self.http.get(self.url("/pending-requests")).send().await?;
        Self::decode(response).await
    }

    /// Look up one admin's ballot on a request
    pub async fn vote_status(&self, request_id: &str, admin_id: Uuid) -> Result<VoteStatusView> {
        self.get(&format!("/vote-status/{}/{}", request_id, admin_id))
            .await
    }

    /// Veto a pending request (owner only)
    pub async fn veto(&self, request_id: &str) -> Result<OwnerActionResponse> {
        self.post(
            &format!("/owner/veto-request/{}", request_id),
            &self.identity(),
        )
        .await
    }

    /// Approve a pending request directly (owner only)
    pub async fn approve(&self, request_id: &str) -> Result<OwnerActionResponse> {
        self.post(
            &format!("/owner/approve-request/{}", request_id),
            &self.identity(),
        )
        .await
    }

    /// Queue an update without a request (owner only)
    pub async fn force_update(&self) -> Result<ForceUpdateResponse> {
        self.post("/owner/force-update", &self.identity()).await
    }

    /// Governance counters and the admin roster
    pub async fn security_stats(&self) -> Result<SecurityStatsView> {
        self.get("/security-stats").await
    }

    /// Queue depth and contents
    pub async fn queue_status(&self) -> Result<QueueStatusResponse> {
        self.get("/queue-status").await
    }

    /// Processor history and daily-update state
    pub async fn processor_stats(&self) -> Result<ProcessorStatsResponse> {
        self.get("/processor-stats").await
    }

    /// Nudge the processor to drain the queue now (owner only)
    pub async fn force_queue_process(&self) -> Result<QueueActionResponse> {
        self.post_empty("/force-queue-process").await
    }

    /// Drop all queued updates (owner only)
    pub async fn clear_queue(&self) -> Result<QueueActionResponse> {
        self.post_empty("/clear-queue").await
    }
}

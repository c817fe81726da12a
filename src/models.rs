//! Request and response bodies for the governance API

use serde::{Deserialize, Serialize};

use crate::governance::manager::{PendingRequestView, VoteTally};
use crate::governance::request::{RequestStatus, UpdateRequest};
use crate::queue::{ExecutionRecord, ProcessorStats, QueueStats, QueuedUpdate};
use crate::updater::DailyUpdateStatus;

/// Caller identity for the mutating endpoints.
///
/// Fields are optional so a missing one maps to a validation error
/// rather than a body-rejection.
#[derive(Debug, Deserialize)]
pub struct IdentityBody {
    pub admin_id: Option<String>,
    pub admin_name: Option<String>,
}

/// Body for casting a vote
#[derive(Debug, Deserialize)]
pub struct VoteBody {
    pub admin_id: Option<String>,
    pub admin_name: Option<String>,
    /// "approve" or "reject"
    pub vote: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RequestUpdateResponse {
    pub message: String,
    pub request: UpdateRequest,
    pub auto_approved: bool,
    pub queued: bool,
}

#[derive(Debug, Serialize)]
pub struct VoteUpdateResponse {
    pub message: String,
    pub request_id: String,
    pub status: RequestStatus,
    pub tally: VoteTally,
    pub queued: bool,
}

#[derive(Debug, Serialize)]
pub struct PendingRequestsResponse {
    pub requests: Vec<PendingRequestView>,
    pub count: usize,
}

/// Response for owner veto and owner approval
#[derive(Debug, Serialize)]
pub struct OwnerActionResponse {
    pub message: String,
    pub request: UpdateRequest,
}

#[derive(Debug, Serialize)]
pub struct ForceUpdateResponse {
    pub message: String,
    pub item: QueuedUpdate,
}

#[derive(Debug, Serialize)]
pub struct QueueStatusResponse {
    pub stats: QueueStats,
    pub queue: Vec<QueuedUpdate>,
}

#[derive(Debug, Serialize)]
pub struct ProcessorStatsResponse {
    pub stats: ProcessorStats,
    pub recent: Vec<ExecutionRecord>,
    pub update: DailyUpdateStatus,
}

/// Response for the owner queue controls
#[derive(Debug, Serialize)]
pub struct QueueActionResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cleared: Option<usize>,
}

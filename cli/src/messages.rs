//! API types for the ClearLabel governance server
//!
//! These types mirror the server's HTTP bodies. Some fields may not be
//! used directly by the CLI but are part of the complete API surface.

#![allow(dead_code)]

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of an update request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
    Expired,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
            RequestStatus::Expired => "expired",
        }
    }
}

/// Direction of a single admin's vote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteChoice {
    Approve,
    Reject,
}

/// Privileged platform role attached to a user id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Owner,
}

/// What kind of work a queue entry represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateKind {
    Democratic,
    OwnerRequest,
    OwnerApproval,
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

/// A recorded ballot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vote {
    pub choice: VoteChoice,
    pub admin_name: String,
    pub voted_at: DateTime<Utc>,
}

/// An update request as the server reports it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateRequest {
    pub id: String,
    pub requester_id: Uuid,
    pub requester_name: String,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub votes: HashMap<Uuid, Vote>,
    pub owner_approved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_approved_by: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_approved_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_vetoed_by: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_vetoed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
}

/// Vote counts against the thresholds in force when they were computed
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VoteTally {
    pub approve_votes: usize,
    pub reject_votes: usize,
    pub total_admins: usize,
    pub required_approve: usize,
    pub required_reject: usize,
}

/// One pending request in the public listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingRequestView {
    pub id: String,
    pub requester_id: Uuid,
    pub requester_name: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub expires_in_seconds: i64,
    pub votes: HashMap<Uuid, Vote>,
    pub tally: VoteTally,
}

/// One admin's ballot on one request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteStatusView {
    pub request_id: String,
    pub status: RequestStatus,
    pub has_voted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vote: Option<VoteChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voted_at: Option<DateTime<Utc>>,
    pub approve_votes: usize,
    pub reject_votes: usize,
}

/// A user holding a privileged role
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminProfile {
    pub user_id: Uuid,
    pub display_name: String,
    pub role: Role,
    pub granted_at: DateTime<Utc>,
}

/// Per-admin rate-limit counters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminRequestStats {
    pub admin_id: Uuid,
    pub requests_today: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_request_time: Option<i64>,
    pub has_active_request: bool,
}

/// Snapshot of governance counters and the admin roster
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityStatsView {
    pub total_requests_today: u32,
    pub democratic_update_used_today: bool,
    pub pending_requests: usize,
    pub total_admins: usize,
    pub admin_roster: Vec<AdminProfile>,
    pub request_stats: Vec<AdminRequestStats>,
}

/// An approved update waiting for execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedUpdate {
    pub id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub requested_by: Uuid,
    pub requester_name: String,
    pub kind: UpdateKind,
    pub owner_initiated: bool,
    pub bypass_democratic: bool,
    pub enqueued_at: DateTime<Utc>,
}

/// Queue occupancy and lifetime counters
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct QueueStats {
    pub depth: usize,
    pub capacity: usize,
    pub total_enqueued: u64,
    pub total_rejected: u64,
    pub total_cleared: u64,
    pub is_healthy: bool,
}

/// Outcome of a single executed queue entry
#[derive(Debug, Clone, Serialize, Deserialize)]
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

/// Processor lifetime counters
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ProcessorStats {
    pub total_executed: u64,
    pub total_failed: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_finished_at: Option<DateTime<Utc>>,
    pub history_len: usize,
}

/// Catalog-run counters reported by the updater
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct UpdateRunStats {
    pub total_runs: u64,
    pub total_failures: u64,
    pub products_processed: u64,
    pub products_accepted: u64,
    pub products_denied: u64,
}

/// Daily-update state used for the owner cooldown
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyUpdateStatus {
    pub is_updating: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_update_time: Option<DateTime<Utc>>,
    pub stats: UpdateRunStats,
}

/// Caller identity sent with mutating requests
#[derive(Debug, Serialize)]
pub struct Identity {
    pub admin_id: Uuid,
    pub admin_name: String,
}

/// Body for casting a vote
#[derive(Debug, Serialize)]
pub struct Ballot {
    pub admin_id: Uuid,
    pub admin_name: String,
    pub vote: String,
}

/// Error body returned by the server on non-2xx responses
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default)]
    pub remaining_minutes: Option<i64>,
}

/// Response to filing an update request
#[derive(Debug, Clone, Deserialize)]
pub struct RequestUpdateResponse {
    pub message: String,
    pub request: UpdateRequest,
    pub auto_approved: bool,
    pub queued: bool,
}

/// Response to casting a vote
#[derive(Debug, Clone, Deserialize)]
pub struct VoteUpdateResponse {
    pub message: String,
    pub request_id: String,
    pub status: RequestStatus,
    pub tally: VoteTally,
    pub queued: bool,
}

/// The public pending-request listing
#[derive(Debug, Clone, Deserialize)]
pub struct PendingRequestsResponse {
    pub requests: Vec<PendingRequestView>,
    pub count: usize,
}

/// Response to an owner veto or approval
#[derive(Debug, Clone, Deserialize)]
pub struct OwnerActionResponse {
    pub message: String,
    pub request: UpdateRequest,
}

/// Response to an owner force-update
#[derive(Debug, Clone, Deserialize)]
pub struct ForceUpdateResponse {
    pub message: String,
    pub item: QueuedUpdate,
}

/// Queue stats plus its current contents
#[derive(Debug, Clone, Deserialize)]
pub struct QueueStatusResponse {
    pub stats: QueueStats,
    pub queue: Vec<QueuedUpdate>,
}

/// Processor stats, recent executions, and updater state
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessorStatsResponse {
    pub stats: ProcessorStats,
    pub recent: Vec<ExecutionRecord>,
    pub update: DailyUpdateStatus,
}

/// Response to the owner queue controls
#[derive(Debug, Clone, Deserialize)]
pub struct QueueActionResponse {
    pub message: String,
    #[serde(default)]
    pub cleared: Option<usize>,
}

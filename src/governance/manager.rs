//! Governance manager for catalog update requests
//!
//! The manager owns:
//! - The request registry and its lifecycle transitions
//! - Quorum voting with live admin-count thresholds
//! - Owner override paths (veto, approve, force-update)
//! - Cooldown and scheduled-window restrictions
//! - The expiry sweep and queue-retry pass
//! - Event broadcasting
//!
//! The registry lock is the single serialization point: every mutation
//! re-checks the entry's status under the write lock before committing,
//! and resolution paths keep holding it across the (in-process, bounded)
//! enqueue so a sweep retry can never double-queue a request.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Timelike, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, Notify, RwLock};
use uuid::Uuid;

use super::authority::{AdminProfile, AuthorityGate};
use super::policy::{AdminRequestStats, SecurityPolicy};
use super::request::{RequestStatus, UpdateRequest, Vote, VoteChoice};
use crate::queue::{QueuedUpdate, UpdateKind, UpdateQueue};
use crate::updater::CatalogUpdater;

/// Share of admins that must approve before a request passes.
const APPROVE_RATIO: f64 = 0.75;
/// Share of admins that must reject before a request fails.
const REJECT_RATIO: f64 = 0.26;

fn required_approvals(total_admins: usize) -> usize {
    ((total_admins as f64) * APPROVE_RATIO).ceil() as usize
}

fn required_rejections(total_admins: usize) -> usize {
    ((total_admins as f64) * REJECT_RATIO).ceil() as usize
}

/// Timing knobs for the governance engine
#[derive(Debug, Clone)]
pub struct GovernanceConfig {
    /// Validity window of a pending request, in minutes
    pub ttl_minutes: i64,
    /// Minimum gap after a completed update before owner actions, in hours
    pub cooldown_hours: i64,
    /// Hour of day (UTC) the automatic catalog update runs
    pub scheduled_update_hour: u32,
    /// Owner actions are blocked within this many hours of the scheduled run
    pub buffer_hours: u32,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            ttl_minutes: 10,
            cooldown_hours: 2,
            scheduled_update_hour: 3,
            buffer_hours: 1,
        }
    }
}

/// Events emitted by the governance manager
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GovernanceEvent {
    /// An update request entered the registry
    RequestCreated {
        request_id: String,
        requester_id: Uuid,
        requester_name: String,
    },
    /// An owner's request skipped voting entirely
    RequestAutoApproved {
        request_id: String,
        owner_id: Uuid,
    },
    /// A vote was recorded
    VoteRecorded {
        request_id: String,
        admin_id: Uuid,
        choice: VoteChoice,
        approve_votes: usize,
        reject_votes: usize,
    },
    /// A request reached the approval quorum
    RequestApproved {
        request_id: String,
        queued: bool,
    },
    /// A request reached the rejection quorum
    RequestRejected {
        request_id: String,
        reason: String,
    },
    /// The owner vetoed a request
    RequestVetoed {
        request_id: String,
        owner_id: Uuid,
    },
    /// A pending request timed out
    RequestExpired {
        request_id: String,
    },
    /// The owner queued an update without a request
    ForceUpdateQueued {
        owner_id: Uuid,
    },
    /// A stalled approved request finally made it into the queue
    QueueRetrySucceeded {
        request_id: String,
    },
}

/// Error types for governance operations
#[derive(Debug, Clone)]
pub enum GovernanceError {
    /// Identity string is not a well-formed admin id
    InvalidIdentity(String),
    /// Caller holds neither the admin nor the owner role
    NotAuthorized,
    /// Caller is not the owner
    OwnerRequired,
    /// No such request in the registry
    NotFound(String),
    /// The request has already been resolved or expired
    NotPending { status: RequestStatus },
    /// The requester already has a pending request
    DuplicatePending { request_id: String },
    /// The admin already voted on this request
    DuplicateVote {
        choice: VoteChoice,
        voted_at: DateTime<Utc>,
    },
    /// Per-admin daily request limit reached
    DailyCapReached,
    /// An earlier request from this admin is still active
    OverlappingRequest,
    /// Today's democratic update has already been used
    DemocraticCapUsed,
    /// Too soon after the last completed update
    CooldownActive { remaining_minutes: i64 },
    /// Too close to the scheduled update hour
    ScheduledBufferActive,
    /// The catalog update job is currently running
    UpdateInProgress,
    /// The execution queue refused the work
    QueueFull,
}

impl std::fmt::Display for GovernanceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GovernanceError::InvalidIdentity(id) => {
                write!(f, "Invalid admin identity: {}", id)
            }
            GovernanceError::NotAuthorized => {
                write!(f, "Admin or owner role required")
            }
            GovernanceError::OwnerRequired => {
                write!(f, "Owner role required")
            }
            GovernanceError::NotFound(id) => {
                write!(f, "Update request not found: {}", id)
            }
            GovernanceError::NotPending { status } => {
                write!(f, "Request is no longer pending (status: {})", status.as_str())
            }
            GovernanceError::DuplicatePending { request_id } => {
                write!(f, "A pending update request already exists: {}", request_id)
            }
            GovernanceError::DuplicateVote { choice, voted_at } => {
                write!(
                    f,
                    "Admin already voted {} on this request at {}",
                    choice.as_str(),
                    voted_at.to_rfc3339()
                )
            }
            GovernanceError::DailyCapReached => {
                write!(f, "Daily update request limit reached")
            }
            GovernanceError::OverlappingRequest => {
                write!(f, "An earlier update request is still active")
            }
            GovernanceError::DemocraticCapUsed => {
                write!(f, "The democratic update for today has already been used")
            }
            GovernanceError::CooldownActive { remaining_minutes } => {
                write!(
                    f,
                    "Update cooldown active; try again in {} minutes",
                    remaining_minutes
                )
            }
            GovernanceError::ScheduledBufferActive => {
                write!(f, "Too close to the scheduled update window")
            }
            GovernanceError::UpdateInProgress => {
                write!(f, "Catalog update is already running")
            }
            GovernanceError::QueueFull => {
                write!(f, "Execution queue is full")
            }
        }
    }
}

impl std::error::Error for GovernanceError {}

/// Result type for governance operations
pub type GovernanceResult<T> = Result<T, GovernanceError>;

/// Outcome of creating an update request
#[derive(Debug, Clone, Serialize)]
pub struct RequestOutcome {
    pub request: UpdateRequest,
    /// Owner requests skip voting and are approved on creation
    pub auto_approved: bool,
    /// Whether the work reached the execution queue
    pub queued: bool,
}

/// Quorum arithmetic at the moment of a vote
#[derive(Debug, Clone, Serialize)]
pub struct VoteTally {
    pub approve_votes: usize,
    pub reject_votes: usize,
    pub total_admins: usize,
    pub required_approve: usize,
    pub required_reject: usize,
}

impl VoteTally {
    fn new(request: &UpdateRequest, total_admins: usize) -> Self {
        Self {
            approve_votes: request.approve_votes(),
            reject_votes: request.reject_votes(),
            total_admins,
            required_approve: required_approvals(total_admins),
            required_reject: required_rejections(total_admins),
        }
    }
}

/// Outcome of casting a vote
#[derive(Debug, Clone, Serialize)]
pub struct VoteOutcome {
    pub request_id: String,
    /// Status after this vote was applied
    pub status: RequestStatus,
    pub tally: VoteTally,
    /// Set when this vote approved the request and it reached the queue
    pub queued: bool,
}

/// A pending request as shown on the voting surface
#[derive(Debug, Clone, Serialize)]
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

/// An admin's standing on one request
#[derive(Debug, Clone, Serialize)]
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

/// What one sweep pass did
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    /// Pending requests that timed out and were removed
    pub expired: usize,
    /// Stalled approved requests that finally reached the queue
    pub requeued: usize,
    /// Rejected entries dropped after their audit-visibility window
    pub pruned: usize,
    /// Registry size after the sweep
    pub remaining: usize,
}

/// Security and governance counters for the stats surface
#[derive(Debug, Clone, Serialize)]
pub struct SecurityStatsView {
    pub total_requests_today: u32,
    pub democratic_update_used_today: bool,
    pub pending_requests: usize,
    pub total_admins: usize,
    pub admin_roster: Vec<AdminProfile>,
    pub request_stats: Vec<AdminRequestStats>,
}

/// Tracks whether today's democratic update has been spent
struct DemocraticDay {
    used: bool,
    day: NaiveDate,
}

/// Manager for the update-request governance lifecycle
pub struct GovernanceManager {
    /// Update requests by id
    registry: RwLock<HashMap<String, UpdateRequest>>,
    /// One democratic update per UTC day
    democratic: RwLock<DemocraticDay>,
    gate: AuthorityGate,
    policy: Arc<dyn SecurityPolicy>,
    queue: Arc<UpdateQueue>,
    updater: Arc<CatalogUpdater>,
    config: GovernanceConfig,
    /// Event broadcaster
    event_tx: broadcast::Sender<GovernanceEvent>,
    /// Pinged when the registry goes from empty to non-empty
    occupancy: Notify,
}

impl GovernanceManager {
    pub fn new(
        gate: AuthorityGate,
        policy: Arc<dyn SecurityPolicy>,
        queue: Arc<UpdateQueue>,
        updater: Arc<CatalogUpdater>,
        config: GovernanceConfig,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            registry: RwLock::new(HashMap::new()),
            democratic: RwLock::new(DemocraticDay {
                used: false,
                day: Utc::now().date_naive(),
            }),
            gate,
            policy,
            queue,
            updater,
            config,
            event_tx,
            occupancy: Notify::new(),
        }
    }

    /// Subscribe to governance events
    pub fn subscribe(&self) -> broadcast::Receiver<GovernanceEvent> {
        self.event_tx.subscribe()
    }

    pub fn gate(&self) -> &AuthorityGate {
        &self.gate
    }

    pub fn policy(&self) -> &Arc<dyn SecurityPolicy> {
        &self.policy
    }

    pub fn config(&self) -> &GovernanceConfig {
        &self.config
    }

    /// Resolves when the registry transitions from empty to non-empty.
    pub async fn occupancy_changed(&self) {
        self.occupancy.notified().await;
    }

    pub async fn registry_len(&self) -> usize {
        self.registry.read().await.len()
    }

    pub async fn is_registry_empty(&self) -> bool {
        self.registry.read().await.is_empty()
    }

    /// Fetch a request snapshot by id
    pub async fn get_request(&self, id: &str) -> Option<UpdateRequest> {
        self.registry.read().await.get(id).cloned()
    }

    /// Validate and parse a caller-supplied admin identity.
    fn parse_identity(&self, raw: &str) -> GovernanceResult<Uuid> {
        if !self.policy.validate_admin_id(raw) {
            return Err(GovernanceError::InvalidIdentity(raw.to_string()));
        }
        Uuid::parse_str(raw).map_err(|_| GovernanceError::InvalidIdentity(raw.to_string()))
    }

    /// File an update request. Owners are approved and queued on the spot;
    /// admins enter the voting lane, subject to the daily caps.
    pub async fn request_update(
        &self,
        admin_id: &str,
        admin_name: &str,
        now: DateTime<Utc>,
    ) -> GovernanceResult<RequestOutcome> {
        let admin_id = self.parse_identity(admin_id)?;
        if !self.gate.has_authority(&admin_id) {
            return Err(GovernanceError::NotAuthorized);
        }

        // One pending request per requester, owner included.
        {
            let registry = self.registry.read().await;
            if let Some(existing) = registry
                .values()
                .find(|r| r.requester_id == admin_id && r.status == RequestStatus::Pending)
            {
                return Err(GovernanceError::DuplicatePending {
                    request_id: existing.id.clone(),
                });
            }
        }

        if self.gate.is_owner(&admin_id) {
            return self.create_owner_request(admin_id, admin_name, now).await;
        }
        self.create_democratic_request(admin_id, admin_name, now)
            .await
    }

    /// Owner fast path: approved at creation, handed straight to the queue,
    /// exempt from rate limits, cooldown and the scheduled buffer.
    async fn create_owner_request(
        &self,
        owner_id: Uuid,
        owner_name: &str,
        now: DateTime<Utc>,
    ) -> GovernanceResult<RequestOutcome> {
        let mut request = UpdateRequest::new(owner_id, owner_name, now, self.config.ttl_minutes);
        request
            .approve_by_owner(owner_id, now)
            .map_err(|_| GovernanceError::NotPending {
                status: request.status,
            })?;

        let item = QueuedUpdate::new(
            Some(request.id.clone()),
            owner_id,
            owner_name,
            UpdateKind::OwnerRequest,
        );
        if !self.queue.enqueue(item).await {
            // Nothing was persisted, so there is nothing to roll back.
            return Err(GovernanceError::QueueFull);
        }

        tracing::info!(request_id = %request.id, owner_id = %owner_id, "Owner update request auto-approved");
        let _ = self.event_tx.send(GovernanceEvent::RequestCreated {
            request_id: request.id.clone(),
            requester_id: owner_id,
            requester_name: request.requester_name.clone(),
        });
        let _ = self.event_tx.send(GovernanceEvent::RequestAutoApproved {
            request_id: request.id.clone(),
            owner_id,
        });

        Ok(RequestOutcome {
            request,
            auto_approved: true,
            queued: true,
        })
    }

    async fn create_democratic_request(
        &self,
        admin_id: Uuid,
        admin_name: &str,
        now: DateTime<Utc>,
    ) -> GovernanceResult<RequestOutcome> {
        if self.democratic_update_used_today(now).await {
            return Err(GovernanceError::DemocraticCapUsed);
        }

        let ts = now.timestamp();
        if !self.policy.can_make_request(admin_id, ts) {
            // Tell the caller which limit actually bit.
            if self.policy.has_made_request_today(admin_id, ts) {
                return Err(GovernanceError::DailyCapReached);
            }
            return Err(GovernanceError::OverlappingRequest);
        }

        let request = UpdateRequest::new(admin_id, admin_name, now, self.config.ttl_minutes);
        {
            let mut registry = self.registry.write().await;
            // Re-check under the write lock: another request from the same
            // admin may have landed while we consulted the policy.
            if let Some(existing) = registry
                .values()
                .find(|r| r.requester_id == admin_id && r.status == RequestStatus::Pending)
            {
                return Err(GovernanceError::DuplicatePending {
                    request_id: existing.id.clone(),
                });
            }
            let was_empty = registry.is_empty();
            registry.insert(request.id.clone(), request.clone());
            if was_empty {
                self.occupancy.notify_one();
            }
        }
        self.policy.record_request(admin_id, ts);

        tracing::info!(request_id = %request.id, admin_id = %admin_id, "Update request created");
        let _ = self.event_tx.send(GovernanceEvent::RequestCreated {
            request_id: request.id.clone(),
            requester_id: admin_id,
            requester_name: request.requester_name.clone(),
        });

        Ok(RequestOutcome {
            request,
            auto_approved: false,
            queued: false,
        })
    }

    /// Cast a vote and resolve the request if a quorum is reached.
    ///
    /// Approval is checked before rejection on every vote, so a vote that
    /// satisfies both thresholds at once resolves approved.
    pub async fn cast_vote(
        &self,
        request_id: &str,
        admin_id: &str,
        admin_name: &str,
        choice: VoteChoice,
        now: DateTime<Utc>,
    ) -> GovernanceResult<VoteOutcome> {
        let admin_id = self.parse_identity(admin_id)?;
        if !self.gate.has_authority(&admin_id) {
            return Err(GovernanceError::NotAuthorized);
        }

        // Threshold denominator is the admin count at the moment of the
        // vote, fetched before the registry lock.
        let total_admins = self.gate.admin_count();

        let mut registry = self.registry.write().await;
        let request = registry
            .get_mut(request_id)
            .ok_or_else(|| GovernanceError::NotFound(request_id.to_string()))?;

        if request.status != RequestStatus::Pending {
            return Err(GovernanceError::NotPending {
                status: request.status,
            });
        }
        if let Some(previous) = request.vote_of(&admin_id) {
            return Err(GovernanceError::DuplicateVote {
                choice: previous.choice,
                voted_at: previous.voted_at,
            });
        }
        request
            .record_vote(admin_id, admin_name, choice, now)
            .map_err(|_| GovernanceError::NotPending {
                status: request.status,
            })?;

        let tally = VoteTally::new(request, total_admins);
        let _ = self.event_tx.send(GovernanceEvent::VoteRecorded {
            request_id: request.id.clone(),
            admin_id,
            choice,
            approve_votes: tally.approve_votes,
            reject_votes: tally.reject_votes,
        });

        if tally.approve_votes >= tally.required_approve {
            let request_id = request.id.clone();
            request
                .approve_by_vote()
                .map_err(|_| GovernanceError::NotPending {
                    status: request.status,
                })?;

            let item = QueuedUpdate::new(
                Some(request_id.clone()),
                request.requester_id,
                request.requester_name.clone(),
                UpdateKind::Democratic,
            );
            let queued = self.queue.enqueue(item).await;
            if queued {
                registry.remove(&request_id);
                drop(registry);
                self.mark_democratic_used(now).await;
                tracing::info!(request_id = %request_id, "Request approved by quorum and queued");
            } else {
                // Queue is full: the approved entry stays in the registry
                // and the sweep re-offers it until the queue drains.
                drop(registry);
                tracing::warn!(request_id = %request_id, "Request approved but queue is full");
            }
            let _ = self.event_tx.send(GovernanceEvent::RequestApproved {
                request_id: request_id.clone(),
                queued,
            });
            return Ok(VoteOutcome {
                request_id,
                status: RequestStatus::Approved,
                tally,
                queued,
            });
        }

        if tally.reject_votes >= tally.required_reject {
            request
                .reject_by_vote()
                .map_err(|_| GovernanceError::NotPending {
                    status: request.status,
                })?;
            let request_id = request.id.clone();
            tracing::info!(request_id = %request_id, "Request rejected by quorum");
            let _ = self.event_tx.send(GovernanceEvent::RequestRejected {
                request_id: request_id.clone(),
                reason: "Rejected by admin vote".to_string(),
            });
            return Ok(VoteOutcome {
                request_id,
                status: RequestStatus::Rejected,
                tally,
                queued: false,
            });
        }

        Ok(VoteOutcome {
            request_id: request.id.clone(),
            status: RequestStatus::Pending,
            tally,
            queued: false,
        })
    }

    /// Pending requests with their tallies, oldest first.
    pub async fn pending_requests(&self, now: DateTime<Utc>) -> Vec<PendingRequestView> {
        let total_admins = self.gate.admin_count();
        let registry = self.registry.read().await;
        let mut views: Vec<PendingRequestView> = registry
            .values()
            .filter(|r| r.status == RequestStatus::Pending)
            .map(|r| PendingRequestView {
                id: r.id.clone(),
                requester_id: r.requester_id,
                requester_name: r.requester_name.clone(),
                created_at: r.created_at,
                expires_at: r.expires_at,
                expires_in_seconds: (r.expires_at - now).num_seconds().max(0),
                votes: r.votes.clone(),
                tally: VoteTally::new(r, total_admins),
            })
            .collect();
        views.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        views
    }

    /// How a given admin stands on a given request.
    pub async fn vote_status(
        &self,
        request_id: &str,
        admin_id: &str,
    ) -> GovernanceResult<VoteStatusView> {
        let admin_id = self.parse_identity(admin_id)?;
        if !self.gate.has_authority(&admin_id) {
            return Err(GovernanceError::NotAuthorized);
        }

        let registry = self.registry.read().await;
        let request = registry
            .get(request_id)
            .ok_or_else(|| GovernanceError::NotFound(request_id.to_string()))?;

        let vote = request.vote_of(&admin_id);
        Ok(VoteStatusView {
            request_id: request.id.clone(),
            status: request.status,
            has_voted: vote.is_some(),
            vote: vote.map(|v| v.choice),
            voted_at: vote.map(|v| v.voted_at),
            approve_votes: request.approve_votes(),
            reject_votes: request.reject_votes(),
        })
    }

    /// Owner veto. Always available while the request is pending; cooldown
    /// and buffer never block it.
    pub async fn veto(
        &self,
        request_id: &str,
        owner_id: &str,
        now: DateTime<Utc>,
    ) -> GovernanceResult<UpdateRequest> {
        let owner_id = self.parse_identity(owner_id)?;
        if !self.gate.is_owner(&owner_id) {
            return Err(GovernanceError::OwnerRequired);
        }

        let mut registry = self.registry.write().await;
        let request = registry
            .get_mut(request_id)
            .ok_or_else(|| GovernanceError::NotFound(request_id.to_string()))?;

        if request.status != RequestStatus::Pending {
            return Err(GovernanceError::NotPending {
                status: request.status,
            });
        }
        request
            .veto(owner_id, now)
            .map_err(|_| GovernanceError::NotPending {
                status: request.status,
            })?;

        tracing::info!(request_id = %request.id, owner_id = %owner_id, "Request vetoed");
        let _ = self.event_tx.send(GovernanceEvent::RequestVetoed {
            request_id: request.id.clone(),
            owner_id,
        });
        Ok(request.clone())
    }

    /// Owner approval of a pending request, subject to cooldown and the
    /// scheduled-update buffer. The status change rolls back if the queue
    /// refuses the work: an approved request is never left unqueued here.
    pub async fn owner_approve(
        &self,
        request_id: &str,
        owner_id: &str,
        now: DateTime<Utc>,
    ) -> GovernanceResult<UpdateRequest> {
        let owner_id = self.parse_identity(owner_id)?;
        if !self.gate.is_owner(&owner_id) {
            return Err(GovernanceError::OwnerRequired);
        }

        // Existence and state first, restrictions second, then commit
        // under the write lock with a fresh status check.
        {
            let registry = self.registry.read().await;
            let request = registry
                .get(request_id)
                .ok_or_else(|| GovernanceError::NotFound(request_id.to_string()))?;
            if request.status != RequestStatus::Pending {
                return Err(GovernanceError::NotPending {
                    status: request.status,
                });
            }
        }
        self.check_owner_restrictions(now).await?;

        let mut registry = self.registry.write().await;
        let request = registry
            .get_mut(request_id)
            .ok_or_else(|| GovernanceError::NotFound(request_id.to_string()))?;
        if request.status != RequestStatus::Pending {
            return Err(GovernanceError::NotPending {
                status: request.status,
            });
        }
        request
            .approve_by_owner(owner_id, now)
            .map_err(|_| GovernanceError::NotPending {
                status: request.status,
            })?;

        let item = QueuedUpdate::new(
            Some(request.id.clone()),
            request.requester_id,
            request.requester_name.clone(),
            UpdateKind::OwnerApproval,
        );
        if !self.queue.enqueue(item).await {
            request
                .rollback_owner_approval()
                .map_err(|_| GovernanceError::NotPending {
                    status: request.status,
                })?;
            tracing::warn!(request_id = %request_id, "Owner approval rolled back: queue full");
            return Err(GovernanceError::QueueFull);
        }

        let approved = request.clone();
        registry.remove(request_id);
        tracing::info!(request_id = %request_id, owner_id = %owner_id, "Request approved by owner and queued");
        let _ = self.event_tx.send(GovernanceEvent::RequestApproved {
            request_id: request_id.to_string(),
            queued: true,
        });
        Ok(approved)
    }

    /// Owner force-update: queue a catalog update with no request at all.
    pub async fn force_update(
        &self,
        owner_id: &str,
        owner_name: &str,
        now: DateTime<Utc>,
    ) -> GovernanceResult<QueuedUpdate> {
        let owner_id = self.parse_identity(owner_id)?;
        if !self.gate.is_owner(&owner_id) {
            return Err(GovernanceError::OwnerRequired);
        }
        self.check_owner_restrictions(now).await?;

        let item = QueuedUpdate::new(None, owner_id, owner_name, UpdateKind::Forced);
        if !self.queue.enqueue(item.clone()).await {
            return Err(GovernanceError::QueueFull);
        }

        tracing::info!(owner_id = %owner_id, "Force update queued");
        let _ = self
            .event_tx
            .send(GovernanceEvent::ForceUpdateQueued { owner_id });
        Ok(item)
    }

    /// Cooldown, scheduled-window and running-job restrictions shared by
    /// owner approval and force-update. Veto never passes through here.
    async fn check_owner_restrictions(&self, now: DateTime<Utc>) -> GovernanceResult<()> {
        let status = self.updater.status().await;
        if status.is_updating {
            return Err(GovernanceError::UpdateInProgress);
        }

        if let Some(last) = status.last_update_time {
            let cooldown = Duration::hours(self.config.cooldown_hours);
            let elapsed = now - last;
            if elapsed < cooldown {
                let deficit = cooldown - elapsed;
                // Round up so "90 minutes left" never reads as 89.
                let remaining_minutes = (deficit.num_seconds() + 59) / 60;
                return Err(GovernanceError::CooldownActive { remaining_minutes });
            }
        }

        let hour = now.hour();
        let scheduled = self.config.scheduled_update_hour;
        let buffer = self.config.buffer_hours;
        let diff = (hour + 24 - scheduled) % 24;
        if diff <= buffer || diff >= 24 - buffer {
            return Err(GovernanceError::ScheduledBufferActive);
        }

        Ok(())
    }

    /// Expire stale pending requests, retry stalled approved ones, and
    /// prune resolved entries past their audit window. The cleanup
    /// scheduler drives this; tests call it directly with a chosen `now`.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> SweepReport {
        let ts = now.timestamp();
        let mut report = SweepReport::default();
        let mut democratic_retry_succeeded = false;

        {
            let mut registry = self.registry.write().await;

            let expired_ids: Vec<String> = registry
                .values()
                .filter(|r| {
                    r.status == RequestStatus::Pending
                        && self.policy.is_request_expired(
                            r.created_at.timestamp(),
                            ts,
                            self.config.ttl_minutes,
                        )
                })
                .map(|r| r.id.clone())
                .collect();
            for id in expired_ids {
                if let Some(request) = registry.get_mut(&id) {
                    if request.expire().is_ok() {
                        registry.remove(&id);
                        report.expired += 1;
                        tracing::info!(request_id = %id, "Request expired");
                        let _ = self
                            .event_tx
                            .send(GovernanceEvent::RequestExpired { request_id: id });
                    }
                }
            }

            // Approved entries only linger when the queue was full at
            // resolution time; re-offer them until the queue drains.
            let stalled_ids: Vec<String> = registry
                .values()
                .filter(|r| r.status == RequestStatus::Approved)
                .map(|r| r.id.clone())
                .collect();
            for id in stalled_ids {
                let item = match registry.get(&id) {
                    Some(request) => QueuedUpdate::new(
                        Some(request.id.clone()),
                        request.requester_id,
                        request.requester_name.clone(),
                        if request.owner_approved {
                            UpdateKind::OwnerApproval
                        } else {
                            UpdateKind::Democratic
                        },
                    ),
                    None => continue,
                };
                let democratic = !item.owner_initiated;
                if self.queue.enqueue(item).await {
                    registry.remove(&id);
                    report.requeued += 1;
                    if democratic {
                        democratic_retry_succeeded = true;
                    }
                    tracing::info!(request_id = %id, "Stalled approved request queued");
                    let _ = self
                        .event_tx
                        .send(GovernanceEvent::QueueRetrySucceeded { request_id: id });
                }
            }

            // Rejected entries stay visible for audit until their original
            // validity window lapses. Approved entries are never pruned:
            // they leave only by reaching the queue.
            let pruned_ids: Vec<String> = registry
                .values()
                .filter(|r| r.status == RequestStatus::Rejected && r.is_expired(now))
                .map(|r| r.id.clone())
                .collect();
            for id in pruned_ids {
                registry.remove(&id);
                report.pruned += 1;
            }

            report.remaining = registry.len();
        }

        if democratic_retry_succeeded {
            self.mark_democratic_used(now).await;
        }
        self.policy.cleanup_expired(ts);
        report
    }

    /// Whether today's democratic update slot is spent.
    pub async fn democratic_update_used_today(&self, now: DateTime<Utc>) -> bool {
        let democratic = self.democratic.read().await;
        democratic.used && democratic.day == now.date_naive()
    }

    async fn mark_democratic_used(&self, now: DateTime<Utc>) {
        let mut democratic = self.democratic.write().await;
        democratic.used = true;
        democratic.day = now.date_naive();
    }

    /// Counters for the security-stats surface.
    pub async fn security_stats(&self, now: DateTime<Utc>) -> SecurityStatsView {
        let ts = now.timestamp();
        SecurityStatsView {
            total_requests_today: self.policy.total_requests_today(ts),
            democratic_update_used_today: self.democratic_update_used_today(now).await,
            pending_requests: self.pending_requests(now).await.len(),
            total_admins: self.gate.admin_count(),
            admin_roster: self.gate.admins(),
            request_stats: self.policy.all_admin_stats(ts),
        }
    }
}

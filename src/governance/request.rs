//! Update requests and ballots
//!
//! The unit of governance: an admin's proposal to run the catalog update,
//! carrying its own vote record and audit trail.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of an update request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    /// Open for voting
    Pending,
    /// Quorum or owner approved; handed to the execution queue
    Approved,
    /// Rejected by quorum or owner veto
    Rejected,
    /// Timed out before resolution
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

    /// Check if this is a terminal status
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RequestStatus::Pending)
    }
}

impl std::str::FromStr for RequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RequestStatus::Pending),
            "approved" => Ok(RequestStatus::Approved),
            "rejected" => Ok(RequestStatus::Rejected),
            "expired" => Ok(RequestStatus::Expired),
            _ => Err(format!("Invalid request status: {}", s)),
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

impl VoteChoice {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoteChoice::Approve => "approve",
            VoteChoice::Reject => "reject",
        }
    }
}

impl std::str::FromStr for VoteChoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approve" => Ok(VoteChoice::Approve),
            "reject" => Ok(VoteChoice::Reject),
            _ => Err(format!("Invalid vote choice: {}", s)),
        }
    }
}

/// A recorded vote. First write wins; entries are never overwritten.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vote {
    pub choice: VoteChoice,
    pub admin_name: String,
    pub voted_at: DateTime<Utc>,
}

/// An admin's request to run the catalog update
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateRequest {
    /// Opaque collision-resistant identifier (no ordering semantics)
    pub id: String,
    /// The admin who filed the request
    pub requester_id: Uuid,
    pub requester_name: String,
    /// Current status
    pub status: RequestStatus,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
    /// Hard validity deadline; voting past this point is void
    pub expires_at: DateTime<Utc>,
    /// Ballots keyed by voter, one entry per admin
    pub votes: HashMap<Uuid, Vote>,
    /// Whether the owner resolved this request directly
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

/// Mint a registry id: creation millis plus a random suffix.
fn mint_request_id(now: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", now.timestamp_millis(), &suffix[..12])
}

impl UpdateRequest {
    /// Create a new pending request
    pub fn new(
        requester_id: Uuid,
        requester_name: impl Into<String>,
        now: DateTime<Utc>,
        ttl_minutes: i64,
    ) -> Self {
        Self {
            id: mint_request_id(now),
            requester_id,
            requester_name: requester_name.into(),
            status: RequestStatus::Pending,
            created_at: now,
            expires_at: now + Duration::minutes(ttl_minutes),
            votes: HashMap::new(),
            owner_approved: false,
            owner_approved_by: None,
            owner_approved_at: None,
            owner_vetoed_by: None,
            owner_vetoed_at: None,
            rejection_reason: None,
        }
    }

    /// Check whether the request has outlived its validity window
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Look up an admin's recorded vote
    pub fn vote_of(&self, admin_id: &Uuid) -> Option<&Vote> {
        self.votes.get(admin_id)
    }

    /// Record a vote. Rejects non-pending requests and repeat voters.
    pub fn record_vote(
        &mut self,
        admin_id: Uuid,
        admin_name: impl Into<String>,
        choice: VoteChoice,
        now: DateTime<Utc>,
    ) -> Result<(), String> {
        if self.status != RequestStatus::Pending {
            return Err(format!(
                "Cannot vote on request with status: {}",
                self.status.as_str()
            ));
        }
        if self.votes.contains_key(&admin_id) {
            return Err("Admin has already voted on this request".to_string());
        }
        self.votes.insert(
            admin_id,
            Vote {
                choice,
                admin_name: admin_name.into(),
                voted_at: now,
            },
        );
        Ok(())
    }

    /// Count of approve ballots (full scan; the map stays small)
    pub fn approve_votes(&self) -> usize {
        self.votes
            .values()
            .filter(|v| v.choice == VoteChoice::Approve)
            .count()
    }

    /// Count of reject ballots
    pub fn reject_votes(&self) -> usize {
        self.votes
            .values()
            .filter(|v| v.choice == VoteChoice::Reject)
            .count()
    }

    /// Approve via vote quorum
    pub fn approve_by_vote(&mut self) -> Result<(), String> {
        if self.status != RequestStatus::Pending {
            return Err(format!(
                "Cannot approve request with status: {}",
                self.status.as_str()
            ));
        }
        self.status = RequestStatus::Approved;
        Ok(())
    }

    /// Approve directly by the owner
    pub fn approve_by_owner(&mut self, owner_id: Uuid, now: DateTime<Utc>) -> Result<(), String> {
        if self.status != RequestStatus::Pending {
            return Err(format!(
                "Cannot approve request with status: {}",
                self.status.as_str()
            ));
        }
        self.status = RequestStatus::Approved;
        self.owner_approved = true;
        self.owner_approved_by = Some(owner_id);
        self.owner_approved_at = Some(now);
        Ok(())
    }

    /// Undo an owner approval whose enqueue failed, restoring the
    /// pre-approval state. Pending entries never carry owner audit fields,
    /// so clearing them is an exact rollback.
    pub fn rollback_owner_approval(&mut self) -> Result<(), String> {
        if self.status != RequestStatus::Approved || !self.owner_approved {
            return Err(format!(
                "Cannot roll back request with status: {}",
                self.status.as_str()
            ));
        }
        self.status = RequestStatus::Pending;
        self.owner_approved = false;
        self.owner_approved_by = None;
        self.owner_approved_at = None;
        Ok(())
    }

    /// Reject via vote quorum
    pub fn reject_by_vote(&mut self) -> Result<(), String> {
        if self.status != RequestStatus::Pending {
            return Err(format!(
                "Cannot reject request with status: {}",
                self.status.as_str()
            ));
        }
        self.status = RequestStatus::Rejected;
        self.rejection_reason = Some("Rejected by admin vote".to_string());
        Ok(())
    }

    /// Reject by owner veto
    pub fn veto(&mut self, owner_id: Uuid, now: DateTime<Utc>) -> Result<(), String> {
        if self.status != RequestStatus::Pending {
            return Err(format!(
                "Cannot veto request with status: {}",
                self.status.as_str()
            ));
        }
        self.status = RequestStatus::Rejected;
        self.owner_vetoed_by = Some(owner_id);
        self.owner_vetoed_at = Some(now);
        self.rejection_reason = Some("Owner veto".to_string());
        Ok(())
    }

    /// Mark as timed out. Only the cleanup sweep calls this.
    pub fn expire(&mut self) -> Result<(), String> {
        if self.status != RequestStatus::Pending {
            return Err(format!(
                "Cannot expire request with status: {}",
                self.status.as_str()
            ));
        }
        self.status = RequestStatus::Expired;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_request() -> UpdateRequest {
        UpdateRequest::new(Uuid::new_v4(), "Dana", Utc::now(), 10)
    }

    #[test]
    fn test_request_status_as_str() {
        assert_eq!(RequestStatus::Pending.as_str(), "pending");
        assert_eq!(RequestStatus::Approved.as_str(), "approved");
        assert_eq!(RequestStatus::Rejected.as_str(), "rejected");
        assert_eq!(RequestStatus::Expired.as_str(), "expired");
    }

    #[test]
    fn test_request_status_from_str() {
        assert_eq!(
            "pending".parse::<RequestStatus>().unwrap(),
            RequestStatus::Pending
        );
        assert_eq!(
            "expired".parse::<RequestStatus>().unwrap(),
            RequestStatus::Expired
        );
        assert!("active".parse::<RequestStatus>().is_err());
    }

    #[test]
    fn test_request_status_is_terminal() {
        assert!(!RequestStatus::Pending.is_terminal());
        assert!(RequestStatus::Approved.is_terminal());
        assert!(RequestStatus::Rejected.is_terminal());
        assert!(RequestStatus::Expired.is_terminal());
    }

    #[test]
    fn test_vote_choice_from_str() {
        assert_eq!("approve".parse::<VoteChoice>().unwrap(), VoteChoice::Approve);
        assert_eq!("reject".parse::<VoteChoice>().unwrap(), VoteChoice::Reject);
        assert!("abstain".parse::<VoteChoice>().is_err());
    }

    #[test]
    fn test_request_id_shape() {
        let now = Utc::now();
        let request = UpdateRequest::new(Uuid::new_v4(), "Dana", now, 10);
        let (millis, suffix) = request.id.split_once('-').unwrap();
        assert_eq!(millis, now.timestamp_millis().to_string());
        assert_eq!(suffix.len(), 12);
    }

    #[test]
    fn test_new_request_is_pending_with_ttl() {
        let now = Utc::now();
        let request = UpdateRequest::new(Uuid::new_v4(), "Dana", now, 10);
        assert_eq!(request.status, RequestStatus::Pending);
        assert_eq!(request.expires_at, now + Duration::minutes(10));
        assert!(request.votes.is_empty());
        assert!(!request.owner_approved);
    }

    #[test]
    fn test_is_expired_boundary() {
        let now = Utc::now();
        let request = UpdateRequest::new(Uuid::new_v4(), "Dana", now, 10);
        assert!(!request.is_expired(now + Duration::minutes(10)));
        assert!(request.is_expired(now + Duration::minutes(10) + Duration::seconds(1)));
    }

    #[test]
    fn test_record_vote() {
        let mut request = make_request();
        let voter = Uuid::new_v4();
        request
            .record_vote(voter, "Kim", VoteChoice::Approve, Utc::now())
            .unwrap();
        assert_eq!(request.approve_votes(), 1);
        assert_eq!(request.reject_votes(), 0);
        assert_eq!(request.vote_of(&voter).unwrap().admin_name, "Kim");
    }

    #[test]
    fn test_record_vote_duplicate() {
        let mut request = make_request();
        let voter = Uuid::new_v4();
        request
            .record_vote(voter, "Kim", VoteChoice::Approve, Utc::now())
            .unwrap();
        let err = request
            .record_vote(voter, "Kim", VoteChoice::Reject, Utc::now())
            .unwrap_err();
        assert!(err.contains("already voted"));
        // First vote is kept untouched
        assert_eq!(request.vote_of(&voter).unwrap().choice, VoteChoice::Approve);
    }

    #[test]
    fn test_record_vote_non_pending() {
        let mut request = make_request();
        request.approve_by_vote().unwrap();
        assert!(request
            .record_vote(Uuid::new_v4(), "Kim", VoteChoice::Approve, Utc::now())
            .is_err());
    }

    #[test]
    fn test_tally_counts_both_sides() {
        let mut request = make_request();
        let now = Utc::now();
        request
            .record_vote(Uuid::new_v4(), "A", VoteChoice::Approve, now)
            .unwrap();
        request
            .record_vote(Uuid::new_v4(), "B", VoteChoice::Approve, now)
            .unwrap();
        request
            .record_vote(Uuid::new_v4(), "C", VoteChoice::Reject, now)
            .unwrap();
        assert_eq!(request.approve_votes(), 2);
        assert_eq!(request.reject_votes(), 1);
    }

    #[test]
    fn test_approve_by_vote() {
        let mut request = make_request();
        request.approve_by_vote().unwrap();
        assert_eq!(request.status, RequestStatus::Approved);
        assert!(!request.owner_approved);
    }

    #[test]
    fn test_approve_by_owner_sets_audit_fields() {
        let mut request = make_request();
        let owner = Uuid::new_v4();
        let now = Utc::now();
        request.approve_by_owner(owner, now).unwrap();
        assert_eq!(request.status, RequestStatus::Approved);
        assert!(request.owner_approved);
        assert_eq!(request.owner_approved_by, Some(owner));
        assert_eq!(request.owner_approved_at, Some(now));
    }

    #[test]
    fn test_rollback_owner_approval() {
        let mut request = make_request();
        let owner = Uuid::new_v4();
        request.approve_by_owner(owner, Utc::now()).unwrap();
        request.rollback_owner_approval().unwrap();
        assert_eq!(request.status, RequestStatus::Pending);
        assert!(!request.owner_approved);
        assert_eq!(request.owner_approved_by, None);
        assert_eq!(request.owner_approved_at, None);
    }

    #[test]
    fn test_rollback_requires_owner_approval() {
        let mut request = make_request();
        assert!(request.rollback_owner_approval().is_err());
        request.approve_by_vote().unwrap();
        assert!(request.rollback_owner_approval().is_err());
    }

    #[test]
    fn test_reject_by_vote_sets_reason() {
        let mut request = make_request();
        request.reject_by_vote().unwrap();
        assert_eq!(request.status, RequestStatus::Rejected);
        assert_eq!(
            request.rejection_reason.as_deref(),
            Some("Rejected by admin vote")
        );
    }

    #[test]
    fn test_veto_sets_audit_fields() {
        let mut request = make_request();
        let owner = Uuid::new_v4();
        let now = Utc::now();
        request.veto(owner, now).unwrap();
        assert_eq!(request.status, RequestStatus::Rejected);
        assert_eq!(request.owner_vetoed_by, Some(owner));
        assert_eq!(request.owner_vetoed_at, Some(now));
        assert_eq!(request.rejection_reason.as_deref(), Some("Owner veto"));
    }

    #[test]
    fn test_veto_only_pending() {
        let mut request = make_request();
        request.reject_by_vote().unwrap();
        assert!(request.veto(Uuid::new_v4(), Utc::now()).is_err());
    }

    #[test]
    fn test_expire_only_pending() {
        let mut request = make_request();
        request.expire().unwrap();
        assert_eq!(request.status, RequestStatus::Expired);

        let mut approved = make_request();
        approved.approve_by_vote().unwrap();
        assert!(approved.expire().is_err());
    }

    #[test]
    fn test_request_serialization_skips_empty_audit_fields() {
        let request = make_request();
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"status\":\"pending\""));
        assert!(!json.contains("owner_approved_by"));
        assert!(!json.contains("rejection_reason"));
    }
}

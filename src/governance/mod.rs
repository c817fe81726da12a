//! Governed catalog-update requests
//!
//! This module implements the approval workflow around catalog updates:
//! admins file requests, a vote quorum or the owner resolves them, and
//! approved work is handed to the execution queue.

pub mod authority;
pub mod manager;
pub mod policy;
pub mod request;
pub mod sweeper;

pub use authority::{AdminProfile, AuthorityGate, Role, RoleCache, RoleSource};
pub use manager::{
    GovernanceConfig, GovernanceError, GovernanceEvent, GovernanceManager, GovernanceResult,
    RequestOutcome, VoteOutcome,
};
pub use policy::{AdminRequestStats, RequestLedger, SecurityPolicy};
pub use request::{RequestStatus, UpdateRequest, Vote, VoteChoice};
pub use sweeper::{CleanupScheduler, DEFAULT_SWEEP_INTERVAL};

//! Roles and the authorization gate
//!
//! Single choke point for admin/owner checks. Every privileged operation
//! re-verifies the caller's role here, even when routing already
//! restricted the path.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Privileged platform role attached to a user id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Voting member of the update council
    Admin,
    /// Platform owner; may veto, approve, and force updates
    Owner,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Owner => "owner",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "owner" => Ok(Role::Owner),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

/// A user holding a privileged role
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminProfile {
    pub user_id: Uuid,
    pub display_name: String,
    pub role: Role,
    pub granted_at: DateTime<Utc>,
}

/// Role lookups consumed by the gate and the voting quorum.
///
/// `admin_count` counts `admin` roles only: it is the quorum denominator,
/// and the owner resolves requests through override rather than the
/// ballot box.
pub trait RoleSource: Send + Sync {
    fn is_admin(&self, user_id: &Uuid) -> bool;
    fn is_owner(&self, user_id: &Uuid) -> bool;
    fn admin_count(&self) -> usize;
    fn admins(&self) -> Vec<AdminProfile>;
}

/// In-memory role table, refreshed from the role store.
#[derive(Default)]
pub struct RoleCache {
    entries: RwLock<HashMap<Uuid, AdminProfile>>,
}

impl RoleCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Swap in a freshly loaded role set.
    pub fn replace_all(&self, profiles: Vec<AdminProfile>) {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        entries.clear();
        for profile in profiles {
            entries.insert(profile.user_id, profile);
        }
    }

    /// Add or update a single profile.
    pub fn grant(&self, profile: AdminProfile) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(profile.user_id, profile);
    }

    pub fn get(&self, user_id: &Uuid) -> Option<AdminProfile> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(user_id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RoleSource for RoleCache {
    fn is_admin(&self, user_id: &Uuid) -> bool {
        matches!(self.get(user_id), Some(p) if p.role == Role::Admin)
    }

    fn is_owner(&self, user_id: &Uuid) -> bool {
        matches!(self.get(user_id), Some(p) if p.role == Role::Owner)
    }

    fn admin_count(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|p| p.role == Role::Admin)
            .count()
    }

    fn admins(&self) -> Vec<AdminProfile> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|p| p.role == Role::Admin)
            .cloned()
            .collect()
    }
}

/// Authorization decisions for the governance surface.
#[derive(Clone)]
pub struct AuthorityGate {
    roles: Arc<dyn RoleSource>,
}

impl AuthorityGate {
    pub fn new(roles: Arc<dyn RoleSource>) -> Self {
        Self { roles }
    }

    /// True iff the user holds any privileged role.
    pub fn has_authority(&self, user_id: &Uuid) -> bool {
        self.roles.is_admin(user_id) || self.roles.is_owner(user_id)
    }

    pub fn is_owner(&self, user_id: &Uuid) -> bool {
        self.roles.is_owner(user_id)
    }

    pub fn is_admin(&self, user_id: &Uuid) -> bool {
        self.roles.is_admin(user_id)
    }

    /// Quorum denominator at this instant.
    pub fn admin_count(&self) -> usize {
        self.roles.admin_count()
    }

    pub fn admins(&self) -> Vec<AdminProfile> {
        self.roles.admins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(role: Role) -> AdminProfile {
        AdminProfile {
            user_id: Uuid::new_v4(),
            display_name: "Dana".to_string(),
            role,
            granted_at: Utc::now(),
        }
    }

    #[test]
    fn test_role_as_str_round_trip() {
        assert_eq!(Role::Admin.as_str(), "admin");
        assert_eq!(Role::Owner.as_str(), "owner");
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!("owner".parse::<Role>().unwrap(), Role::Owner);
        assert!("moderator".parse::<Role>().is_err());
    }

    #[test]
    fn test_cache_grant_and_get() {
        let cache = RoleCache::new();
        let admin = profile(Role::Admin);
        cache.grant(admin.clone());

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&admin.user_id).unwrap().role, Role::Admin);
        assert!(cache.get(&Uuid::new_v4()).is_none());
    }

    #[test]
    fn test_cache_replace_all_drops_stale_entries() {
        let cache = RoleCache::new();
        let stale = profile(Role::Admin);
        cache.grant(stale.clone());

        let fresh = profile(Role::Admin);
        cache.replace_all(vec![fresh.clone()]);

        assert!(cache.get(&stale.user_id).is_none());
        assert!(cache.get(&fresh.user_id).is_some());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_admin_count_excludes_owner() {
        let cache = RoleCache::new();
        cache.grant(profile(Role::Admin));
        cache.grant(profile(Role::Admin));
        cache.grant(profile(Role::Owner));

        assert_eq!(cache.admin_count(), 2);
        assert_eq!(cache.admins().len(), 2);
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_gate_authority_checks() {
        let cache = Arc::new(RoleCache::new());
        let admin = profile(Role::Admin);
        let owner = profile(Role::Owner);
        cache.grant(admin.clone());
        cache.grant(owner.clone());
        let gate = AuthorityGate::new(cache);

        assert!(gate.has_authority(&admin.user_id));
        assert!(gate.has_authority(&owner.user_id));
        assert!(!gate.has_authority(&Uuid::new_v4()));

        assert!(gate.is_admin(&admin.user_id));
        assert!(!gate.is_admin(&owner.user_id));
        assert!(gate.is_owner(&owner.user_id));
        assert!(!gate.is_owner(&admin.user_id));
    }
}

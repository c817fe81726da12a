//! Request-abuse policy
//!
//! Per-admin daily caps and request-expiry bookkeeping, kept separate from
//! the registry so the governance engine consumes it purely as a contract.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use serde::Serialize;
use uuid::{Uuid, Variant};

/// Each admin may file at most this many requests per UTC day.
const MAX_REQUESTS_PER_DAY: u32 = 1;

/// Timestamps further than a year from the wall clock are garbage.
const TIMESTAMP_SANITY_WINDOW_SECS: i64 = 365 * 86_400;

/// Per-admin request statistics for the stats surface.
#[derive(Debug, Clone, Serialize)]
pub struct AdminRequestStats {
    pub admin_id: Uuid,
    pub requests_today: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_request_time: Option<i64>,
    pub has_active_request: bool,
}

/// Rate-limit and expiry contract consumed by the governance engine.
///
/// All timestamps are epoch seconds; callers pass `now` explicitly so the
/// policy itself stays clock-free apart from `current_timestamp`.
pub trait SecurityPolicy: Send + Sync {
    /// Check that an identity string has UUIDv4 shape.
    fn validate_admin_id(&self, id: &str) -> bool;
    /// Whether the admin may file a request right now.
    fn can_make_request(&self, admin_id: Uuid, now: i64) -> bool;
    /// Note that the admin filed a request at `now`.
    fn record_request(&self, admin_id: Uuid, now: i64);
    fn has_made_request_today(&self, admin_id: Uuid, now: i64) -> bool;
    fn request_count_today(&self, admin_id: Uuid, now: i64) -> u32;
    fn total_requests_today(&self, now: i64) -> u32;
    /// Whether a request created at `created_at` has outlived `ttl_minutes`.
    fn is_request_expired(&self, created_at: i64, now: i64, ttl_minutes: i64) -> bool;
    /// Drop expired active-request flags. Returns how many were cleared.
    fn cleanup_expired(&self, now: i64) -> usize;
    fn all_admin_stats(&self, now: i64) -> Vec<AdminRequestStats>;
    fn current_timestamp(&self) -> i64;
}

/// Start of the UTC day containing `ts`.
fn utc_day_start(ts: i64) -> i64 {
    ts - ts.rem_euclid(86_400)
}

fn timestamp_is_sane(ts: i64) -> bool {
    ts > 0 && (ts - Utc::now().timestamp()).abs() <= TIMESTAMP_SANITY_WINDOW_SECS
}

#[derive(Debug, Clone, Copy)]
struct AdminRecord {
    requests_today: u32,
    last_request_time: i64,
    /// UTC day the counters belong to; counters are stale once it passes.
    day_start: i64,
    has_active_request: bool,
}

impl AdminRecord {
    fn is_current_day(&self, now: i64) -> bool {
        self.day_start == utc_day_start(now)
    }
}

/// Default [`SecurityPolicy`]: a mutex-guarded per-admin ledger.
pub struct RequestLedger {
    records: Mutex<HashMap<Uuid, AdminRecord>>,
    /// Validity window for a filed request, in minutes.
    ttl_minutes: i64,
}

impl RequestLedger {
    pub fn new(ttl_minutes: i64) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            ttl_minutes,
        }
    }

    fn records(&self) -> MutexGuard<'_, HashMap<Uuid, AdminRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SecurityPolicy for RequestLedger {
    fn validate_admin_id(&self, id: &str) -> bool {
        if id.len() != 36 {
            return false;
        }
        match Uuid::parse_str(id) {
            Ok(parsed) => {
                parsed.get_version_num() == 4 && parsed.get_variant() == Variant::RFC4122
            }
            Err(_) => false,
        }
    }

    fn can_make_request(&self, admin_id: Uuid, now: i64) -> bool {
        if !timestamp_is_sane(now) {
            return false;
        }
        let records = self.records();
        let Some(record) = records.get(&admin_id) else {
            return true;
        };
        // Counters from a previous day no longer bind.
        if !record.is_current_day(now) {
            return true;
        }
        if record.requests_today >= MAX_REQUESTS_PER_DAY {
            return false;
        }
        // A still-live earlier request blocks overlap.
        if record.has_active_request
            && !self.is_request_expired(record.last_request_time, now, self.ttl_minutes)
        {
            return false;
        }
        true
    }

    fn record_request(&self, admin_id: Uuid, now: i64) {
        if !timestamp_is_sane(now) {
            return;
        }
        let mut records = self.records();
        let record = records.entry(admin_id).or_insert(AdminRecord {
            requests_today: 0,
            last_request_time: 0,
            day_start: utc_day_start(now),
            has_active_request: false,
        });
        if !record.is_current_day(now) {
            record.requests_today = 0;
            record.day_start = utc_day_start(now);
        }
        record.requests_today += 1;
        record.last_request_time = now;
        record.has_active_request = true;
    }

    fn has_made_request_today(&self, admin_id: Uuid, now: i64) -> bool {
        self.request_count_today(admin_id, now) > 0
    }

    fn request_count_today(&self, admin_id: Uuid, now: i64) -> u32 {
        let records = self.records();
        match records.get(&admin_id) {
            Some(record) if record.is_current_day(now) => record.requests_today,
            _ => 0,
        }
    }

    fn total_requests_today(&self, now: i64) -> u32 {
        self.records()
            .values()
            .filter(|r| r.is_current_day(now))
            .map(|r| r.requests_today)
            .sum()
    }

    fn is_request_expired(&self, created_at: i64, now: i64, ttl_minutes: i64) -> bool {
        now > created_at + ttl_minutes * 60
    }

    fn cleanup_expired(&self, now: i64) -> usize {
        let mut cleared = 0;
        let mut records = self.records();
        for record in records.values_mut() {
            if record.has_active_request
                && now > record.last_request_time + self.ttl_minutes * 60
            {
                record.has_active_request = false;
                cleared += 1;
            }
        }
        cleared
    }

    fn all_admin_stats(&self, now: i64) -> Vec<AdminRequestStats> {
        self.records()
            .iter()
            .map(|(admin_id, record)| {
                let current = record.is_current_day(now);
                AdminRequestStats {
                    admin_id: *admin_id,
                    requests_today: if current { record.requests_today } else { 0 },
                    last_request_time: Some(record.last_request_time),
                    has_active_request: record.has_active_request,
                }
            })
            .collect()
    }

    fn current_timestamp(&self) -> i64 {
        Utc::now().timestamp()
    }
}

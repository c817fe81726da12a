//! Server configuration
//!
//! Everything is overridable by flag or environment variable; defaults
//! match the production deployment.

use clap::Parser;
use uuid::Uuid;

use crate::governance::manager::GovernanceConfig;

/// ClearLabel governance server
#[derive(Parser, Debug, Clone)]
#[command(name = "clearlabel", version, about = "Governed catalog updates for the ClearLabel platform")]
pub struct ServerConfig {
    /// Address to bind
    #[arg(long, env = "CLEARLABEL_BIND", default_value = "0.0.0.0:3000")]
    pub bind: String,

    /// SQLite database URL
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite:clearlabel.db")]
    pub database_url: String,

    /// Base URL of the catalog-data service that runs the update job
    #[arg(long, env = "CATALOG_SERVICE_URL", default_value = "http://localhost:8081")]
    pub catalog_service_url: String,

    /// Validity window of a pending update request, in minutes
    #[arg(long, env = "CLEARLABEL_REQUEST_TTL_MINUTES", default_value_t = 10)]
    pub request_ttl_minutes: i64,

    /// Owner-action cooldown after a completed update, in hours
    #[arg(long, env = "CLEARLABEL_COOLDOWN_HOURS", default_value_t = 2)]
    pub cooldown_hours: i64,

    /// Hour of day (UTC) the scheduled catalog update runs
    #[arg(long, env = "CLEARLABEL_SCHEDULED_HOUR", default_value_t = 3)]
    pub scheduled_update_hour: u32,

    /// Owner actions are blocked within this many hours of the scheduled run
    #[arg(long, env = "CLEARLABEL_BUFFER_HOURS", default_value_t = 1)]
    pub buffer_hours: u32,

    /// Seconds between cleanup sweeps while requests are pending
    #[arg(long, env = "CLEARLABEL_SWEEP_INTERVAL_SECS", default_value_t = 300)]
    pub sweep_interval_secs: u64,

    /// Seconds between queue polls by the execution processor
    #[arg(long, env = "CLEARLABEL_POLL_INTERVAL_SECS", default_value_t = 5)]
    pub poll_interval_secs: u64,

    /// Execution queue capacity
    #[arg(long, env = "CLEARLABEL_QUEUE_CAPACITY", default_value_t = 10)]
    pub queue_capacity: usize,

    /// Seconds between role-cache reloads from the database
    #[arg(long, env = "CLEARLABEL_ROLE_REFRESH_SECS", default_value_t = 60)]
    pub role_refresh_secs: u64,

    /// Seed this user as owner at startup if set
    #[arg(long, env = "CLEARLABEL_OWNER_ID")]
    pub owner_id: Option<Uuid>,

    /// Display name for the seeded owner
    #[arg(long, env = "CLEARLABEL_OWNER_NAME", default_value = "Owner")]
    pub owner_name: String,
}

impl ServerConfig {
    /// The subset the governance manager cares about.
    pub fn governance(&self) -> GovernanceConfig {
        GovernanceConfig {
            ttl_minutes: self.request_ttl_minutes,
            cooldown_hours: self.cooldown_hours,
            scheduled_update_hour: self.scheduled_update_hour,
            buffer_hours: self.buffer_hours,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::try_parse_from(["clearlabel"]).unwrap();
        assert_eq!(config.request_ttl_minutes, 10);
        assert_eq!(config.cooldown_hours, 2);
        assert_eq!(config.scheduled_update_hour, 3);
        assert_eq!(config.buffer_hours, 1);
        assert_eq!(config.queue_capacity, 10);
        assert_eq!(config.owner_id, None);
    }

    #[test]
    fn test_flag_overrides() {
        let config = ServerConfig::try_parse_from([
            "clearlabel",
            "--request-ttl-minutes",
            "30",
            "--queue-capacity",
            "3",
            "--scheduled-update-hour",
            "5",
        ])
        .unwrap();
        assert_eq!(config.request_ttl_minutes, 30);
        assert_eq!(config.queue_capacity, 3);
        assert_eq!(config.scheduled_update_hour, 5);
    }

    #[test]
    fn test_governance_mapping() {
        let config = ServerConfig::try_parse_from(["clearlabel", "--cooldown-hours", "4"]).unwrap();
        let governance = config.governance();
        assert_eq!(governance.cooldown_hours, 4);
        assert_eq!(governance.ttl_minutes, 10);
    }

    #[test]
    fn test_owner_id_must_be_uuid() {
        let result = ServerConfig::try_parse_from(["clearlabel", "--owner-id", "not-a-uuid"]);
        assert!(result.is_err());
    }
}

//! Database store for privileged roles
//!
//! Roles are administered elsewhere on the platform; this process only
//! reads them into the in-memory cache, plus enough write support to
//! seed an owner on first boot.

use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::governance::authority::AdminProfile;

/// Role table access
#[derive(Clone)]
pub struct RoleStore {
    pool: SqlitePool,
}

impl RoleStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// All privileged users, for cache (re)loads.
    pub async fn load_all(&self) -> Result<Vec<AdminProfile>> {
        let rows = sqlx::query_as::<_, RoleRow>(
            r#"
            SELECT user_id, display_name, role, granted_at
            FROM user_roles
            ORDER BY granted_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.try_into()).collect()
    }

    pub async fn get(&self, user_id: Uuid) -> Result<AdminProfile> {
        let row = sqlx::query_as::<_, RoleRow>(
            r#"
            SELECT user_id, display_name, role, granted_at
            FROM user_roles
            WHERE user_id = ?
            "#,
        )
        .bind(user_id.to_string())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No role for user {}", user_id)))?;

        row.try_into()
    }

    /// Grant a role, or update the name/role of an existing grant.
    pub async fn upsert(&self, profile: &AdminProfile) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO user_roles (user_id, display_name, role, granted_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE
            SET display_name = excluded.display_name, role = excluded.role
            "#,
        )
        .bind(profile.user_id.to_string())
        .bind(&profile.display_name)
        .bind(profile.role.as_str())
        .bind(profile.granted_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Revoke a role. Returns whether anything was deleted.
    pub async fn remove(&self, user_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM user_roles WHERE user_id = ?
            "#,
        )
        .bind(user_id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

// Internal row type for sqlx

#[derive(sqlx::FromRow)]
struct RoleRow {
    user_id: String,
    display_name: String,
    role: String,
    granted_at: chrono::DateTime<Utc>,
}

impl TryFrom<RoleRow> for AdminProfile {
    type Error = AppError;

    fn try_from(row: RoleRow) -> Result<Self> {
        Ok(AdminProfile {
            user_id: Uuid::parse_str(&row.user_id)
                .map_err(|e| AppError::Internal(format!("Invalid UUID: {}", e)))?,
            display_name: row.display_name,
            role: row
                .role
                .parse()
                .map_err(|e| AppError::Internal(format!("Invalid role: {}", e)))?,
            granted_at: row.granted_at,
        })
    }
}

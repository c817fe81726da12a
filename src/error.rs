//! Error types for the application

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::governance::manager::GovernanceError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Catalog data service error: {0}")]
    Upstream(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not authorized: {0}")]
    Authorization(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Rate limited: {message}")]
    RateLimited {
        message: String,
        remaining_minutes: Option<i64>,
    },

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message, remaining_minutes) = match &self {
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error".to_string(),
                    None,
                )
            }
            AppError::Upstream(e) => {
                tracing::error!("Catalog data service error: {}", e);
                (
                    StatusCode::BAD_GATEWAY,
                    format!("Catalog data service error: {}", e),
                    None,
                )
            }
            AppError::Validation(e) => (StatusCode::BAD_REQUEST, e.clone(), None),
            AppError::Authorization(e) => (StatusCode::FORBIDDEN, e.clone(), None),
            AppError::NotFound(e) => (StatusCode::NOT_FOUND, e.clone(), None),
            AppError::Conflict(e) => (StatusCode::CONFLICT, e.clone(), None),
            AppError::RateLimited {
                message,
                remaining_minutes,
            } => (
                StatusCode::TOO_MANY_REQUESTS,
                message.clone(),
                *remaining_minutes,
            ),
            AppError::ServiceUnavailable(e) => {
                (StatusCode::SERVICE_UNAVAILABLE, e.clone(), None)
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    None,
                )
            }
        };

        let mut body = json!({ "error": message });
        if let Some(minutes) = remaining_minutes {
            body["remaining_minutes"] = json!(minutes);
        }

        (status, Json(body)).into_response()
    }
}

impl From<GovernanceError> for AppError {
    fn from(err: GovernanceError) -> Self {
        let message = err.to_string();
        match err {
            GovernanceError::InvalidIdentity(_) | GovernanceError::NotPending { .. } => {
                AppError::Validation(message)
            }
            GovernanceError::NotAuthorized | GovernanceError::OwnerRequired => {
                AppError::Authorization(message)
            }
            GovernanceError::NotFound(_) => AppError::NotFound(message),
            GovernanceError::DuplicatePending { .. }
            | GovernanceError::DuplicateVote { .. }
            | GovernanceError::UpdateInProgress => AppError::Conflict(message),
            GovernanceError::DailyCapReached
            | GovernanceError::OverlappingRequest
            | GovernanceError::DemocraticCapUsed
            | GovernanceError::ScheduledBufferActive => AppError::RateLimited {
                message,
                remaining_minutes: None,
            },
            GovernanceError::CooldownActive { remaining_minutes } => AppError::RateLimited {
                message,
                remaining_minutes: Some(remaining_minutes),
            },
            GovernanceError::QueueFull => AppError::ServiceUnavailable(message),
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

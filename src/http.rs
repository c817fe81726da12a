//! HTTP surface for the governance engine
//!
//! Handlers stay thin: parse the body, hand off to the manager, shape
//! the response. Authorization for the introspection endpoints reads
//! the caller from the `x-admin-id` header; mutating endpoints carry
//! identity in the body.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::events;
use crate::governance::manager::{SecurityStatsView, VoteStatusView};
use crate::governance::request::{RequestStatus, VoteChoice};
use crate::models::{
    ForceUpdateResponse, IdentityBody, OwnerActionResponse, PendingRequestsResponse,
    ProcessorStatsResponse, QueueActionResponse, QueueStatusResponse, RequestUpdateResponse,
    VoteBody, VoteUpdateResponse,
};
use crate::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/request-update", post(request_update))
        .route("/vote-update/:request_id", post(vote_update))
        .route("/pending-requests", get(pending_requests))
        .route("/vote-status/:request_id/:admin_id", get(vote_status))
        .route("/owner/veto-request/:request_id", post(veto_request))
        .route("/owner/approve-request/:request_id", post(approve_request))
        // Route shape that pre-dates the /owner prefix; older dashboard
        // builds still call it.
        .route("/owner-approve/:request_id", post(approve_request))
        .route("/owner/force-update", post(force_update))
        .route("/security-stats", get(security_stats))
        .route("/queue-status", get(queue_status))
        .route("/processor-stats", get(processor_stats))
        .route("/force-queue-process", post(force_queue_process))
        .route("/clear-queue", post(clear_queue))
        .route("/events", get(events::handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

fn required(field: Option<String>, name: &str) -> Result<String> {
    field.ok_or_else(|| AppError::Validation(format!("Missing field: {}", name)))
}

/// Parse the caller id from the `x-admin-id` header.
fn caller_id(state: &AppState, headers: &HeaderMap) -> Result<Uuid> {
    let raw = headers
        .get("x-admin-id")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Validation("Missing x-admin-id header".to_string()))?;
    if !state.manager.policy().validate_admin_id(raw) {
        return Err(AppError::Validation(format!(
            "Invalid admin identity: {}",
            raw
        )));
    }
    Uuid::parse_str(raw)
        .map_err(|_| AppError::Validation(format!("Invalid admin identity: {}", raw)))
}

fn require_authority(state: &AppState, headers: &HeaderMap) -> Result<Uuid> {
    let id = caller_id(state, headers)?;
    if !state.manager.gate().has_authority(&id) {
        return Err(AppError::Authorization(
            "Admin or owner role required".to_string(),
        ));
    }
    Ok(id)
}

fn require_owner(state: &AppState, headers: &HeaderMap) -> Result<Uuid> {
    let id = caller_id(state, headers)?;
    if !state.manager.gate().is_owner(&id) {
        return Err(AppError::Authorization("Owner role required".to_string()));
    }
    Ok(id)
}

async fn request_update(
    State(state): State<Arc<AppState>>,
    Json(body): Json<IdentityBody>,
) -> Result<Json<RequestUpdateResponse>> {
    let admin_id = required(body.admin_id, "admin_id")?;
    let admin_name = required(body.admin_name, "admin_name")?;

    let outcome = state
        .manager
        .request_update(&admin_id, &admin_name, Utc::now())
        .await?;

    let message = if outcome.auto_approved {
        "Owner update request approved and queued".to_string()
    } else {
        "Update request created; voting is open".to_string()
    };
    Ok(Json(RequestUpdateResponse {
        message,
        request: outcome.request,
        auto_approved: outcome.auto_approved,
        queued: outcome.queued,
    }))
}

async fn vote_update(
    State(state): State<Arc<AppState>>,
    Path(request_id): Path<String>,
    Json(body): Json<VoteBody>,
) -> Result<Json<VoteUpdateResponse>> {
    let admin_id = required(body.admin_id, "admin_id")?;
    let admin_name = required(body.admin_name, "admin_name")?;
    let choice: VoteChoice = required(body.vote, "vote")?
        .parse()
        .map_err(AppError::Validation)?;

    let outcome = state
        .manager
        .cast_vote(&request_id, &admin_id, &admin_name, choice, Utc::now())
        .await?;

    let message = match outcome.status {
        RequestStatus::Approved if outcome.queued => {
            "Vote recorded; request approved and queued".to_string()
        }
        RequestStatus::Approved => {
            "Vote recorded; request approved, waiting for queue capacity".to_string()
        }
        RequestStatus::Rejected => "Vote recorded; request rejected".to_string(),
        _ => "Vote recorded".to_string(),
    };
    Ok(Json(VoteUpdateResponse {
        message,
        request_id: outcome.request_id,
        status: outcome.status,
        tally: outcome.tally,
        queued: outcome.queued,
    }))
}

/// Open to anyone: the voting surface is the transparency story.
async fn pending_requests(
    State(state): State<Arc<AppState>>,
) -> Result<Json<PendingRequestsResponse>> {
    let requests = state.manager.pending_requests(Utc::now()).await;
    let count = requests.len();
    Ok(Json(PendingRequestsResponse { requests, count }))
}

async fn vote_status(
    State(state): State<Arc<AppState>>,
    Path((request_id, admin_id)): Path<(String, String)>,
) -> Result<Json<VoteStatusView>> {
    let view = state.manager.vote_status(&request_id, &admin_id).await?;
    Ok(Json(view))
}

async fn veto_request(
    State(state): State<Arc<AppState>>,
    Path(request_id): Path<String>,
    Json(body): Json<IdentityBody>,
) -> Result<Json<OwnerActionResponse>> {
    let owner_id = required(body.admin_id, "admin_id")?;
    let request = state
        .manager
        .veto(&request_id, &owner_id, Utc::now())
        .await?;
    Ok(Json(OwnerActionResponse {
        message: "Request vetoed".to_string(),
        request,
    }))
}

async fn approve_request(
    State(state): State<Arc<AppState>>,
    Path(request_id): Path<String>,
    Json(body): Json<IdentityBody>,
) -> Result<Json<OwnerActionResponse>> {
    let owner_id = required(body.admin_id, "admin_id")?;
    let request = state
        .manager
        .owner_approve(&request_id, &owner_id, Utc::now())
        .await?;
    Ok(Json(OwnerActionResponse {
        message: "Request approved and queued".to_string(),
        request,
    }))
}

async fn force_update(
    State(state): State<Arc<AppState>>,
    Json(body): Json<IdentityBody>,
) -> Result<Json<ForceUpdateResponse>> {
    let owner_id = required(body.admin_id, "admin_id")?;
    let owner_name = required(body.admin_name, "admin_name")?;
    let item = state
        .manager
        .force_update(&owner_id, &owner_name, Utc::now())
        .await?;
    Ok(Json(ForceUpdateResponse {
        message: "Catalog update queued".to_string(),
        item,
    }))
}

async fn security_stats(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<SecurityStatsView>> {
    require_authority(&state, &headers)?;
    Ok(Json(state.manager.security_stats(Utc::now()).await))
}

async fn queue_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<QueueStatusResponse>> {
    require_authority(&state, &headers)?;
    Ok(Json(QueueStatusResponse {
        stats: state.queue.stats().await,
        queue: state.queue.snapshot().await,
    }))
}

async fn processor_stats(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ProcessorStatsResponse>> {
    require_authority(&state, &headers)?;
    Ok(Json(ProcessorStatsResponse {
        stats: state.processor.stats().await,
        recent: state.processor.execution_history(10).await,
        update: state.updater.status().await,
    }))
}

async fn force_queue_process(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<QueueActionResponse>> {
    let owner_id = require_owner(&state, &headers)?;
    state.queue.force_process();
    tracing::info!(owner_id = %owner_id, "Queue processing forced");
    Ok(Json(QueueActionResponse {
        message: "Queue processing triggered".to_string(),
        cleared: None,
    }))
}

async fn clear_queue(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<QueueActionResponse>> {
    let owner_id = require_owner(&state, &headers)?;
    let cleared = state.queue.clear().await;
    tracing::info!(owner_id = %owner_id, cleared, "Execution queue cleared");
    Ok(Json(QueueActionResponse {
        message: "Execution queue cleared".to_string(),
        cleared: Some(cleared),
    }))
}

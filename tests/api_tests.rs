//! API integration tests
//!
//! Drives the governance endpoints through the real router with an
//! in-memory roster. Background workers stay stopped so queue contents
//! are observable.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use chrono::{Duration as ChronoDuration, Timelike, Utc};
use serde_json::{json, Value};
use sqlx::sqlite::SqlitePoolOptions;
use tower::ServiceExt;
use uuid::Uuid;

use clearlabel::governance::{
    AdminProfile, AuthorityGate, GovernanceConfig, GovernanceManager, RequestLedger, Role,
    RoleCache,
};
use clearlabel::queue::{ExecutionProcessor, UpdateQueue};
use clearlabel::store::RoleStore;
use clearlabel::updater::CatalogUpdater;
use clearlabel::{http, AppState};

struct TestContext {
    app: Router,
    state: Arc<AppState>,
    roles: Arc<RoleCache>,
    owner: Uuid,
    admins: Vec<Uuid>,
}

/// A scheduled hour twelve hours away from now, so the owner buffer
/// never interferes unless a test configures it to.
fn far_scheduled_hour() -> u32 {
    (Utc::now().hour() + 12) % 24
}

fn setup(admin_count: usize) -> TestContext {
    setup_with(admin_count, 10, far_scheduled_hour())
}

fn setup_with(
    admin_count: usize,
    queue_capacity: usize,
    scheduled_update_hour: u32,
) -> TestContext {
    let roles = Arc::new(RoleCache::new());
    let owner = Uuid::new_v4();
    let mut profiles = vec![AdminProfile {
        user_id: owner,
        display_name: "Owner".to_string(),
        role: Role::Owner,
        granted_at: Utc::now(),
    }];
    let mut admins = Vec::new();
    for i in 0..admin_count {
        let id = Uuid::new_v4();
        admins.push(id);
        profiles.push(AdminProfile {
            user_id: id,
            display_name: format!("Admin {}", i + 1),
            role: Role::Admin,
            granted_at: Utc::now(),
        });
    }
    roles.replace_all(profiles);

    let config = GovernanceConfig {
        ttl_minutes: 10,
        cooldown_hours: 2,
        scheduled_update_hour,
        buffer_hours: 1,
    };
    let queue = Arc::new(UpdateQueue::new(queue_capacity));
    let updater = Arc::new(CatalogUpdater::new("http://127.0.0.1:9"));
    let manager = Arc::new(GovernanceManager::new(
        AuthorityGate::new(roles.clone()),
        Arc::new(RequestLedger::new(config.ttl_minutes)),
        queue.clone(),
        updater.clone(),
        config,
    ));
    let processor = ExecutionProcessor::new(queue.clone(), updater.clone(), Duration::from_secs(3600));

    let state = AppState::new(manager, queue, processor, updater);
    let app = http::router(state.clone());

    TestContext {
        app,
        state,
        roles,
        owner,
        admins,
    }
}

fn identity(id: Uuid, name: &str) -> Value {
    json!({ "admin_id": id.to_string(), "admin_name": name })
}

fn ballot(id: Uuid, name: &str, vote: &str) -> Value {
    json!({ "admin_id": id.to_string(), "admin_name": name, "vote": vote })
}

async fn split(response: axum::response::Response) -> (hyper::StatusCode, Value) {
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

async fn post_json(app: &Router, uri: &str, body: Value) -> (hyper::StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            hyper::Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(axum::body::Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    split(response).await
}

async fn get_json(app: &Router, uri: &str, caller: Option<Uuid>) -> (hyper::StatusCode, Value) {
    let mut builder = hyper::Request::builder().uri(uri);
    if let Some(id) = caller {
        builder = builder.header("x-admin-id", id.to_string());
    }
    let response = app
        .clone()
        .oneshot(builder.body(axum::body::Body::empty()).unwrap())
        .await
        .unwrap();
    split(response).await
}

async fn post_empty(app: &Router, uri: &str, caller: Uuid) -> (hyper::StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            hyper::Request::builder()
                .method("POST")
                .uri(uri)
                .header("x-admin-id", caller.to_string())
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    split(response).await
}

/// File a request as the given admin and return its id.
async fn file_request(app: &Router, admin: Uuid, name: &str) -> String {
    let (status, body) = post_json(app, "/request-update", identity(admin, name)).await;
    assert_eq!(status, hyper::StatusCode::OK);
    body["request"]["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health_endpoint() {
    let ctx = setup(1);

    let response = ctx
        .app
        .oneshot(
            hyper::Request::builder()
                .uri("/health")
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), hyper::StatusCode::OK);
}

#[tokio::test]
async fn test_request_update_rejects_unknown_and_malformed_callers() {
    let ctx = setup(2);

    let (status, _) = post_json(
        &ctx.app,
        "/request-update",
        identity(Uuid::new_v4(), "Stranger"),
    )
    .await;
    assert_eq!(status, hyper::StatusCode::FORBIDDEN);

    let (status, body) = post_json(&ctx.app, "/request-update", json!({})).await;
    assert_eq!(status, hyper::StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("admin_id"));

    let (status, _) = post_json(
        &ctx.app,
        "/request-update",
        json!({ "admin_id": "not-a-uuid", "admin_name": "Mallory" }),
    )
    .await;
    assert_eq!(status, hyper::StatusCode::BAD_REQUEST);

    // No request made it into the registry.
    let (status, body) = get_json(&ctx.app, "/pending-requests", None).await;
    assert_eq!(status, hyper::StatusCode::OK);
    assert_eq!(body["count"], 0);
}

#[tokio::test]
async fn test_admin_request_is_listed_with_tally() {
    let ctx = setup(4);

    let (status, body) = post_json(
        &ctx.app,
        "/request-update",
        identity(ctx.admins[0], "Alice"),
    )
    .await;
    assert_eq!(status, hyper::StatusCode::OK);
    assert_eq!(body["auto_approved"], false);
    assert_eq!(body["queued"], false);
    assert_eq!(body["request"]["status"], "pending");

    let (status, body) = get_json(&ctx.app, "/pending-requests", None).await;
    assert_eq!(status, hyper::StatusCode::OK);
    assert_eq!(body["count"], 1);
    let listed = &body["requests"][0];
    assert_eq!(listed["requester_name"], "Alice");
    assert_eq!(listed["tally"]["total_admins"], 4);
    assert_eq!(listed["tally"]["required_approve"], 3);
    assert_eq!(listed["tally"]["required_reject"], 2);
    let remaining = listed["expires_in_seconds"].as_i64().unwrap();
    assert!(remaining > 0 && remaining <= 600);
}

#[tokio::test]
async fn test_duplicate_pending_request_conflicts() {
    let ctx = setup(3);
    file_request(&ctx.app, ctx.admins[0], "Alice").await;

    let (status, _) = post_json(
        &ctx.app,
        "/request-update",
        identity(ctx.admins[0], "Alice"),
    )
    .await;
    assert_eq!(status, hyper::StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_daily_cap_applies_after_resolution() {
    let ctx = setup(3);
    let request_id = file_request(&ctx.app, ctx.admins[0], "Alice").await;

    // Resolve the first request so the second is stopped by the daily
    // cap rather than the overlap rule.
    let (status, _) = post_json(
        &ctx.app,
        &format!("/owner/veto-request/{}", request_id),
        identity(ctx.owner, "Owner"),
    )
    .await;
    assert_eq!(status, hyper::StatusCode::OK);

    let (status, _) = post_json(
        &ctx.app,
        "/request-update",
        identity(ctx.admins[0], "Alice"),
    )
    .await;
    assert_eq!(status, hyper::StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_owner_request_skips_voting() {
    let ctx = setup(3);

    let (status, body) = post_json(&ctx.app, "/request-update", identity(ctx.owner, "Owner")).await;
    assert_eq!(status, hyper::StatusCode::OK);
    assert_eq!(body["auto_approved"], true);
    assert_eq!(body["queued"], true);
    assert_eq!(body["request"]["status"], "approved");
    assert_eq!(body["request"]["owner_approved"], true);

    // Never visible to voters.
    let (_, body) = get_json(&ctx.app, "/pending-requests", None).await;
    assert_eq!(body["count"], 0);

    let (status, body) = get_json(&ctx.app, "/queue-status", Some(ctx.owner)).await;
    assert_eq!(status, hyper::StatusCode::OK);
    assert_eq!(body["stats"]["depth"], 1);
    assert_eq!(body["queue"][0]["kind"], "owner_request");
    assert_eq!(body["queue"][0]["bypass_democratic"], true);
}

#[tokio::test]
async fn test_owner_request_with_full_queue_is_unavailable() {
    let ctx = setup_with(3, 0, far_scheduled_hour());

    let (status, _) = post_json(&ctx.app, "/request-update", identity(ctx.owner, "Owner")).await;
    assert_eq!(status, hyper::StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_vote_validation_errors() {
    let ctx = setup(4);
    let request_id = file_request(&ctx.app, ctx.admins[0], "Alice").await;

    let (status, _) = post_json(
        &ctx.app,
        &format!("/vote-update/{}", request_id),
        ballot(ctx.admins[1], "Bob", "abstain"),
    )
    .await;
    assert_eq!(status, hyper::StatusCode::BAD_REQUEST);

    let (status, _) = post_json(
        &ctx.app,
        "/vote-update/no-such-request",
        ballot(ctx.admins[1], "Bob", "approve"),
    )
    .await;
    assert_eq!(status, hyper::StatusCode::NOT_FOUND);

    let (status, _) = post_json(
        &ctx.app,
        &format!("/vote-update/{}", request_id),
        ballot(Uuid::new_v4(), "Stranger", "approve"),
    )
    .await;
    assert_eq!(status, hyper::StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_vote_records_progress_without_resolving() {
    let ctx = setup(4);
    let request_id = file_request(&ctx.app, ctx.admins[0], "Alice").await;

    let (status, body) = post_json(
        &ctx.app,
        &format!("/vote-update/{}", request_id),
        ballot(ctx.admins[1], "Bob", "approve"),
    )
    .await;
    assert_eq!(status, hyper::StatusCode::OK);
    assert_eq!(body["status"], "pending");
    assert_eq!(body["queued"], false);
    assert_eq!(body["tally"]["approve_votes"], 1);
    assert_eq!(body["tally"]["reject_votes"], 0);
}

#[tokio::test]
async fn test_duplicate_vote_conflicts() {
    let ctx = setup(4);
    let request_id = file_request(&ctx.app, ctx.admins[0], "Alice").await;

    let uri = format!("/vote-update/{}", request_id);
    let (status, _) = post_json(&ctx.app, &uri, ballot(ctx.admins[1], "Bob", "approve")).await;
    assert_eq!(status, hyper::StatusCode::OK);

    // Same admin, opposite direction: first write wins.
    let (status, body) = post_json(&ctx.app, &uri, ballot(ctx.admins[1], "Bob", "reject")).await;
    assert_eq!(status, hyper::StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("approve"));
}

#[tokio::test]
async fn test_approval_quorum_resolves_and_queues() {
    let ctx = setup(4);
    let request_id = file_request(&ctx.app, ctx.admins[0], "Alice").await;
    let uri = format!("/vote-update/{}", request_id);

    for admin in &ctx.admins[..2] {
        let (status, body) = post_json(&ctx.app, &uri, ballot(*admin, "Voter", "approve")).await;
        assert_eq!(status, hyper::StatusCode::OK);
        assert_eq!(body["status"], "pending");
    }

    let (status, body) = post_json(&ctx.app, &uri, ballot(ctx.admins[2], "Carol", "approve")).await;
    assert_eq!(status, hyper::StatusCode::OK);
    assert_eq!(body["status"], "approved");
    assert_eq!(body["queued"], true);
    assert_eq!(body["tally"]["approve_votes"], 3);

    let (_, body) = get_json(&ctx.app, "/pending-requests", None).await;
    assert_eq!(body["count"], 0);

    let (_, body) = get_json(&ctx.app, "/queue-status", Some(ctx.owner)).await;
    assert_eq!(body["stats"]["depth"], 1);
    assert_eq!(body["queue"][0]["kind"], "democratic");
}

#[tokio::test]
async fn test_rejection_quorum_resolves() {
    let ctx = setup(4);
    let request_id = file_request(&ctx.app, ctx.admins[0], "Alice").await;
    let uri = format!("/vote-update/{}", request_id);

    let (status, body) = post_json(&ctx.app, &uri, ballot(ctx.admins[1], "Bob", "reject")).await;
    assert_eq!(status, hyper::StatusCode::OK);
    assert_eq!(body["status"], "pending");

    let (status, body) = post_json(&ctx.app, &uri, ballot(ctx.admins[2], "Carol", "reject")).await;
    assert_eq!(status, hyper::StatusCode::OK);
    assert_eq!(body["status"], "rejected");
    assert_eq!(body["queued"], false);

    // The resolved request is retained but no longer votable.
    let (status, _) = post_json(&ctx.app, &uri, ballot(ctx.admins[3], "Dave", "approve")).await;
    assert_eq!(status, hyper::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_vote_status_reports_ballots() {
    let ctx = setup(4);
    let request_id = file_request(&ctx.app, ctx.admins[0], "Alice").await;
    let uri = format!("/vote-update/{}", request_id);
    post_json(&ctx.app, &uri, ballot(ctx.admins[1], "Bob", "approve")).await;

    let (status, body) = get_json(
        &ctx.app,
        &format!("/vote-status/{}/{}", request_id, ctx.admins[1]),
        None,
    )
    .await;
    assert_eq!(status, hyper::StatusCode::OK);
    assert_eq!(body["has_voted"], true);
    assert_eq!(body["vote"], "approve");
    assert_eq!(body["approve_votes"], 1);

    let (status, body) = get_json(
        &ctx.app,
        &format!("/vote-status/{}/{}", request_id, ctx.admins[2]),
        None,
    )
    .await;
    assert_eq!(status, hyper::StatusCode::OK);
    assert_eq!(body["has_voted"], false);

    let (status, _) = get_json(
        &ctx.app,
        &format!("/vote-status/{}/{}", request_id, Uuid::new_v4()),
        None,
    )
    .await;
    assert_eq!(status, hyper::StatusCode::FORBIDDEN);

    let (status, _) = get_json(
        &ctx.app,
        &format!("/vote-status/no-such-request/{}", ctx.admins[1]),
        None,
    )
    .await;
    assert_eq!(status, hyper::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_owner_veto() {
    let ctx = setup(3);
    let request_id = file_request(&ctx.app, ctx.admins[0], "Alice").await;
    let uri = format!("/owner/veto-request/{}", request_id);

    let (status, _) = post_json(&ctx.app, &uri, identity(ctx.admins[1], "Bob")).await;
    assert_eq!(status, hyper::StatusCode::FORBIDDEN);

    let (status, body) = post_json(&ctx.app, &uri, identity(ctx.owner, "Owner")).await;
    assert_eq!(status, hyper::StatusCode::OK);
    assert_eq!(body["request"]["status"], "rejected");

    // Already resolved.
    let (status, _) = post_json(&ctx.app, &uri, identity(ctx.owner, "Owner")).await;
    assert_eq!(status, hyper::StatusCode::BAD_REQUEST);

    let (status, _) = post_json(
        &ctx.app,
        "/owner/veto-request/no-such-request",
        identity(ctx.owner, "Owner"),
    )
    .await;
    assert_eq!(status, hyper::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_owner_approve_on_both_routes() {
    let ctx = setup(3);
    let first = file_request(&ctx.app, ctx.admins[0], "Alice").await;
    let second = file_request(&ctx.app, ctx.admins[1], "Bob").await;

    let (status, body) = post_json(
        &ctx.app,
        &format!("/owner/approve-request/{}", first),
        identity(ctx.owner, "Owner"),
    )
    .await;
    assert_eq!(status, hyper::StatusCode::OK);
    assert_eq!(body["request"]["status"], "approved");

    // Pre-prefix route shape, kept for older dashboard builds.
    let (status, body) = post_json(
        &ctx.app,
        &format!("/owner-approve/{}", second),
        identity(ctx.owner, "Owner"),
    )
    .await;
    assert_eq!(status, hyper::StatusCode::OK);
    assert_eq!(body["request"]["status"], "approved");

    let (_, body) = get_json(&ctx.app, "/queue-status", Some(ctx.owner)).await;
    assert_eq!(body["stats"]["depth"], 2);
}

#[tokio::test]
async fn test_owner_approve_cooldown_reports_remaining_minutes() {
    let ctx = setup(3);
    let request_id = file_request(&ctx.app, ctx.admins[0], "Alice").await;

    // An update ran half an hour ago; the two-hour cooldown is active.
    ctx.state
        .updater
        .mark_updated_at(Utc::now() - ChronoDuration::minutes(30))
        .await;

    let (status, body) = post_json(
        &ctx.app,
        &format!("/owner/approve-request/{}", request_id),
        identity(ctx.owner, "Owner"),
    )
    .await;
    assert_eq!(status, hyper::StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["remaining_minutes"], 90);

    // The request is untouched by the failed approval.
    let (_, body) = get_json(&ctx.app, "/pending-requests", None).await;
    assert_eq!(body["count"], 1);
}

#[tokio::test]
async fn test_owner_approve_blocked_near_scheduled_run() {
    // Scheduled hour set to now: inside the buffer by construction.
    let ctx = setup_with(3, 10, Utc::now().hour());
    let request_id = file_request(&ctx.app, ctx.admins[0], "Alice").await;

    let (status, body) = post_json(
        &ctx.app,
        &format!("/owner/approve-request/{}", request_id),
        identity(ctx.owner, "Owner"),
    )
    .await;
    assert_eq!(status, hyper::StatusCode::TOO_MANY_REQUESTS);
    assert!(body.get("remaining_minutes").is_none());

    // Veto ignores the buffer.
    let (status, _) = post_json(
        &ctx.app,
        &format!("/owner/veto-request/{}", request_id),
        identity(ctx.owner, "Owner"),
    )
    .await;
    assert_eq!(status, hyper::StatusCode::OK);
}

#[tokio::test]
async fn test_owner_approve_with_full_queue_leaves_request_pending() {
    let ctx = setup_with(3, 0, far_scheduled_hour());
    let request_id = file_request(&ctx.app, ctx.admins[0], "Alice").await;

    let (status, _) = post_json(
        &ctx.app,
        &format!("/owner/approve-request/{}", request_id),
        identity(ctx.owner, "Owner"),
    )
    .await;
    assert_eq!(status, hyper::StatusCode::SERVICE_UNAVAILABLE);

    // Rolled back: still pending and votable.
    let (status, body) = get_json(
        &ctx.app,
        &format!("/vote-status/{}/{}", request_id, ctx.admins[0]),
        None,
    )
    .await;
    assert_eq!(status, hyper::StatusCode::OK);
    assert_eq!(body["status"], "pending");
}

#[tokio::test]
async fn test_force_update_is_owner_only() {
    let ctx = setup(3);

    let (status, _) = post_json(
        &ctx.app,
        "/owner/force-update",
        identity(ctx.admins[0], "Alice"),
    )
    .await;
    assert_eq!(status, hyper::StatusCode::FORBIDDEN);

    let (status, body) = post_json(&ctx.app, "/owner/force-update", identity(ctx.owner, "Owner")).await;
    assert_eq!(status, hyper::StatusCode::OK);
    assert_eq!(body["item"]["kind"], "forced");
    assert_eq!(body["item"]["owner_initiated"], true);
}

#[tokio::test]
async fn test_security_stats_requires_a_caller() {
    let ctx = setup(4);
    file_request(&ctx.app, ctx.admins[0], "Alice").await;

    let (status, _) = get_json(&ctx.app, "/security-stats", None).await;
    assert_eq!(status, hyper::StatusCode::BAD_REQUEST);

    let (status, _) = get_json(&ctx.app, "/security-stats", Some(Uuid::new_v4())).await;
    assert_eq!(status, hyper::StatusCode::FORBIDDEN);

    let (status, body) = get_json(&ctx.app, "/security-stats", Some(ctx.admins[1])).await;
    assert_eq!(status, hyper::StatusCode::OK);
    assert_eq!(body["total_admins"], 4);
    assert_eq!(body["pending_requests"], 1);
    assert_eq!(body["total_requests_today"], 1);
    assert_eq!(body["democratic_update_used_today"], false);
    // Roster lists voting admins; the owner is not on the ballot.
    assert_eq!(body["admin_roster"].as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn test_processor_stats_shape() {
    let ctx = setup(2);

    let (status, body) = get_json(&ctx.app, "/processor-stats", Some(ctx.admins[0])).await;
    assert_eq!(status, hyper::StatusCode::OK);
    assert_eq!(body["stats"]["total_executed"], 0);
    assert_eq!(body["update"]["is_updating"], false);
    assert!(body["recent"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_queue_controls_are_owner_only() {
    let ctx = setup(2);

    let (status, _) = post_empty(&ctx.app, "/force-queue-process", ctx.admins[0]).await;
    assert_eq!(status, hyper::StatusCode::FORBIDDEN);

    let (status, _) = post_empty(&ctx.app, "/force-queue-process", ctx.owner).await;
    assert_eq!(status, hyper::StatusCode::OK);

    // Queue one forced update, then clear it.
    post_json(&ctx.app, "/owner/force-update", identity(ctx.owner, "Owner")).await;

    let (status, _) = post_empty(&ctx.app, "/clear-queue", ctx.admins[0]).await;
    assert_eq!(status, hyper::StatusCode::FORBIDDEN);

    let (status, body) = post_empty(&ctx.app, "/clear-queue", ctx.owner).await;
    assert_eq!(status, hyper::StatusCode::OK);
    assert_eq!(body["cleared"], 1);

    let (_, body) = get_json(&ctx.app, "/queue-status", Some(ctx.owner)).await;
    assert_eq!(body["stats"]["depth"], 0);
}

#[tokio::test]
async fn test_roles_loaded_from_store_feed_the_gate() {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");

    // Run migrations manually
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS user_roles (
            user_id TEXT PRIMARY KEY NOT NULL,
            display_name TEXT NOT NULL,
            role TEXT NOT NULL CHECK (role IN ('admin', 'owner')),
            granted_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(&pool)
    .await
    .expect("Failed to create user_roles table");

    let store = RoleStore::new(pool);
    let admin = AdminProfile {
        user_id: Uuid::new_v4(),
        display_name: "Dana".to_string(),
        role: Role::Admin,
        granted_at: Utc::now(),
    };
    store.upsert(&admin).await.unwrap();

    let ctx = setup(0);
    ctx.roles.replace_all(store.load_all().await.unwrap());

    let (status, body) = post_json(&ctx.app, "/request-update", identity(admin.user_id, "Dana")).await;
    assert_eq!(status, hyper::StatusCode::OK);
    assert_eq!(body["request"]["status"], "pending");
}

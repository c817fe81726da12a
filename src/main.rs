//! ClearLabel server - governed catalog updates for supplement transparency

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use sqlx::sqlite::SqlitePoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use clearlabel::config::ServerConfig;
use clearlabel::governance::{
    AdminProfile, AuthorityGate, CleanupScheduler, GovernanceManager, RequestLedger, Role,
    RoleCache,
};
use clearlabel::queue::{ExecutionProcessor, UpdateQueue};
use clearlabel::store::RoleStore;
use clearlabel::updater::CatalogUpdater;
use clearlabel::{http, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "clearlabel=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::parse();

    // Database connection
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;

    // Run migrations
    sqlx::migrate!("./migrations").run(&pool).await?;

    let role_store = RoleStore::new(pool);

    // Seed the owner on first boot when configured
    if let Some(owner_id) = config.owner_id {
        role_store
            .upsert(&AdminProfile {
                user_id: owner_id,
                display_name: config.owner_name.clone(),
                role: Role::Owner,
                granted_at: chrono::Utc::now(),
            })
            .await?;
        tracing::info!(owner_id = %owner_id, "Owner role seeded");
    }

    let roles = Arc::new(RoleCache::new());
    roles.replace_all(role_store.load_all().await?);
    tracing::info!(roles = roles.len(), "Role cache loaded");

    let queue = Arc::new(UpdateQueue::new(config.queue_capacity));
    let updater = Arc::new(CatalogUpdater::new(config.catalog_service_url.clone()));
    let manager = Arc::new(GovernanceManager::new(
        AuthorityGate::new(roles.clone()),
        Arc::new(RequestLedger::new(config.request_ttl_minutes)),
        queue.clone(),
        updater.clone(),
        config.governance(),
    ));

    let processor = ExecutionProcessor::new(
        queue.clone(),
        updater.clone(),
        Duration::from_secs(config.poll_interval_secs),
    );
    let processor_task = processor.start();

    let scheduler = Arc::new(CleanupScheduler::new(
        manager.clone(),
        Duration::from_secs(config.sweep_interval_secs),
    ));
    let scheduler_task = scheduler.start();

    // Reload roles from the platform database in the background
    {
        let roles = roles.clone();
        let role_store = role_store.clone();
        let every = Duration::from_secs(config.role_refresh_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match role_store.load_all().await {
                    Ok(profiles) => roles.replace_all(profiles),
                    Err(e) => tracing::warn!("Role refresh failed: {}", e),
                }
            }
        });
    }

    let state = AppState::new(manager, queue.clone(), processor, updater);
    let app = http::router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    tracing::info!("Server listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Stop background workers: cancel any pending sweep timer, then let
    // the processor drain out
    scheduler.shutdown();
    queue.shutdown();
    let _ = scheduler_task.await;
    let _ = processor_task.await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("Shutdown signal received");
}

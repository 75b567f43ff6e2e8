use anyhow::{Context, Result};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ferry_scheduler::api::{self, AppState};
use ferry_scheduler::config::Config;
use ferry_scheduler::db;
use ferry_scheduler::repository::{PgStore, Store};
use ferry_scheduler::service::reaper;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ferry_scheduler=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Ferry Scheduler...");

    let config = Config::from_env();
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    tracing::info!("Connecting to database...");

    let pool = db::create_pool(&config.database_url)
        .await
        .context("Failed to create database pool")?;

    tracing::info!("Database connection pool created");

    db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;

    let store: Arc<dyn Store> = Arc::new(PgStore::new(pool));

    tracing::info!(
        "Reclaiming jobs silent for more than {:?}, sweeping every {:?}",
        config.maximum_heartbeat_interval,
        config.reaper_interval
    );
    let _reaper = reaper::spawn_reaper(
        Arc::clone(&store),
        config.reaper_interval,
        config.maximum_heartbeat_interval,
    );

    let addr = config.bind_addr.clone();
    let app = api::create_router(AppState::new(store, config));

    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .await
        .context("Failed to start server")?;

    Ok(())
}

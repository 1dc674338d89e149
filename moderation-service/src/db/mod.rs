//! Pool setup and schema migrations for the PostgreSQL moderation store.
//!
//! The schema (users, roles, permissions, their join tables, posts,
//! post_history, reports and audit_logs) lives in `migrations/` and is
//! applied at startup before the router is built.

use crate::config::DatabaseConfig;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    tracing::info!(
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        acquire_timeout_seconds = config.acquire_timeout_seconds,
        "Opening moderation store pool"
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_seconds))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(&config.url)
        .await?;

    tracing::info!(idle = pool.num_idle(), "Moderation store pool ready");

    Ok(pool)
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    let migrator = sqlx::migrate!("./migrations");
    tracing::info!(
        known = migrator.iter().count(),
        "Applying moderation schema migrations"
    );
    migrator.run(pool).await?;
    tracing::info!("Moderation schema is up to date");
    Ok(())
}

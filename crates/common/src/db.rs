use std::time::Duration;

use sqlx::PgPool;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;

/// Embedded schema migrations for the notification outbox.
pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

/// Open the outbox database pool and bring its schema up to date.
///
/// `max_connections` is `AppConfig::db_max_connections`. The worker holds at
/// most one connection per statement, so the pool is mostly sized for the API.
pub async fn connect_and_migrate(database_url: &str, max_connections: u32) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await?;
    tracing::info!(max_connections, "Connected to PostgreSQL");

    MIGRATOR.run(&pool).await?;
    tracing::info!("Outbox migrations applied");

    Ok(pool)
}

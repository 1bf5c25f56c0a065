//! Connection pool for the run state store.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::config::DatabaseConfig;
use crate::error::StoreResult;

pub type DbPool = PgPool;

/// Open a pool against the configured database.
pub async fn create_pool(config: &DatabaseConfig) -> StoreResult<DbPool> {
    let options = config.connect_options()?;

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.acquire_timeout())
        .connect_with(options)
        .await?;

    tracing::info!(
        target_db = %config.display_target(),
        max_connections = config.max_connections,
        "Database pool ready"
    );

    Ok(pool)
}

/// Round-trip to the database.
pub async fn health_check(pool: &DbPool) -> StoreResult<()> {
    sqlx::query_scalar::<_, i32>("SELECT 1").fetch_one(pool).await?;
    Ok(())
}

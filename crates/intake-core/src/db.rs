use std::time::Duration;

use sqlx::{postgres::PgPoolOptions, Pool, Postgres};
use tracing::info;

use crate::error::StoreError;

pub type DbPool = Pool<Postgres>;

/// The upload lock pins one connection for the whole upload; the lock holder
/// needs at least one more to stage and dispatch.
pub const MIN_CONNECTIONS: u32 = 2;

/// Establish a Postgres connection pool for the intake services.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<DbPool, StoreError> {
    let max_connections = max_connections.max(MIN_CONNECTIONS);
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url)
        .await?;
    info!(max_connections, "database connection pool established");
    Ok(pool)
}

/// Run the migrations embedded at compile time.
pub async fn run_migrations(pool: &DbPool) -> Result<(), StoreError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

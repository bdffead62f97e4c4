//! Database initialization and migration runner.
//!
//! SYSTEM CONTEXT
//! ==============
//! Startup uses this module to create the shared SQLx pool and enforce schema
//! migrations before accepting API or websocket traffic.

use std::time::Duration;

use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{Connection, PgConnection, PgPool};

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("connect failed: {0}")]
    Connect(#[from] sqlx::Error),
    #[error("connect timed out after {0:?}")]
    Timeout(Duration),
    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

/// SQL expression rendering a `timestamptz` column as RFC 3339 UTC text.
pub(crate) fn rfc3339(column: &str) -> String {
    format!(r#"to_char({column} AT TIME ZONE 'UTC', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS {column}"#)
}

/// Initialize the `PostgreSQL` connection pool and run migrations.
///
/// One connection attempt, bounded by `connect_timeout`, proves the
/// database is reachable. A refused or failed attempt is reported as is;
/// there is no retry.
///
/// # Errors
///
/// Returns an error if the URL is invalid, the connection or migrations
/// fail, or the attempt times out.
pub async fn init_pool(database_url: &str, max_connections: u32, connect_timeout: Duration) -> Result<PgPool, DbError> {
    let options: PgConnectOptions = database_url.parse()?;

    let first = tokio::time::timeout(connect_timeout, PgConnection::connect_with(&options))
        .await
        .map_err(|_| DbError::Timeout(connect_timeout))??;
    first.close().await?;

    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(connect_timeout)
        .connect_lazy_with(options);

    sqlx::migrate!("src/db/migrations").run(&pool).await?;

    Ok(pool)
}

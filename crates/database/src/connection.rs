use crate::error::DbError;
use sqlx::{PgPool, postgres::PgPoolOptions};
use std::time::Duration;

/// Establishes a connection pool to the PostgreSQL database.
///
/// The pool can be shared across the entire application for concurrent
/// database access. `acquire_timeout` bounds how long any single operation
/// waits for a connection before failing with a transient error.
pub async fn connect(database_url: &str, acquire_timeout: Duration) -> Result<PgPool, DbError> {
    if database_url.is_empty() {
        return Err(DbError::ConnectionConfigError(
            "DATABASE_URL must be set.".to_string(),
        ));
    }

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(acquire_timeout)
        .connect(database_url)
        .await?;

    Ok(pool)
}

/// Applies the embedded migrations, ensuring the schema is up-to-date when
/// the application starts.
pub async fn run_migrations(pool: &PgPool) -> Result<(), DbError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

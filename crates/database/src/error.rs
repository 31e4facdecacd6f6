use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Invalid database configuration: {0}")]
    ConnectionConfigError(String),

    #[error("Database query failed: {0}")]
    Query(#[from] sqlx::Error),

    #[error("Database migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("An error occurred during JSON serialization/deserialization: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Stored data could not be decoded: {0}")]
    Corrupt(String),

    #[error("The store is unavailable: {0}")]
    Unavailable(String),

    #[error("The requested data was not found in the database.")]
    NotFound,
}

impl DbError {
    /// Whether retrying the same operation later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            DbError::Unavailable(_) => true,
            DbError::Query(e) => matches!(
                e,
                sqlx::Error::Io(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::Tls(_)
                    | sqlx::Error::WorkerCrashed
            ),
            _ => false,
        }
    }
}

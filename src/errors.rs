/// Run-level errors.
///
/// Per-ward provider failures and per-chunk write failures are recovered
/// locally and folded into the run summary; only the variants below ever
/// abort a run.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Ward source error: {0}")]
    WardSource(String),

    #[error("External service error: {0}")]
    ExternalService(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<sqlx::migrate::MigrateError> for SyncError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        SyncError::Internal(format!("Migration error: {}", err))
    }
}

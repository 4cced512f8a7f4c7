//! Application-wide error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Wallet resolution failed: {0}")]
    Resolution(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Grant request failed: {0}")]
    GrantRequest(String),

    #[error("Duplicate completion hash: {0}")]
    DuplicateCompletion(String),

    #[error("Missing request parameter: {0}")]
    MissingParameters(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;

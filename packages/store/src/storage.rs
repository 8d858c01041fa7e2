// ABOUTME: Shared storage error types for the persistence layer
// ABOUTME: Covers infrastructure failures and the selection pipeline taxonomy

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Database error: {0}")]
    Database(String),
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("Sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Archive error: {0}")]
    Archive(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("you do not have access to this resource")]
    Forbidden,
    #[error("{0}")]
    InvalidState(String),
    #[error("selection is missing required modules: {}", missing.join(", "))]
    IncompleteSelection { missing: Vec<String> },
    #[error("download link is invalid or expired")]
    Expired,
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
    #[error("duplicate {0}")]
    Duplicate(&'static str),
}

pub type StorageResult<T> = Result<T, StorageError>;

impl StorageError {
    /// True when the sqlx error is a SQLite UNIQUE constraint violation.
    pub fn is_unique_violation(err: &sqlx::Error) -> bool {
        match err {
            sqlx::Error::Database(db) => matches!(db.code().as_deref(), Some("2067") | Some("1555")),
            _ => false,
        }
    }
}

//! Storage-layer errors: one `thiserror` enum, `#[from]` conversions from
//! the underlying driver.

use league_protocol::LeagueError;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("league not found: {0}")]
    LeagueNotFound(String),

    #[error("duplicate id: {0}")]
    DuplicateId(String),

    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("result conflicts with a previously accepted report")]
    ResultConflict,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<StorageError> for LeagueError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::LeagueNotFound(id) => LeagueError::PreconditionFailed(format!("no such league: {id}")),
            StorageError::DuplicateId(id) => LeagueError::DuplicateId(id),
            StorageError::PreconditionFailed(msg) => LeagueError::PreconditionFailed(msg),
            StorageError::ResultConflict => LeagueError::ResultConflict,
            StorageError::Database(e) => LeagueError::Internal(format!("database error: {e}")),
            StorageError::Migration(e) => LeagueError::Internal(format!("migration error: {e}")),
            StorageError::Serialization(e) => LeagueError::Internal(format!("serialization error: {e}")),
        }
    }
}

//! Error types for the cohort-board crate.
//!
//! All board operations return [`BoardError`] via [`BoardResult`].

use thiserror::Error;

/// Alias for `Result<T, BoardError>`.
pub type BoardResult<T> = Result<T, BoardError>;

/// Errors that can occur in the task board.
#[derive(Debug, Error)]
pub enum BoardError {
    /// SQLite operation failed.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The requested item was not found.
    #[error("board item not found: {id}")]
    NotFound { id: String },

    /// An invalid argument was provided to a board operation.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Creating the board directory failed.
    #[error("board directory error: {0}")]
    Io(#[from] std::io::Error),

    /// A blocking task was cancelled or panicked.
    #[error("background task failed: {0}")]
    TaskJoin(String),
}

impl From<tokio::task::JoinError> for BoardError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::TaskJoin(err.to_string())
    }
}

//! Typed failures for the storage-and-search core.

use std::path::PathBuf;

use thiserror::Error;

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, ContextError>;

#[derive(Error, Debug)]
pub enum ContextError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("unknown table: {0}")]
    UnknownTable(String),
    #[error("database not found at {}", .0.display())]
    DatabaseNotFound(PathBuf),
    #[error("migration to schema v{version} failed: {source}")]
    Migration {
        version: u32,
        #[source]
        source: rusqlite::Error,
    },
    #[error("database schema v{found} is newer than this binary supports (v{expected})")]
    SchemaNewer { found: u32, expected: u32 },
}

impl ContextError {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// True when the failure came from lock contention and the caller may retry.
    pub fn is_transient(&self) -> bool {
        let err = match self {
            Self::Database(e) => e,
            Self::Migration { source, .. } => source,
            _ => return false,
        };
        matches!(
            err.sqlite_error_code(),
            Some(rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked)
        )
    }
}

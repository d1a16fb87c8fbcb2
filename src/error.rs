//! Error types for database access operations

use thiserror::Error;

/// Errors that can occur while connecting, migrating, querying or materializing rows
#[derive(Debug, Error)]
pub enum OrmError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Migration '{name}' failed: {source}")]
    Migration {
        /// File name of the migration that failed
        name: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Failed to read migrations at '{path}': {source}")]
    MigrationIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Query error: {0}")]
    Query(#[from] sqlx::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Row shape mismatch: {0}")]
    ShapeMismatch(#[source] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl OrmError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    pub(crate) fn migration(name: impl Into<String>, source: sqlx::Error) -> Self {
        Self::Migration {
            name: name.into(),
            source,
        }
    }

    pub(crate) fn migration_io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::MigrationIo {
            path: path.display().to_string(),
            source,
        }
    }

    /// Whether this error means a single-record fetch matched no rows
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, OrmError>;

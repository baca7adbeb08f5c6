//! Migration-specific error types

use crate::error::StoreError;

/// Migration-specific errors
#[derive(Debug)]
pub enum MigrationError {
    /// Database execution error
    Database(StoreError),
    /// Two registered migrations share a version
    DuplicateVersion(i64),
    /// Migration failed during execution
    ExecutionFailed {
        version: i64,
        name: String,
        error: String,
    },
}

impl std::fmt::Display for MigrationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MigrationError::Database(e) => write!(f, "Database error: {e}"),
            MigrationError::DuplicateVersion(version) => {
                write!(f, "Duplicate migration version {version}")
            }
            MigrationError::ExecutionFailed {
                version,
                name,
                error,
            } => write!(f, "Migration {version} ({name}) failed: {error}"),
        }
    }
}

impl std::error::Error for MigrationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MigrationError::Database(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for MigrationError {
    fn from(err: StoreError) -> Self {
        MigrationError::Database(err)
    }
}

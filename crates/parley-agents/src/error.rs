//! Error types for reference data and the fraud case store.

use parley_core::{DialogueError, PersistenceError};
use parley_types::CaseStatus;

/// Errors raised while loading reference data.
#[derive(Debug, thiserror::Error)]
pub enum ReferenceDataError {
    /// The reference file could not be read.
    #[error("failed to read reference data {path}: {source}")]
    Read {
        /// Path that was read.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The document is not valid JSON for the expected shape.
    #[error("failed to parse reference data {name}: {source}")]
    Parse {
        /// File name or built-in data set name.
        name: String,
        /// Underlying parse error.
        source: serde_json::Error,
    },

    /// The document parsed but is internally inconsistent.
    #[error("invalid reference data {name}: {reason}")]
    Invalid {
        /// File name or built-in data set name.
        name: String,
        /// What is wrong.
        reason: String,
    },
}

/// Errors that can occur in fraud case store operations.
#[derive(Debug, thiserror::Error)]
pub enum FraudStoreError {
    /// A database operation failed.
    #[error("fraud store database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// No pooled connection was available.
    #[error("fraud store pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// No case with this id exists.
    #[error("fraud case not found: {0}")]
    NotFound(String),

    /// The case was already resolved, possibly by another session.
    #[error("fraud case {case_id} is already {status}")]
    AlreadyResolved {
        /// Case id of the resolved row.
        case_id: String,
        /// Status it was resolved to.
        status: CaseStatus,
    },

    /// A stored status value is not recognised.
    #[error("fraud case {case_id} has unknown status {status}")]
    InvalidStatus {
        /// Case id of the offending row.
        case_id: String,
        /// The stored value.
        status: String,
    },
}

impl From<FraudStoreError> for DialogueError {
    fn from(err: FraudStoreError) -> Self {
        DialogueError::Storage(err.to_string())
    }
}

impl From<FraudStoreError> for PersistenceError {
    fn from(err: FraudStoreError) -> Self {
        match err {
            FraudStoreError::Database(e) => PersistenceError::Database(e),
            FraudStoreError::Pool(e) => PersistenceError::Pool(e),
            other => PersistenceError::Rejected(other.to_string()),
        }
    }
}

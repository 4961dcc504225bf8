//! Error taxonomy for the repository core.
//!
//! Every checkpoint in the service layer fails with one of the variants of
//! [`RepositoryError`]. Persistence failures come in as [`StoreError`] and are
//! mapped onto the same taxonomy.

use thiserror::Error;

use crate::storage::StoreError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    /// Object, type, version series or repository absent.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Required permission missing from the effective ACL.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// A type or state rule was violated.
    #[error("Constraint violation [{id}]: {message}")]
    Constraint { id: String, message: String },

    /// The supplied revision token does not match the stored one.
    #[error("Update conflict [{id}]: {message}")]
    UpdateConflict { id: String, message: String },

    /// A required input was missing or malformed.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The backing store failed for a reason other than a missing object.
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RepositoryError {
    pub fn constraint(id: impl Into<String>, message: impl Into<String>) -> Self {
        RepositoryError::Constraint {
            id: id.into(),
            message: message.into(),
        }
    }

    pub fn update_conflict(id: impl Into<String>, message: impl Into<String>) -> Self {
        RepositoryError::UpdateConflict {
            id: id.into(),
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RepositoryError::NotFound(_))
    }
}

impl From<StoreError> for RepositoryError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => RepositoryError::NotFound(what),
            StoreError::Conflict(id) => {
                RepositoryError::update_conflict(id, "the stored revision changed concurrently")
            }
            StoreError::Io(msg) => RepositoryError::Storage(msg),
        }
    }
}

/// Result type for repository operations
pub type RepositoryResult<T> = Result<T, RepositoryError>;

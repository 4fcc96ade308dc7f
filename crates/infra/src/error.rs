//! Infrastructure error types.
//!
//! `StoreError` covers storage failures. `OperationError` is what the engines
//! return: either a domain rule was violated or the store failed. Both
//! convert with `?`.

use thiserror::Error;

use storekeep_core::DomainError;

/// Storage operation error.
///
/// These are infrastructure errors (missing rows, constraint violations,
/// connectivity) as opposed to domain errors (validation, invariants).
#[derive(Debug, Error)]
pub enum StoreError {
    /// The row being locked or updated does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Unique or foreign-key constraint rejected the write.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Backend failure (connection, serialization, unexpected data).
    #[error("storage backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Error returned by the mutating engines and the query surface.
#[derive(Debug, Error)]
pub enum OperationError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl OperationError {
    /// `true` when the failure is a missing record, whichever layer saw it.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            OperationError::Domain(DomainError::NotFound(_)) | OperationError::Store(StoreError::NotFound(_))
        )
    }

    /// `true` for insufficient stock.
    pub fn is_insufficient_stock(&self) -> bool {
        matches!(self, OperationError::Domain(DomainError::InsufficientStock { .. }))
    }
}

pub type OperationResult<T> = Result<T, OperationError>;

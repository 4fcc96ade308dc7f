//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Every variant names the constraint that was violated so callers can show
/// it to the user and correct the request in place. Infrastructure concerns
/// belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Malformed or missing input. Raised before any lock is taken.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A referenced item, request, category or approver does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The operation would drive an item's quantity below zero.
    #[error("insufficient stock for {item}: requested {requested}, only {available} available")]
    InsufficientStock {
        item: String,
        requested: i64,
        available: i64,
    },

    /// The operation is not legal for the request's current status.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The actor is not allowed to take this step.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Uniqueness or referential-integrity conflict.
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn insufficient_stock(item: impl Into<String>, requested: i64, available: i64) -> Self {
        Self::InsufficientStock {
            item: item.into(),
            requested,
            available,
        }
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }
}

//! Synchronous error surface of the orchestration API.
//!
//! Trainer and pipeline failures never appear here: they are recorded on
//! the affected entity and published as events instead.

use thiserror::Error;

/// Errors returned synchronously by orchestration-API operations.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed input: unknown enum value, empty reference, out-of-range limit.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The referenced job or dataset does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The operation is not permitted in the entity's current state.
    #[error("state conflict: {0}")]
    StateConflict(String),

    /// Submission rejected because shutdown has begun.
    #[error("orchestrator is shutting down")]
    ShuttingDown,
}

impl ApiError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn state_conflict(msg: impl Into<String>) -> Self {
        Self::StateConflict(msg.into())
    }
}

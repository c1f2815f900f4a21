//! Crate-wide error types.

use thiserror::Error;

/// Result type used across the core.
pub type CoreResult<T> = Result<T, CoreError>;

/// Error categories propagated to callers, mirroring §7 of the design.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("state conflict: {0}")]
    Conflict(String),

    #[error("transient external error: {0}")]
    Transient(String),

    #[error("policy blocked: {0}")]
    PolicyBlocked(String),

    #[error("cancelled")]
    Cancelled,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("internal invariant violation: {0}")]
    Internal(String),
}

impl From<sled::Error> for CoreError {
    fn from(err: sled::Error) -> Self {
        CoreError::Internal(format!("storage error: {err}"))
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Internal(format!("serialization error: {err}"))
    }
}

/// Sum type returned by every external adapter (§4.9), kept separate from
/// `CoreError` so task handlers decide retry/dead-letter/block policy
/// explicitly rather than inheriting persistence-layer semantics.
#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("transient: {0}")]
    Transient(String),

    #[error("permanent: {0}")]
    Permanent(String),

    #[error("policy blocked: {0}")]
    PolicyBlocked(String),
}

impl From<AdapterError> for CoreError {
    fn from(err: AdapterError) -> Self {
        match err {
            AdapterError::Transient(m) => CoreError::Transient(m),
            AdapterError::Permanent(m) => CoreError::Internal(m),
            AdapterError::PolicyBlocked(m) => CoreError::PolicyBlocked(m),
        }
    }
}

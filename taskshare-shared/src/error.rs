/// Core error taxonomy
///
/// Every operation exposed to the HTTP shell returns [`CoreError`]:
///
/// - **NotFound**: task, user, subtask or invite absent. Not retried.
/// - **Forbidden**: actor lacks the required role or status. Never reported
///   as NotFound.
/// - **Conflict**: would break a uniqueness invariant; the document is left
///   unchanged.
/// - **InvalidInput**: malformed input, including an index query that does
///   not parse.
/// - **InvalidCredentials**: unknown email or wrong password at login.
/// - **StoreUnavailable**: the backing store failed. Idempotent reads may be
///   retried; appends must not be retried blindly.
use crate::store::StoreError;
use thiserror::Error;

/// Result alias for core operations
pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
}

impl CoreError {
    pub fn not_found(what: impl Into<String>) -> Self {
        CoreError::NotFound(what.into())
    }

    pub fn forbidden(reason: impl Into<String>) -> Self {
        CoreError::Forbidden(reason.into())
    }

    pub fn conflict(reason: impl Into<String>) -> Self {
        CoreError::Conflict(reason.into())
    }
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::KeyNotFound(key) => CoreError::NotFound(key),
            StoreError::PathNotFound { key, path } => {
                CoreError::NotFound(format!("{} at {}", path, key))
            }
            StoreError::Unavailable(msg) => CoreError::StoreUnavailable(msg),
            StoreError::Query(msg) => CoreError::InvalidInput(msg),
            other => CoreError::StoreUnavailable(other.to_string()),
        }
    }
}

//! Application-wide error types.
//!
//! Every module in the core owns its own `thiserror` enum. Those enums classify
//! themselves into an [`ErrorKind`] through [`DomainError`], and the transport layer only
//! ever sees [`AppError`].

use thiserror::Error;

/// Result type alias using `AppError`.
pub type AppResult<T> = Result<T, AppError>;

/// Coarse classification shared by all domain errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Entity absent.
    NotFound,
    /// Malformed or out-of-range input.
    Validation,
    /// Version mismatch, duplicate key, or a guarded delete.
    Conflict,
    /// Historical reconstruction found nothing at or before the instant.
    NoDataAtTimestamp,
    /// The caller cancelled the request or its deadline elapsed.
    Cancelled,
    /// Store, cache, or serialization failure.
    Internal,
}

/// Implemented by every module error so it can be surfaced as an [`AppError`].
pub trait DomainError: std::error::Error {
    /// Returns the error classification.
    fn kind(&self) -> ErrorKind;

    /// Returns the specific error code for API responses.
    fn error_code(&self) -> &'static str;
}

/// Application error types.
#[derive(Debug, Error)]
pub enum AppError {
    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Validation error.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Conflict (e.g., stale version, duplicate entry).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// No historical data at the requested instant.
    #[error("No data at timestamp: {0}")]
    NoDataAtTimestamp(String),

    /// Request cancelled or timed out.
    #[error("Request cancelled: {0}")]
    Cancelled(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Converts a domain error, keeping its message unless it is internal.
    ///
    /// Internal failures are logged with full detail and surfaced with a generic message.
    pub fn from_domain<E: DomainError>(err: &E) -> Self {
        let message = err.to_string();
        match err.kind() {
            ErrorKind::NotFound => Self::NotFound(message),
            ErrorKind::Validation => Self::Validation(message),
            ErrorKind::Conflict => Self::Conflict(message),
            ErrorKind::NoDataAtTimestamp => Self::NoDataAtTimestamp(message),
            ErrorKind::Cancelled => Self::Cancelled(message),
            ErrorKind::Internal => {
                tracing::error!(error = %message, code = err.error_code(), "internal failure");
                Self::Internal("internal server error".to_string())
            }
        }
    }

    /// Returns the classification of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::NoDataAtTimestamp(_) => ErrorKind::NoDataAtTimestamp,
            Self::Cancelled(_) => ErrorKind::Cancelled,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) | Self::NoDataAtTimestamp(_) => 404,
            Self::Validation(_) => 400,
            Self::Conflict(_) => 409,
            Self::Cancelled(_) => 408,
            Self::Internal(_) => 500,
        }
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Conflict(_) => "CONFLICT",
            Self::NoDataAtTimestamp(_) => "NO_DATA_AT_TIMESTAMP",
            Self::Cancelled(_) => "REQUEST_CANCELLED",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

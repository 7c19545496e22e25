//! Errors reported by collaborator stores.

use ledgerline_shared::{DomainError, ErrorKind, Interrupted};
use thiserror::Error;

/// Failure reported by a store adapter.
///
/// Adapters must report a missing row as [`StoreError::NotFound`] and never fold it into
/// [`StoreError::Backend`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The row does not exist in the addressed organization and ledger.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity name.
        entity: &'static str,
        /// Requested identifier.
        id: String,
    },

    /// The row's version moved past the one the writer expected.
    #[error("{entity} {id} was modified concurrently: expected version {expected}, found {actual}")]
    VersionConflict {
        /// Entity name.
        entity: &'static str,
        /// Row identifier.
        id: String,
        /// Version the writer expected.
        expected: i64,
        /// Version found in the store.
        actual: i64,
    },

    /// A uniqueness constraint rejected the write.
    #[error("{entity} with key '{key}' already exists")]
    Duplicate {
        /// Entity name.
        entity: &'static str,
        /// Conflicting key.
        key: String,
    },

    /// Applying the write would leave an amount outside the representable range.
    #[error("{entity} {id}: amount out of range")]
    Overflow {
        /// Entity name.
        entity: &'static str,
        /// Row identifier.
        id: String,
    },

    /// The call was abandoned before the store answered.
    #[error(transparent)]
    Interrupted(#[from] Interrupted),

    /// Transport or engine failure.
    #[error("store backend failure: {0}")]
    Backend(String),
}

impl StoreError {
    /// Create a not found error.
    #[must_use]
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Create a backend error.
    #[must_use]
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    /// Whether the error reports a missing row.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl DomainError for StoreError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::VersionConflict { .. } | Self::Duplicate { .. } => ErrorKind::Conflict,
            Self::Overflow { .. } => ErrorKind::Validation,
            Self::Interrupted(_) => ErrorKind::Cancelled,
            Self::Backend(_) => ErrorKind::Internal,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::VersionConflict { .. } => "VERSION_CONFLICT",
            Self::Duplicate { .. } => "DUPLICATE_KEY",
            Self::Overflow { .. } => "AMOUNT_OVERFLOW",
            Self::Interrupted(_) => "REQUEST_CANCELLED",
            Self::Backend(_) => "STORE_FAILURE",
        }
    }
}

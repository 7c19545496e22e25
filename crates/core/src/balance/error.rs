//! Balance manager errors.

use ledgerline_shared::types::{AccountId, BalanceId, QueryError};
use ledgerline_shared::{AppError, DomainError, ErrorKind, Interrupted};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::store::StoreError;

/// Errors that can occur during balance operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BalanceError {
    // ========== Lookup Errors ==========
    /// Balance not found.
    #[error("Balance not found: {0}")]
    NotFound(BalanceId),

    /// Balance slot not found for an alias.
    #[error("Balance not found for alias {alias} with key {key}")]
    AliasNotFound {
        /// Account alias.
        alias: String,
        /// Balance key.
        key: String,
    },

    /// Account has no default balance.
    #[error("Default balance not found for account {0}")]
    DefaultBalanceNotFound(AccountId),

    // ========== Conflict Errors ==========
    /// The balance changed since the caller last read it.
    #[error("Balance {balance_id} was modified concurrently: expected version {expected}, found {actual}")]
    VersionConflict {
        /// Balance ID.
        balance_id: String,
        /// Version the caller expected.
        expected: i64,
        /// Version found in the store.
        actual: i64,
    },

    /// The account already has a balance with this key.
    #[error("Account {account_id} already has a balance with key '{key}'")]
    DuplicateKey {
        /// Account ID.
        account_id: AccountId,
        /// Conflicting key.
        key: String,
    },

    /// Balance still holds funds.
    #[error("Balance {balance_id} cannot be deleted while it holds funds (available: {available}, on hold: {on_hold})")]
    NonZeroFunds {
        /// Balance ID.
        balance_id: BalanceId,
        /// Available funds.
        available: Decimal,
        /// Held funds.
        on_hold: Decimal,
    },

    // ========== Validation Errors ==========
    /// External accounts only carry their default balance.
    #[error("Account {0} is external and cannot have additional balances")]
    ExternalAccount(AccountId),

    /// The balance key is malformed or reserved.
    #[error("Invalid balance key '{0}'")]
    InvalidKey(String),

    /// The update changes nothing.
    #[error("Balance update must change at least one field")]
    EmptyPatch,

    /// The adjustment moves no funds.
    #[error("Balance adjustment must move a non-zero amount")]
    EmptyAdjustment,

    /// The adjustment would push an amount out of range.
    #[error("Adjustment of balance {0} overflows its amounts")]
    AmountOverflow(BalanceId),

    /// Balance lists do not support metadata filters.
    #[error("Balances do not support metadata filters")]
    MetadataFilterUnsupported,

    /// The list query is invalid.
    #[error(transparent)]
    Query(#[from] QueryError),

    // ========== Infrastructure Errors ==========
    /// The request was cancelled or timed out.
    #[error(transparent)]
    Interrupted(#[from] Interrupted),

    /// The balance store failed.
    #[error("Balance store failure: {0}")]
    Store(String),
}

impl BalanceError {
    /// Maps a store failure on a specific balance.
    #[must_use]
    pub fn from_store(err: StoreError, balance_id: BalanceId) -> Self {
        match err {
            StoreError::NotFound { .. } => Self::NotFound(balance_id),
            StoreError::Overflow { .. } => Self::AmountOverflow(balance_id),
            other => other.into(),
        }
    }
}

impl From<StoreError> for BalanceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::VersionConflict {
                id,
                expected,
                actual,
                ..
            } => Self::VersionConflict {
                balance_id: id,
                expected,
                actual,
            },
            StoreError::Interrupted(reason) => Self::Interrupted(reason),
            other => Self::Store(other.to_string()),
        }
    }
}

impl DomainError for BalanceError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) | Self::AliasNotFound { .. } | Self::DefaultBalanceNotFound(_) => {
                ErrorKind::NotFound
            }
            Self::VersionConflict { .. } | Self::DuplicateKey { .. } | Self::NonZeroFunds { .. } => {
                ErrorKind::Conflict
            }
            Self::ExternalAccount(_)
            | Self::InvalidKey(_)
            | Self::EmptyPatch
            | Self::EmptyAdjustment
            | Self::AmountOverflow(_)
            | Self::MetadataFilterUnsupported
            | Self::Query(_) => ErrorKind::Validation,
            Self::Interrupted(_) => ErrorKind::Cancelled,
            Self::Store(_) => ErrorKind::Internal,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) | Self::AliasNotFound { .. } => "BALANCE_NOT_FOUND",
            Self::DefaultBalanceNotFound(_) => "DEFAULT_BALANCE_NOT_FOUND",
            Self::VersionConflict { .. } => "VERSION_CONFLICT",
            Self::DuplicateKey { .. } => "DUPLICATE_BALANCE_KEY",
            Self::NonZeroFunds { .. } => "BALANCE_HAS_FUNDS",
            Self::ExternalAccount(_) => "EXTERNAL_ACCOUNT",
            Self::InvalidKey(_) => "INVALID_BALANCE_KEY",
            Self::EmptyPatch => "EMPTY_PATCH",
            Self::EmptyAdjustment => "EMPTY_ADJUSTMENT",
            Self::AmountOverflow(_) => "AMOUNT_OVERFLOW",
            Self::MetadataFilterUnsupported => "UNSUPPORTED_FILTER",
            Self::Query(e) => e.error_code(),
            Self::Interrupted(_) => "REQUEST_CANCELLED",
            Self::Store(_) => "STORE_FAILURE",
        }
    }
}

impl From<BalanceError> for AppError {
    fn from(err: BalanceError) -> Self {
        Self::from_domain(&err)
    }
}

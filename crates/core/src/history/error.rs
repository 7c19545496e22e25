//! Historical reconstruction errors.

use chrono::{DateTime, Utc};
use ledgerline_shared::types::{AccountId, BalanceId};
use ledgerline_shared::{AppError, DomainError, ErrorKind, Interrupted};
use thiserror::Error;

use crate::store::StoreError;

/// Errors that can occur while reconstructing past balances.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HistoryError {
    /// No timestamp was supplied.
    #[error("A timestamp is required")]
    MissingTimestamp,

    /// The timestamp matches no accepted format.
    #[error("Invalid timestamp '{0}', expected RFC 3339 or YYYY-MM-DD HH:MM:SS")]
    InvalidTimestamp(String),

    /// The timestamp lies in the future.
    #[error("Timestamp {0} is in the future")]
    FutureTimestamp(DateTime<Utc>),

    /// The balance does not exist.
    #[error("Balance not found: {0}")]
    BalanceNotFound(BalanceId),

    /// Nothing was recorded at or before the timestamp.
    #[error("No balance data for account {account_id} at {at}")]
    NoDataAtTimestamp {
        /// Account ID.
        account_id: AccountId,
        /// Requested instant.
        at: DateTime<Utc>,
    },

    /// The request was cancelled or timed out.
    #[error(transparent)]
    Interrupted(#[from] Interrupted),

    /// A store failed.
    #[error("History store failure: {0}")]
    Store(String),
}

impl From<StoreError> for HistoryError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Interrupted(reason) => Self::Interrupted(reason),
            other => Self::Store(other.to_string()),
        }
    }
}

impl DomainError for HistoryError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingTimestamp | Self::InvalidTimestamp(_) | Self::FutureTimestamp(_) => {
                ErrorKind::Validation
            }
            Self::BalanceNotFound(_) => ErrorKind::NotFound,
            Self::NoDataAtTimestamp { .. } => ErrorKind::NoDataAtTimestamp,
            Self::Interrupted(_) => ErrorKind::Cancelled,
            Self::Store(_) => ErrorKind::Internal,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::MissingTimestamp => "MISSING_TIMESTAMP",
            Self::InvalidTimestamp(_) => "INVALID_TIMESTAMP",
            Self::FutureTimestamp(_) => "FUTURE_TIMESTAMP",
            Self::BalanceNotFound(_) => "BALANCE_NOT_FOUND",
            Self::NoDataAtTimestamp { .. } => "NO_DATA_AT_TIMESTAMP",
            Self::Interrupted(_) => "REQUEST_CANCELLED",
            Self::Store(_) => "STORE_FAILURE",
        }
    }
}

impl From<HistoryError> for AppError {
    fn from(err: HistoryError) -> Self {
        Self::from_domain(&err)
    }
}

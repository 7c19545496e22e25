//! Routing errors.

use ledgerline_shared::types::{OperationRouteId, QueryError, TransactionRouteId};
use ledgerline_shared::{AppError, DomainError, ErrorKind, Interrupted};
use thiserror::Error;

use super::rule::RuleError;
use super::types::OperationType;
use crate::metadata::MetadataError;
use crate::store::StoreError;

/// Errors that can occur during route operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingError {
    // ========== Validation Errors ==========
    /// The account rule is malformed.
    #[error(transparent)]
    Rule(#[from] RuleError),

    /// The title is blank or too long.
    #[error("Invalid route title: {0}")]
    InvalidTitle(String),

    /// The description is too long.
    #[error("Route description exceeds {0} characters")]
    DescriptionTooLong(usize),

    /// The operation type is neither `source` nor `destination`.
    #[error("Invalid operation type '{0}', expected 'source' or 'destination'")]
    InvalidOperationType(String),

    /// A transaction route lacks a source or a destination leg.
    #[error("Transaction route must include at least one source and one destination operation route")]
    IncompleteTransactionRoute,

    /// Metadata is malformed.
    #[error(transparent)]
    Metadata(#[from] MetadataError),

    /// The list query is invalid.
    #[error(transparent)]
    Query(#[from] QueryError),

    /// The account may not fill any leg of this side of the route.
    #[error("Account {alias} ({account_type}) is not eligible as {operation_type} of transaction route {route_id}")]
    AccountIneligible {
        /// Transaction route ID.
        route_id: TransactionRouteId,
        /// Leg side.
        operation_type: OperationType,
        /// Candidate alias.
        alias: String,
        /// Candidate account type.
        account_type: String,
    },

    // ========== Lookup Errors ==========
    /// Operation route not found.
    #[error("Operation route not found: {0}")]
    OperationRouteNotFound(OperationRouteId),

    /// Transaction route not found.
    #[error("Transaction route not found: {0}")]
    TransactionRouteNotFound(TransactionRouteId),

    // ========== Conflict Errors ==========
    /// The operation route is still referenced.
    #[error("Operation route {id} is used by {count} transaction route(s)")]
    OperationRouteInUse {
        /// Operation route ID.
        id: OperationRouteId,
        /// Number of referencing transaction routes.
        count: usize,
    },

    // ========== Infrastructure Errors ==========
    /// The request was cancelled or timed out.
    #[error(transparent)]
    Interrupted(#[from] Interrupted),

    /// A store failed.
    #[error("Route store failure: {0}")]
    Store(String),
}

impl From<StoreError> for RoutingError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Interrupted(reason) => Self::Interrupted(reason),
            other => Self::Store(other.to_string()),
        }
    }
}

impl RoutingError {
    pub(crate) fn operation_route(err: StoreError, id: OperationRouteId) -> Self {
        if err.is_not_found() {
            Self::OperationRouteNotFound(id)
        } else {
            err.into()
        }
    }

    pub(crate) fn transaction_route(err: StoreError, id: TransactionRouteId) -> Self {
        if err.is_not_found() {
            Self::TransactionRouteNotFound(id)
        } else {
            err.into()
        }
    }
}

impl DomainError for RoutingError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Rule(_)
            | Self::InvalidTitle(_)
            | Self::DescriptionTooLong(_)
            | Self::InvalidOperationType(_)
            | Self::IncompleteTransactionRoute
            | Self::Metadata(_)
            | Self::Query(_)
            | Self::AccountIneligible { .. } => ErrorKind::Validation,
            Self::OperationRouteNotFound(_) | Self::TransactionRouteNotFound(_) => {
                ErrorKind::NotFound
            }
            Self::OperationRouteInUse { .. } => ErrorKind::Conflict,
            Self::Interrupted(_) => ErrorKind::Cancelled,
            Self::Store(_) => ErrorKind::Internal,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::Rule(e) => e.error_code(),
            Self::InvalidTitle(_) => "INVALID_TITLE",
            Self::DescriptionTooLong(_) => "INVALID_DESCRIPTION",
            Self::InvalidOperationType(_) => "INVALID_OPERATION_TYPE",
            Self::IncompleteTransactionRoute => "INCOMPLETE_TRANSACTION_ROUTE",
            Self::Metadata(e) => e.error_code(),
            Self::Query(e) => e.error_code(),
            Self::AccountIneligible { .. } => "ACCOUNT_INELIGIBLE",
            Self::OperationRouteNotFound(_) => "OPERATION_ROUTE_NOT_FOUND",
            Self::TransactionRouteNotFound(_) => "TRANSACTION_ROUTE_NOT_FOUND",
            Self::OperationRouteInUse { .. } => "OPERATION_ROUTE_IN_USE",
            Self::Interrupted(_) => "REQUEST_CANCELLED",
            Self::Store(_) => "STORE_FAILURE",
        }
    }
}

impl From<RoutingError> for AppError {
    fn from(err: RoutingError) -> Self {
        Self::from_domain(&err)
    }
}

//! Operation and transaction routes.
//!
//! This module provides:
//! - Account rule validation and evaluation
//! - Route CRUD with metadata
//! - The per-tenant accounting route cache and its admin invalidation

mod cache;
mod error;
mod rule;
mod service;
mod types;

#[cfg(test)]
mod rule_props;

pub use cache::{AccountingLeg, AccountingRoute, TransactionRouteCache};
pub use error::RoutingError;
pub use rule::{ACCOUNT_TYPE_RULE, ALIAS_RULE, AccountRule, AccountRuleInput, RuleError, ValidIf};
pub use service::RoutingService;
pub use types::{
    CreateOperationRouteInput, CreateTransactionRouteInput, MAX_DESCRIPTION_LEN, MAX_TITLE_LEN,
    OperationRoute, OperationType, RouteWrite, TransactionRoute, UpdateOperationRouteInput,
    UpdateTransactionRouteInput,
};

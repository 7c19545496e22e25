//! Operation and transaction route types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use ledgerline_shared::types::{LedgerId, OperationRouteId, OrganizationId, TransactionRouteId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::rule::{AccountRule, AccountRuleInput};

/// Longest accepted route title.
pub const MAX_TITLE_LEN: usize = 50;

/// Longest accepted route description.
pub const MAX_DESCRIPTION_LEN: usize = 250;

/// Side of a transaction an operation route describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    /// Debited leg.
    Source,
    /// Credited leg.
    Destination,
}

impl OperationType {
    /// Returns the wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Destination => "destination",
        }
    }
}

impl FromStr for OperationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "source" => Ok(Self::Source),
            "destination" => Ok(Self::Destination),
            _ => Err(format!("Unknown operation type: {s}")),
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A reusable description of one leg of a transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationRoute {
    /// Route ID.
    pub id: OperationRouteId,
    /// Owning organization.
    pub organization_id: OrganizationId,
    /// Owning ledger.
    pub ledger_id: LedgerId,
    /// Short title.
    pub title: String,
    /// Free-form description.
    pub description: Option<String>,
    /// Leg side.
    pub operation_type: OperationType,
    /// Restriction on the accounts allowed to fill this leg.
    pub account: Option<AccountRule>,
    /// User metadata, stored in the metadata store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

/// A named set of operation routes a transaction can be posted against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRoute {
    /// Route ID.
    pub id: TransactionRouteId,
    /// Owning organization.
    pub organization_id: OrganizationId,
    /// Owning ledger.
    pub ledger_id: LedgerId,
    /// Short title.
    pub title: String,
    /// Free-form description.
    pub description: Option<String>,
    /// Operation routes making up this transaction route.
    pub operation_routes: Vec<OperationRouteId>,
    /// User metadata, stored in the metadata store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

/// Input for creating an operation route.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOperationRouteInput {
    /// Short title.
    pub title: String,
    /// Free-form description.
    pub description: Option<String>,
    /// `source` or `destination`.
    pub operation_type: String,
    /// Account rule as received on the wire.
    pub account: Option<AccountRuleInput>,
    /// User metadata.
    pub metadata: Option<Map<String, Value>>,
}

/// Input for updating an operation route. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOperationRouteInput {
    /// New title.
    pub title: Option<String>,
    /// New description.
    pub description: Option<String>,
    /// Replacement account rule; an empty rule removes the restriction.
    pub account: Option<AccountRuleInput>,
    /// Replacement metadata.
    pub metadata: Option<Map<String, Value>>,
}

/// Input for creating a transaction route.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTransactionRouteInput {
    /// Short title.
    pub title: String,
    /// Free-form description.
    pub description: Option<String>,
    /// Operation routes to include.
    pub operation_routes: Vec<OperationRouteId>,
    /// User metadata.
    pub metadata: Option<Map<String, Value>>,
}

/// Input for updating a transaction route. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTransactionRouteInput {
    /// New title.
    pub title: Option<String>,
    /// New description.
    pub description: Option<String>,
    /// Replacement set of operation routes.
    pub operation_routes: Option<Vec<OperationRouteId>>,
    /// Replacement metadata.
    pub metadata: Option<Map<String, Value>>,
}

/// A completed route write plus any non-fatal cache warnings.
///
/// The durable write has already succeeded when this is returned; warnings only report
/// that the transaction route cache could not be refreshed.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteWrite<T> {
    /// The persisted value.
    pub value: T,
    /// Cache refresh failures, for alerting.
    pub warnings: Vec<String>,
}

impl<T> RouteWrite<T> {
    /// A write with no warnings.
    #[must_use]
    pub fn clean(value: T) -> Self {
        Self {
            value,
            warnings: Vec::new(),
        }
    }

    /// Whether every cache refresh succeeded.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

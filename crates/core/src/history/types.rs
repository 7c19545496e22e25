//! Operation log types.

use chrono::{DateTime, Utc};
use ledgerline_shared::types::{AccountId, BalanceId, LedgerId, OperationId, OrganizationId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::balance::Balance;

/// Balance state captured immediately after an operation was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceSnapshot {
    /// Available funds after the operation.
    pub available: Decimal,
    /// Held funds after the operation.
    pub on_hold: Decimal,
    /// Balance version after the operation.
    pub version: i64,
}

/// An append-only operation log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    /// Operation ID.
    pub id: OperationId,
    /// Owning organization.
    pub organization_id: OrganizationId,
    /// Owning ledger.
    pub ledger_id: LedgerId,
    /// Account the operation touched.
    pub account_id: AccountId,
    /// Balance the operation touched.
    pub balance_id: BalanceId,
    /// Slot key of that balance.
    pub balance_key: String,
    /// Asset moved.
    pub asset_code: String,
    /// Balance state right after this operation.
    pub balance_after: BalanceSnapshot,
    /// When the operation was applied.
    pub created_at: DateTime<Utc>,
}

impl Operation {
    /// Reconstructs `current` as it stood right after this operation.
    ///
    /// Identity and `createdAt` come from `current`; the numeric state and version come
    /// from the snapshot, and `updatedAt` is the operation time.
    #[must_use]
    pub fn replay_onto(&self, current: &Balance) -> Balance {
        Balance {
            available: self.balance_after.available,
            on_hold: self.balance_after.on_hold,
            version: self.balance_after.version,
            updated_at: self.created_at,
            ..current.clone()
        }
    }
}

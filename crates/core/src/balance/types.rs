//! Balance domain types.

use chrono::{DateTime, Utc};
use ledgerline_shared::types::{AccountId, BalanceId, LedgerId, OrganizationId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::store::{StoreError, StoreResult};

/// Key of the balance created together with its account.
pub const DEFAULT_BALANCE_KEY: &str = "default";

/// Account type that may not carry additional balances.
pub const EXTERNAL_ACCOUNT_TYPE: &str = "external";

/// Longest accepted balance key.
pub const MAX_BALANCE_KEY_LEN: usize = 100;

/// A monetary balance slot of an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Balance {
    /// Balance ID.
    pub id: BalanceId,
    /// Owning organization.
    pub organization_id: OrganizationId,
    /// Owning ledger.
    pub ledger_id: LedgerId,
    /// Owning account.
    pub account_id: AccountId,
    /// Account alias, e.g. `@treasury`.
    pub alias: String,
    /// Slot name: `default` or an additional balance key.
    pub key: String,
    /// Funds available for sending.
    pub available: Decimal,
    /// Funds reserved by pending transactions.
    pub on_hold: Decimal,
    /// Asset code, e.g. `BRL`.
    pub asset_code: String,
    /// Decimal scale of the asset.
    pub scale: u32,
    /// Type of the owning account.
    pub account_type: String,
    /// Optimistic concurrency token, bumped by every mutating write.
    pub version: i64,
    /// Whether the balance may be the source of a transaction leg.
    pub allow_sending: bool,
    /// Whether the balance may be the destination of a transaction leg.
    pub allow_receiving: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
    /// Soft-deletion time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Balance {
    /// Whether the balance holds no funds at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.available.is_zero() && self.on_hold.is_zero()
    }

    /// Whether this is the account's implicit balance.
    #[must_use]
    pub fn is_default(&self) -> bool {
        self.key == DEFAULT_BALANCE_KEY
    }
}

/// Permission changes applied by [`crate::balance::BalanceManager::update`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalancePatch {
    /// New sending permission.
    pub allow_sending: Option<bool>,
    /// New receiving permission.
    pub allow_receiving: Option<bool>,
    /// Version the caller last observed; `None` lets the store serialize the write.
    pub expected_version: Option<i64>,
}

impl BalancePatch {
    /// Whether the patch changes nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.allow_sending.is_none() && self.allow_receiving.is_none()
    }
}

/// Atomic numeric adjustment applied by [`crate::balance::BalanceManager::adjust`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceAdjustment {
    /// Amount added to `available` (negative to subtract).
    pub available: Decimal,
    /// Amount added to `onHold` (negative to release).
    pub on_hold: Decimal,
    /// Version the caller last observed; `None` lets the store serialize the write.
    pub expected_version: Option<i64>,
}

impl BalanceAdjustment {
    /// Whether the adjustment moves no funds.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.available.is_zero() && self.on_hold.is_zero()
    }
}

/// Read-modify-write request executed by the store in a single step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BalanceMutation {
    /// New sending permission.
    pub allow_sending: Option<bool>,
    /// New receiving permission.
    pub allow_receiving: Option<bool>,
    /// Delta added to `available`.
    pub available_delta: Decimal,
    /// Delta added to `onHold`.
    pub on_hold_delta: Decimal,
    /// Required current version, if the caller pinned one.
    pub expected_version: Option<i64>,
}

impl From<BalancePatch> for BalanceMutation {
    fn from(patch: BalancePatch) -> Self {
        Self {
            allow_sending: patch.allow_sending,
            allow_receiving: patch.allow_receiving,
            expected_version: patch.expected_version,
            ..Self::default()
        }
    }
}

impl From<BalanceAdjustment> for BalanceMutation {
    fn from(adjustment: BalanceAdjustment) -> Self {
        Self {
            available_delta: adjustment.available,
            on_hold_delta: adjustment.on_hold,
            expected_version: adjustment.expected_version,
            ..Self::default()
        }
    }
}

impl BalanceMutation {
    /// Applies the mutation to `balance`, bumping its version.
    ///
    /// Stores call this while holding the row, after checking the expected version. The
    /// row is left untouched when either amount would overflow.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Overflow`] if a delta pushes an amount out of range.
    pub fn apply(&self, balance: &mut Balance, now: DateTime<Utc>) -> StoreResult<()> {
        let overflow = || StoreError::Overflow {
            entity: "balance",
            id: balance.id.to_string(),
        };
        let available = balance
            .available
            .checked_add(self.available_delta)
            .ok_or_else(overflow)?;
        let on_hold = balance
            .on_hold
            .checked_add(self.on_hold_delta)
            .ok_or_else(overflow)?;

        if let Some(allow_sending) = self.allow_sending {
            balance.allow_sending = allow_sending;
        }
        if let Some(allow_receiving) = self.allow_receiving {
            balance.allow_receiving = allow_receiving;
        }
        balance.available = available;
        balance.on_hold = on_hold;
        balance.version += 1;
        balance.updated_at = now;
        Ok(())
    }
}

/// Input for creating an additional balance on an existing account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAdditionalBalanceInput {
    /// Slot name, unique per account.
    pub key: String,
    /// Sending permission; inherited from the default balance when absent.
    pub allow_sending: Option<bool>,
    /// Receiving permission; inherited from the default balance when absent.
    pub allow_receiving: Option<bool>,
}

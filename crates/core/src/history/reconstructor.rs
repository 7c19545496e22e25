//! Point-in-time balance reconstruction.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use ledgerline_shared::RequestContext;
use ledgerline_shared::types::{AccountId, BalanceId, LedgerId, OrganizationId};
use tracing::{debug, instrument};

use super::error::HistoryError;
use super::timestamp::parse_timestamp;
use super::types::Operation;
use crate::balance::Balance;
use crate::store::{BalanceStore, OperationLog};

/// Rebuilds balances as they stood at a past instant.
///
/// Each operation in the log records the balance right after it was applied, so the state
/// at `T` is the snapshot of the latest operation at or before `T`. Reads only; the cache
/// overlay is never consulted.
#[derive(Clone)]
pub struct BalanceHistory {
    balances: Arc<dyn BalanceStore>,
    operations: Arc<dyn OperationLog>,
}

impl BalanceHistory {
    /// Creates a reconstructor over the balance store and the operation log.
    #[must_use]
    pub fn new(balances: Arc<dyn BalanceStore>, operations: Arc<dyn OperationLog>) -> Self {
        Self {
            balances,
            operations,
        }
    }

    /// Reconstructs one balance at the instant given by `timestamp`.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a missing, malformed or future timestamp,
    /// `BalanceNotFound` if the balance does not exist, or `NoDataAtTimestamp` if no
    /// operation touched it at or before the instant.
    pub async fn balance_at(
        &self,
        ctx: &RequestContext,
        org: OrganizationId,
        ledger: LedgerId,
        id: BalanceId,
        timestamp: Option<&str>,
    ) -> Result<Balance, HistoryError> {
        let at = parse_timestamp(timestamp, Utc::now())?;
        self.balance_at_instant(ctx, org, ledger, id, at).await
    }

    /// Reconstructs one balance at `at`.
    ///
    /// # Errors
    ///
    /// Same as [`Self::balance_at`], minus timestamp parsing.
    #[instrument(skip_all, fields(tenant = %ctx.tenant(), balance_id = %id, at = %at))]
    pub async fn balance_at_instant(
        &self,
        ctx: &RequestContext,
        org: OrganizationId,
        ledger: LedgerId,
        id: BalanceId,
        at: DateTime<Utc>,
    ) -> Result<Balance, HistoryError> {
        let current = ctx
            .guard(self.balances.find(ctx, org, ledger, id))
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    HistoryError::BalanceNotFound(id)
                } else {
                    e.into()
                }
            })?;

        let operation = ctx
            .guard(self.operations.find_last_operation_before_timestamp(
                ctx,
                org,
                ledger,
                current.account_id,
                &current.key,
                at,
            ))
            .await?
            .ok_or(HistoryError::NoDataAtTimestamp {
                account_id: current.account_id,
                at,
            })?;

        debug!(operation_id = %operation.id, "balance reconstructed from operation");
        Ok(operation.replay_onto(&current))
    }

    /// Reconstructs every balance of an account at the instant given by `timestamp`.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a bad timestamp, or `NoDataAtTimestamp` if no
    /// balance of the account had any operation at or before the instant.
    pub async fn account_balances_at(
        &self,
        ctx: &RequestContext,
        org: OrganizationId,
        ledger: LedgerId,
        account: AccountId,
        timestamp: Option<&str>,
    ) -> Result<Vec<Balance>, HistoryError> {
        let at = parse_timestamp(timestamp, Utc::now())?;
        self.account_balances_at_instant(ctx, org, ledger, account, at)
            .await
    }

    /// Reconstructs every balance of an account at `at`.
    ///
    /// Slots that existed at `at` but had no operation yet are left out.
    ///
    /// # Errors
    ///
    /// Same as [`Self::account_balances_at`], minus timestamp parsing.
    #[instrument(skip_all, fields(tenant = %ctx.tenant(), account_id = %account, at = %at))]
    pub async fn account_balances_at_instant(
        &self,
        ctx: &RequestContext,
        org: OrganizationId,
        ledger: LedgerId,
        account: AccountId,
        at: DateTime<Utc>,
    ) -> Result<Vec<Balance>, HistoryError> {
        let no_data = HistoryError::NoDataAtTimestamp {
            account_id: account,
            at,
        };

        let operations = ctx
            .guard(
                self.operations
                    .find_last_operations_for_account_before_timestamp(ctx, org, ledger, account, at),
            )
            .await?;
        if operations.is_empty() {
            return Err(no_data);
        }

        let mut latest: HashMap<String, Operation> = operations
            .into_iter()
            .map(|op| (op.balance_key.clone(), op))
            .collect();

        let balances = ctx
            .guard(
                self.balances
                    .list_by_account_at_timestamp(ctx, org, ledger, account, at),
            )
            .await?;

        let reconstructed: Vec<Balance> = balances
            .iter()
            .filter_map(|balance| {
                latest
                    .remove(&balance.key)
                    .map(|op| op.replay_onto(balance))
            })
            .collect();

        if reconstructed.is_empty() {
            return Err(no_data);
        }
        Ok(reconstructed)
    }
}

impl std::fmt::Debug for BalanceHistory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BalanceHistory").finish_non_exhaustive()
    }
}

//! Balance manager: reads and writes balances through the store and the cache overlay.

use std::sync::Arc;

use chrono::Utc;
use ledgerline_shared::RequestContext;
use ledgerline_shared::types::{
    AccountId, BalanceId, CursorPage, LedgerId, ListQuery, OrganizationId,
};
use rust_decimal::Decimal;
use tracing::{info, instrument};

use super::error::BalanceError;
use super::types::{
    Balance, BalanceAdjustment, BalanceMutation, BalancePatch, CreateAdditionalBalanceInput,
    DEFAULT_BALANCE_KEY, EXTERNAL_ACCOUNT_TYPE, MAX_BALANCE_KEY_LEN,
};
use crate::cache::BalanceCacheOverlay;
use crate::store::{BalanceStore, StoreError};

/// Version assigned to a freshly created balance.
const INITIAL_VERSION: i64 = 1;

/// Orchestrates balance reads and writes.
///
/// The manager never computes a new balance from a value it read earlier: every write is
/// handed to the store as a [`BalanceMutation`] and executed there in a single step. The
/// overlay is refreshed after the store commits.
#[derive(Clone)]
pub struct BalanceManager {
    store: Arc<dyn BalanceStore>,
    overlay: BalanceCacheOverlay,
}

impl BalanceManager {
    /// Creates a manager over `store` and `overlay`.
    #[must_use]
    pub fn new(store: Arc<dyn BalanceStore>, overlay: BalanceCacheOverlay) -> Self {
        Self { store, overlay }
    }

    /// Loads a balance with the freshest cached figures applied.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the balance does not exist in the ledger.
    #[instrument(skip_all, fields(tenant = %ctx.tenant(), balance_id = %id))]
    pub async fn find(
        &self,
        ctx: &RequestContext,
        org: OrganizationId,
        ledger: LedgerId,
        id: BalanceId,
    ) -> Result<Balance, BalanceError> {
        let balance = ctx
            .guard(self.store.find(ctx, org, ledger, id))
            .await
            .map_err(|e| BalanceError::from_store(e, id))?;

        Ok(self.overlay.apply(ctx, balance).await?)
    }

    /// Loads the balance slot `key` of the account known by `alias`.
    ///
    /// # Errors
    ///
    /// Returns `AliasNotFound` if no such slot exists.
    #[instrument(skip_all, fields(tenant = %ctx.tenant(), alias = %alias))]
    pub async fn find_by_alias(
        &self,
        ctx: &RequestContext,
        org: OrganizationId,
        ledger: LedgerId,
        alias: &str,
        key: &str,
    ) -> Result<Balance, BalanceError> {
        let key = key.trim().to_lowercase();
        let balance = ctx
            .guard(self.store.find_by_alias_and_key(ctx, org, ledger, alias, &key))
            .await?
            .ok_or_else(|| BalanceError::AliasNotFound {
                alias: alias.to_string(),
                key,
            })?;

        Ok(self.overlay.apply(ctx, balance).await?)
    }

    /// Changes the sending and receiving permissions of a balance.
    ///
    /// # Errors
    ///
    /// Returns `EmptyPatch` if nothing would change, `NotFound` if the balance is missing,
    /// or `VersionConflict` if `patch.expected_version` is stale.
    #[instrument(skip_all, fields(tenant = %ctx.tenant(), balance_id = %id))]
    pub async fn update(
        &self,
        ctx: &RequestContext,
        org: OrganizationId,
        ledger: LedgerId,
        id: BalanceId,
        patch: BalancePatch,
    ) -> Result<Balance, BalanceError> {
        if patch.is_empty() {
            return Err(BalanceError::EmptyPatch);
        }

        self.write(ctx, org, ledger, id, patch.into()).await
    }

    /// Adds signed deltas to `available` and `onHold` in one atomic step.
    ///
    /// # Errors
    ///
    /// Returns `EmptyAdjustment` for a zero adjustment, `NotFound` if the balance is
    /// missing, or `VersionConflict` if `adjustment.expected_version` is stale.
    #[instrument(skip_all, fields(tenant = %ctx.tenant(), balance_id = %id))]
    pub async fn adjust(
        &self,
        ctx: &RequestContext,
        org: OrganizationId,
        ledger: LedgerId,
        id: BalanceId,
        adjustment: BalanceAdjustment,
    ) -> Result<Balance, BalanceError> {
        if adjustment.is_zero() {
            return Err(BalanceError::EmptyAdjustment);
        }

        self.write(ctx, org, ledger, id, adjustment.into()).await
    }

    async fn write(
        &self,
        ctx: &RequestContext,
        org: OrganizationId,
        ledger: LedgerId,
        id: BalanceId,
        mutation: BalanceMutation,
    ) -> Result<Balance, BalanceError> {
        let updated = ctx
            .guard(self.store.update_returning(ctx, org, ledger, id, &mutation))
            .await
            .map_err(|e| BalanceError::from_store(e, id))?;

        self.overlay.store(ctx, &updated).await;

        info!(
            org_id = %org,
            balance_id = %id,
            version = updated.version,
            "Balance updated"
        );
        Ok(updated)
    }

    /// Deletes an empty balance.
    ///
    /// The delete is conditioned on the version observed by the emptiness check, so a
    /// deposit landing in between fails the delete instead of being lost.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the balance is missing, `NonZeroFunds` if it holds funds, or
    /// `VersionConflict` if it changed after the check.
    #[instrument(skip_all, fields(tenant = %ctx.tenant(), balance_id = %id))]
    pub async fn delete(
        &self,
        ctx: &RequestContext,
        org: OrganizationId,
        ledger: LedgerId,
        id: BalanceId,
    ) -> Result<(), BalanceError> {
        let balance = self.find(ctx, org, ledger, id).await?;

        if !balance.is_empty() {
            return Err(BalanceError::NonZeroFunds {
                balance_id: id,
                available: balance.available,
                on_hold: balance.on_hold,
            });
        }

        ctx.guard(self.store.delete(ctx, org, ledger, id, balance.version))
            .await
            .map_err(|e| BalanceError::from_store(e, id))?;

        self.overlay.evict(ctx, org, ledger, id).await;

        info!(org_id = %org, balance_id = %id, "Balance deleted");
        Ok(())
    }

    /// Creates an additional balance slot on an account.
    ///
    /// Asset, scale, alias and account type are copied from the account's default
    /// balance, as are the permissions the input leaves unset.
    ///
    /// # Errors
    ///
    /// Returns `InvalidKey` for a malformed key, `DuplicateKey` if the slot exists,
    /// `DefaultBalanceNotFound` if the account has no default balance, or
    /// `ExternalAccount` for external accounts.
    #[instrument(skip_all, fields(tenant = %ctx.tenant(), account_id = %account))]
    pub async fn create_additional(
        &self,
        ctx: &RequestContext,
        org: OrganizationId,
        ledger: LedgerId,
        account: AccountId,
        input: CreateAdditionalBalanceInput,
    ) -> Result<Balance, BalanceError> {
        let key = normalize_key(&input.key)?;

        let existing = ctx
            .guard(self.store.find_by_account_and_key(ctx, org, ledger, account, &key))
            .await?;
        if existing.is_some() {
            return Err(BalanceError::DuplicateKey {
                account_id: account,
                key,
            });
        }

        let default = ctx
            .guard(
                self.store
                    .find_by_account_and_key(ctx, org, ledger, account, DEFAULT_BALANCE_KEY),
            )
            .await?
            .ok_or(BalanceError::DefaultBalanceNotFound(account))?;

        if default.account_type.eq_ignore_ascii_case(EXTERNAL_ACCOUNT_TYPE) {
            return Err(BalanceError::ExternalAccount(account));
        }

        let now = Utc::now();
        let balance = Balance {
            id: BalanceId::new(),
            organization_id: org,
            ledger_id: ledger,
            account_id: account,
            alias: default.alias,
            key: key.clone(),
            available: Decimal::ZERO,
            on_hold: Decimal::ZERO,
            asset_code: default.asset_code,
            scale: default.scale,
            account_type: default.account_type,
            version: INITIAL_VERSION,
            allow_sending: input.allow_sending.unwrap_or(default.allow_sending),
            allow_receiving: input.allow_receiving.unwrap_or(default.allow_receiving),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };

        let created = ctx
            .guard(self.store.create(ctx, balance))
            .await
            .map_err(|e| match e {
                StoreError::Duplicate { .. } => BalanceError::DuplicateKey {
                    account_id: account,
                    key,
                },
                other => other.into(),
            })?;

        info!(
            org_id = %org,
            account_id = %account,
            balance_id = %created.id,
            key = %created.key,
            "Additional balance created"
        );
        Ok(created)
    }

    /// Lists the balances of a ledger, one page at a time.
    ///
    /// # Errors
    ///
    /// Returns `MetadataFilterUnsupported` if the query carries metadata filters.
    #[instrument(skip_all, fields(tenant = %ctx.tenant(), limit = query.limit))]
    pub async fn list_all(
        &self,
        ctx: &RequestContext,
        org: OrganizationId,
        ledger: LedgerId,
        query: &ListQuery,
    ) -> Result<CursorPage<Balance>, BalanceError> {
        reject_metadata_filter(query)?;
        let rows = ctx
            .guard(self.store.list_all(ctx, org, ledger, query))
            .await?;
        self.page(ctx, rows, query).await
    }

    /// Lists the balances of one account, one page at a time.
    ///
    /// # Errors
    ///
    /// Returns `MetadataFilterUnsupported` if the query carries metadata filters.
    #[instrument(skip_all, fields(tenant = %ctx.tenant(), account_id = %account))]
    pub async fn list_all_by_account(
        &self,
        ctx: &RequestContext,
        org: OrganizationId,
        ledger: LedgerId,
        account: AccountId,
        query: &ListQuery,
    ) -> Result<CursorPage<Balance>, BalanceError> {
        reject_metadata_filter(query)?;
        let rows = ctx
            .guard(self.store.list_by_account(ctx, org, ledger, account, query))
            .await?;
        self.page(ctx, rows, query).await
    }

    /// Loads every balance owned by the given aliases.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails or the request is interrupted.
    #[instrument(skip_all, fields(tenant = %ctx.tenant(), aliases = aliases.len()))]
    pub async fn list_by_aliases(
        &self,
        ctx: &RequestContext,
        org: OrganizationId,
        ledger: LedgerId,
        aliases: &[String],
    ) -> Result<Vec<Balance>, BalanceError> {
        if aliases.is_empty() {
            return Ok(Vec::new());
        }

        let rows = ctx
            .guard(self.store.list_by_aliases(ctx, org, ledger, aliases))
            .await?;
        Ok(self.overlay.apply_many(ctx, rows).await?)
    }

    async fn page(
        &self,
        ctx: &RequestContext,
        rows: Vec<Balance>,
        query: &ListQuery,
    ) -> Result<CursorPage<Balance>, BalanceError> {
        let window = query.window();
        let mut page = CursorPage::assemble(rows, &window, |b| b.id.to_string());
        page.items = self.overlay.apply_many(ctx, page.items).await?;
        Ok(page)
    }
}

impl std::fmt::Debug for BalanceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BalanceManager")
            .field("overlay", &self.overlay)
            .finish_non_exhaustive()
    }
}

fn reject_metadata_filter(query: &ListQuery) -> Result<(), BalanceError> {
    if query.has_metadata_filter() {
        return Err(BalanceError::MetadataFilterUnsupported);
    }
    Ok(())
}

/// Normalizes an additional balance key to lower case and checks it.
///
/// # Errors
///
/// Returns `InvalidKey` if the key is blank, too long, or the reserved default key.
pub fn normalize_key(raw: &str) -> Result<String, BalanceError> {
    let key = raw.trim().to_lowercase();
    if key.is_empty() || key.chars().count() > MAX_BALANCE_KEY_LEN || key == DEFAULT_BALANCE_KEY {
        return Err(BalanceError::InvalidKey(raw.to_string()));
    }
    Ok(key)
}

//! In-memory balance store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use ledgerline_shared::types::{
    AccountId, BalanceId, LedgerId, ListQuery, OrganizationId,
};
use ledgerline_shared::{RequestContext, TenantKey};

use super::ensure_live;
use crate::balance::{Balance, BalanceMutation};
use crate::store::{BalanceStore, StoreError, StoreResult};

const ENTITY: &str = "balance";

type SlotKey = (TenantKey, OrganizationId, LedgerId, AccountId, String);

/// Balance store holding rows in memory.
///
/// Soft-deleted rows are kept so historical queries still see them.
#[derive(Debug, Default)]
pub struct InMemoryBalanceStore {
    rows: DashMap<(TenantKey, BalanceId), Balance>,
    slots: DashMap<SlotKey, BalanceId>,
}

impl InMemoryBalanceStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn live(&self, tenant: &TenantKey, org: OrganizationId, ledger: LedgerId) -> Vec<Balance> {
        self.rows
            .iter()
            .filter(|entry| &entry.key().0 == tenant)
            .map(|entry| entry.value().clone())
            .filter(|b| in_scope(b, org, ledger) && b.deleted_at.is_none())
            .collect()
    }

    fn find_slot(&self, key: &SlotKey) -> Option<Balance> {
        let id = *self.slots.get(key)?;
        self.rows
            .get(&(key.0.clone(), id))
            .map(|row| row.value().clone())
            .filter(|b| b.deleted_at.is_none())
    }
}

fn in_scope(balance: &Balance, org: OrganizationId, ledger: LedgerId) -> bool {
    balance.organization_id == org && balance.ledger_id == ledger
}

fn page(rows: Vec<Balance>, query: &ListQuery) -> Vec<Balance> {
    query.window().select(
        rows.into_iter().filter(|b| query.admits_created_at(b.created_at)),
        |b| b.id.to_string(),
    )
}

#[async_trait]
impl BalanceStore for InMemoryBalanceStore {
    async fn find(
        &self,
        ctx: &RequestContext,
        org: OrganizationId,
        ledger: LedgerId,
        id: BalanceId,
    ) -> StoreResult<Balance> {
        ensure_live(ctx)?;
        self.rows
            .get(&(ctx.tenant().clone(), id))
            .map(|row| row.value().clone())
            .filter(|b| in_scope(b, org, ledger) && b.deleted_at.is_none())
            .ok_or_else(|| StoreError::not_found(ENTITY, id))
    }

    async fn find_by_account_and_key(
        &self,
        ctx: &RequestContext,
        org: OrganizationId,
        ledger: LedgerId,
        account: AccountId,
        key: &str,
    ) -> StoreResult<Option<Balance>> {
        ensure_live(ctx)?;
        Ok(self.find_slot(&(ctx.tenant().clone(), org, ledger, account, key.to_string())))
    }

    async fn find_by_alias_and_key(
        &self,
        ctx: &RequestContext,
        org: OrganizationId,
        ledger: LedgerId,
        alias: &str,
        key: &str,
    ) -> StoreResult<Option<Balance>> {
        ensure_live(ctx)?;
        Ok(self
            .live(ctx.tenant(), org, ledger)
            .into_iter()
            .find(|b| b.alias == alias && b.key == key))
    }

    async fn create(&self, ctx: &RequestContext, balance: Balance) -> StoreResult<Balance> {
        ensure_live(ctx)?;
        let tenant = ctx.tenant().clone();
        let slot = (
            tenant.clone(),
            balance.organization_id,
            balance.ledger_id,
            balance.account_id,
            balance.key.clone(),
        );

        match self.slots.entry(slot) {
            Entry::Occupied(_) => Err(StoreError::Duplicate {
                entity: ENTITY,
                key: balance.key,
            }),
            Entry::Vacant(vacant) => {
                self.rows.insert((tenant, balance.id), balance.clone());
                vacant.insert(balance.id);
                Ok(balance)
            }
        }
    }

    async fn update_returning(
        &self,
        ctx: &RequestContext,
        org: OrganizationId,
        ledger: LedgerId,
        id: BalanceId,
        mutation: &BalanceMutation,
    ) -> StoreResult<Balance> {
        ensure_live(ctx)?;
        let mut row = self
            .rows
            .get_mut(&(ctx.tenant().clone(), id))
            .filter(|row| in_scope(row, org, ledger) && row.deleted_at.is_none())
            .ok_or_else(|| StoreError::not_found(ENTITY, id))?;

        if let Some(expected) = mutation.expected_version
            && expected != row.version
        {
            return Err(StoreError::VersionConflict {
                entity: ENTITY,
                id: id.to_string(),
                expected,
                actual: row.version,
            });
        }

        mutation.apply(&mut row, Utc::now())?;
        Ok(row.clone())
    }

    async fn delete(
        &self,
        ctx: &RequestContext,
        org: OrganizationId,
        ledger: LedgerId,
        id: BalanceId,
        expected_version: i64,
    ) -> StoreResult<()> {
        ensure_live(ctx)?;
        let slot = {
            let mut row = self
                .rows
                .get_mut(&(ctx.tenant().clone(), id))
                .filter(|row| in_scope(row, org, ledger) && row.deleted_at.is_none())
                .ok_or_else(|| StoreError::not_found(ENTITY, id))?;

            if row.version != expected_version {
                return Err(StoreError::VersionConflict {
                    entity: ENTITY,
                    id: id.to_string(),
                    expected: expected_version,
                    actual: row.version,
                });
            }

            let now = Utc::now();
            row.deleted_at = Some(now);
            row.updated_at = now;
            (ctx.tenant().clone(), org, ledger, row.account_id, row.key.clone())
        };

        self.slots.remove_if(&slot, |_, slot_id| *slot_id == id);
        Ok(())
    }

    async fn list_all(
        &self,
        ctx: &RequestContext,
        org: OrganizationId,
        ledger: LedgerId,
        query: &ListQuery,
    ) -> StoreResult<Vec<Balance>> {
        ensure_live(ctx)?;
        Ok(page(self.live(ctx.tenant(), org, ledger), query))
    }

    async fn list_by_account(
        &self,
        ctx: &RequestContext,
        org: OrganizationId,
        ledger: LedgerId,
        account: AccountId,
        query: &ListQuery,
    ) -> StoreResult<Vec<Balance>> {
        ensure_live(ctx)?;
        let rows = self
            .live(ctx.tenant(), org, ledger)
            .into_iter()
            .filter(|b| b.account_id == account)
            .collect();
        Ok(page(rows, query))
    }

    async fn list_by_aliases(
        &self,
        ctx: &RequestContext,
        org: OrganizationId,
        ledger: LedgerId,
        aliases: &[String],
    ) -> StoreResult<Vec<Balance>> {
        ensure_live(ctx)?;
        let mut rows: Vec<Balance> = self
            .live(ctx.tenant(), org, ledger)
            .into_iter()
            .filter(|b| aliases.contains(&b.alias))
            .collect();
        rows.sort_by_key(|b| b.id);
        Ok(rows)
    }

    async fn list_by_account_at_timestamp(
        &self,
        ctx: &RequestContext,
        org: OrganizationId,
        ledger: LedgerId,
        account: AccountId,
        at: DateTime<Utc>,
    ) -> StoreResult<Vec<Balance>> {
        ensure_live(ctx)?;
        let tenant = ctx.tenant();
        let mut rows: Vec<Balance> = self
            .rows
            .iter()
            .filter(|entry| &entry.key().0 == tenant)
            .map(|entry| entry.value().clone())
            .filter(|b| {
                in_scope(b, org, ledger)
                    && b.account_id == account
                    && b.created_at <= at
                    && b.deleted_at.is_none_or(|deleted| deleted > at)
            })
            .collect();
        rows.sort_by_key(|b| b.id);
        Ok(rows)
    }
}

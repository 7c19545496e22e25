//! In-memory operation log.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use ledgerline_shared::types::{AccountId, LedgerId, OrganizationId};
use ledgerline_shared::{RequestContext, TenantKey};

use super::ensure_live;
use crate::history::Operation;
use crate::store::{OperationLog, StoreResult};

/// Append-only operation log held in memory, one vector per tenant.
#[derive(Debug, Default)]
pub struct InMemoryOperationLog {
    entries: DashMap<TenantKey, Vec<Operation>>,
}

impl InMemoryOperationLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an operation to the tenant's log.
    pub fn append(&self, tenant: &TenantKey, operation: Operation) {
        self.entries
            .entry(tenant.clone())
            .or_default()
            .push(operation);
    }

    fn matching<F>(&self, tenant: &TenantKey, at: DateTime<Utc>, predicate: F) -> Vec<Operation>
    where
        F: Fn(&Operation) -> bool,
    {
        self.entries
            .get(tenant)
            .map(|ops| {
                ops.iter()
                    .filter(|op| op.created_at <= at && predicate(op))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Orders operations on one slot: by time, then by the version they produced.
fn recency(op: &Operation) -> (DateTime<Utc>, i64) {
    (op.created_at, op.balance_after.version)
}

#[async_trait]
impl OperationLog for InMemoryOperationLog {
    async fn find_last_operation_before_timestamp(
        &self,
        ctx: &RequestContext,
        org: OrganizationId,
        ledger: LedgerId,
        account: AccountId,
        key: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<Operation>> {
        ensure_live(ctx)?;
        Ok(self
            .matching(ctx.tenant(), at, |op| {
                op.organization_id == org
                    && op.ledger_id == ledger
                    && op.account_id == account
                    && op.balance_key == key
            })
            .into_iter()
            .max_by_key(recency))
    }

    async fn find_last_operations_for_account_before_timestamp(
        &self,
        ctx: &RequestContext,
        org: OrganizationId,
        ledger: LedgerId,
        account: AccountId,
        at: DateTime<Utc>,
    ) -> StoreResult<Vec<Operation>> {
        ensure_live(ctx)?;
        let mut latest: BTreeMap<String, Operation> = BTreeMap::new();
        for op in self.matching(ctx.tenant(), at, |op| {
            op.organization_id == org && op.ledger_id == ledger && op.account_id == account
        }) {
            match latest.get(&op.balance_key) {
                Some(current) if recency(current) >= recency(&op) => {}
                _ => {
                    latest.insert(op.balance_key.clone(), op);
                }
            }
        }
        Ok(latest.into_values().collect())
    }
}

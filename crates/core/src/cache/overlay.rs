//! Read-through overlay of recently written balance figures.
//!
//! After every committed write the manager projects the balance's numeric fields into
//! the tenant's cache partition. Reads apply that projection over the store row when it
//! is at least as new, so a reader hitting a lagging replica still sees the last write.

use chrono::{DateTime, Utc};
use ledgerline_shared::types::{BalanceId, LedgerId, OrganizationId};
use ledgerline_shared::{Interrupted, RequestContext};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::backend::CacheError;
use super::registry::TenantCacheRegistry;
use crate::balance::Balance;

/// Numeric balance fields as cached after a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedBalance {
    /// Available funds.
    pub available: Decimal,
    /// Held funds.
    pub on_hold: Decimal,
    /// Version of the write that produced this entry.
    pub version: i64,
    /// Time of that write.
    pub updated_at: DateTime<Utc>,
}

impl From<&Balance> for CachedBalance {
    fn from(balance: &Balance) -> Self {
        Self {
            available: balance.available,
            on_hold: balance.on_hold,
            version: balance.version,
            updated_at: balance.updated_at,
        }
    }
}

impl CachedBalance {
    /// Applies this entry over `balance` if it is at least as new.
    #[must_use]
    pub fn overlay(self, mut balance: Balance) -> Balance {
        if self.version >= balance.version {
            balance.available = self.available;
            balance.on_hold = self.on_hold;
            balance.version = self.version;
            balance.updated_at = balance.updated_at.max(self.updated_at);
        }
        balance
    }
}

/// Balance overlay backed by per-tenant cache partitions.
#[derive(Debug, Clone)]
pub struct BalanceCacheOverlay {
    registry: TenantCacheRegistry,
}

impl BalanceCacheOverlay {
    /// Creates an overlay over `registry`.
    #[must_use]
    pub fn new(registry: TenantCacheRegistry) -> Self {
        Self { registry }
    }

    /// The registry holding the partitions.
    #[must_use]
    pub fn registry(&self) -> &TenantCacheRegistry {
        &self.registry
    }

    /// Deterministic cache key of a balance.
    #[must_use]
    pub fn key(org: OrganizationId, ledger: LedgerId, id: BalanceId) -> String {
        format!("balance:{org}:{ledger}:{id}")
    }

    fn key_of(balance: &Balance) -> String {
        Self::key(balance.organization_id, balance.ledger_id, balance.id)
    }

    /// Reads the cached entry for `balance`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails, the entry is malformed, or the request is
    /// interrupted.
    pub async fn load(
        &self,
        ctx: &RequestContext,
        balance: &Balance,
    ) -> Result<Option<CachedBalance>, CacheError> {
        let cache = self.registry.partition(ctx.tenant()).await;
        let raw = ctx.guard(cache.get(&Self::key_of(balance))).await?;
        raw.as_deref().map(decode).transpose()
    }

    /// Reads the cached entries for `balances` in one round trip.
    ///
    /// Malformed entries are logged and treated as misses.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails or the request is interrupted.
    pub async fn load_many(
        &self,
        ctx: &RequestContext,
        balances: &[Balance],
    ) -> Result<Vec<Option<CachedBalance>>, CacheError> {
        if balances.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = balances.iter().map(Self::key_of).collect();
        let cache = self.registry.partition(ctx.tenant()).await;
        let raw = ctx.guard(cache.mget(&keys)).await?;

        Ok(raw
            .into_iter()
            .zip(&keys)
            .map(|(value, key)| {
                value.as_deref().and_then(|v| match decode(v) {
                    Ok(entry) => Some(entry),
                    Err(e) => {
                        warn!(error = %e, key = %key, "discarding malformed balance cache entry");
                        None
                    }
                })
            })
            .collect())
    }

    /// Applies the cached entry over `balance`.
    ///
    /// Cache failures fall back to the store row; only interruption is propagated.
    ///
    /// # Errors
    ///
    /// Returns an error if the request is interrupted while reading the cache.
    pub async fn apply(&self, ctx: &RequestContext, balance: Balance) -> Result<Balance, Interrupted> {
        match self.load(ctx, &balance).await {
            Ok(Some(cached)) => Ok(cached.overlay(balance)),
            Ok(None) => Ok(balance),
            Err(CacheError::Interrupted(reason)) => Err(reason),
            Err(e) => {
                warn!(error = %e, balance_id = %balance.id, "balance cache read failed, using store value");
                Ok(balance)
            }
        }
    }

    /// Applies cached entries over every balance, fetched with a single `mget`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request is interrupted while reading the cache.
    pub async fn apply_many(
        &self,
        ctx: &RequestContext,
        balances: Vec<Balance>,
    ) -> Result<Vec<Balance>, Interrupted> {
        match self.load_many(ctx, &balances).await {
            Ok(entries) => Ok(balances
                .into_iter()
                .zip(entries)
                .map(|(balance, cached)| match cached {
                    Some(cached) => cached.overlay(balance),
                    None => balance,
                })
                .collect()),
            Err(CacheError::Interrupted(reason)) => Err(reason),
            Err(e) => {
                warn!(error = %e, count = balances.len(), "balance cache read failed, using store values");
                Ok(balances)
            }
        }
    }

    /// Projects a committed balance into the cache.
    ///
    /// Runs after the store commit, so it ignores cancellation; failures are logged.
    pub async fn store(&self, ctx: &RequestContext, balance: &Balance) {
        let cache = self.registry.partition(ctx.tenant()).await;
        let key = Self::key_of(balance);
        let value = match serde_json::to_string(&CachedBalance::from(balance)) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, key = %key, "failed to encode balance cache entry");
                return;
            }
        };
        if let Err(e) = cache.set(&key, value).await {
            warn!(error = %e, key = %key, "failed to write balance cache entry");
        }
    }

    /// Removes a balance's entry. Failures are logged.
    pub async fn evict(&self, ctx: &RequestContext, org: OrganizationId, ledger: LedgerId, id: BalanceId) {
        let cache = self.registry.partition(ctx.tenant()).await;
        let key = Self::key(org, ledger, id);
        if let Err(e) = cache.delete(&key).await {
            warn!(error = %e, key = %key, "failed to evict balance cache entry");
        }
    }
}

fn decode(raw: &str) -> Result<CachedBalance, CacheError> {
    serde_json::from_str(raw).map_err(|e| CacheError::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::balance::DEFAULT_BALANCE_KEY;
    use ledgerline_shared::TenantKey;
    use ledgerline_shared::config::CacheConfig;
    use ledgerline_shared::types::AccountId;
    use rust_decimal_macros::dec;

    fn balance(version: i64, available: Decimal) -> Balance {
        let now = Utc::now();
        Balance {
            id: BalanceId::new(),
            organization_id: OrganizationId::new(),
            ledger_id: LedgerId::new(),
            account_id: AccountId::new(),
            alias: "@alice".to_string(),
            key: DEFAULT_BALANCE_KEY.to_string(),
            available,
            on_hold: dec!(0),
            asset_code: "BRL".to_string(),
            scale: 2,
            account_type: "deposit".to_string(),
            version,
            allow_sending: true,
            allow_receiving: true,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    fn overlay() -> BalanceCacheOverlay {
        BalanceCacheOverlay::new(TenantCacheRegistry::for_balances(&CacheConfig::default()))
    }

    #[test]
    fn test_key_layout() {
        let b = balance(1, dec!(0));
        assert_eq!(
            BalanceCacheOverlay::key(b.organization_id, b.ledger_id, b.id),
            format!("balance:{}:{}:{}", b.organization_id, b.ledger_id, b.id)
        );
    }

    #[test]
    fn test_newer_entry_wins() {
        let stale = balance(3, dec!(10));
        let cached = CachedBalance {
            available: dec!(25),
            on_hold: dec!(5),
            version: 4,
            updated_at: Utc::now(),
        };

        let merged = cached.overlay(stale);
        assert_eq!(merged.available, dec!(25));
        assert_eq!(merged.on_hold, dec!(5));
        assert_eq!(merged.version, 4);
    }

    #[test]
    fn test_older_entry_is_ignored() {
        let fresh = balance(5, dec!(10));
        let cached = CachedBalance {
            available: dec!(99),
            on_hold: dec!(0),
            version: 4,
            updated_at: Utc::now(),
        };

        let merged = cached.overlay(fresh.clone());
        assert_eq!(merged, fresh);
    }

    #[tokio::test]
    async fn test_store_then_apply() {
        let overlay = overlay();
        let ctx = RequestContext::for_default_tenant();

        let written = balance(2, dec!(50));
        overlay.store(&ctx, &written).await;

        let mut lagging = written.clone();
        lagging.available = dec!(0);
        lagging.version = 1;

        let read = overlay.apply(&ctx, lagging).await.unwrap();
        assert_eq!(read.available, dec!(50));
        assert_eq!(read.version, 2);

        overlay.evict(&ctx, written.organization_id, written.ledger_id, written.id).await;
        assert_eq!(overlay.load(&ctx, &written).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_entries_are_tenant_scoped() {
        let overlay = overlay();
        let acme = RequestContext::new(TenantKey::new("acme"));
        let globex = RequestContext::new(TenantKey::new("globex"));

        let b = balance(1, dec!(7));
        overlay.store(&acme, &b).await;

        assert!(overlay.load(&acme, &b).await.unwrap().is_some());
        assert!(overlay.load(&globex, &b).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_apply_many_single_round_trip() {
        let overlay = overlay();
        let ctx = RequestContext::for_default_tenant();

        let a = balance(2, dec!(1));
        let b = balance(1, dec!(2));
        let mut cached_a = a.clone();
        cached_a.available = dec!(100);
        overlay.store(&ctx, &cached_a).await;

        let merged = overlay.apply_many(&ctx, vec![a, b.clone()]).await.unwrap();
        assert_eq!(merged[0].available, dec!(100));
        assert_eq!(merged[1], b);
        assert!(overlay.apply_many(&ctx, Vec::new()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_entry_is_a_miss_in_batches() {
        let overlay = overlay();
        let ctx = RequestContext::for_default_tenant();
        let b = balance(1, dec!(3));

        overlay
            .registry()
            .partition(ctx.tenant())
            .await
            .set(&BalanceCacheOverlay::key_of(&b), "not json".to_string())
            .await
            .unwrap();

        assert!(matches!(
            overlay.load(&ctx, &b).await,
            Err(CacheError::Serialization(_))
        ));
        assert_eq!(overlay.apply_many(&ctx, vec![b.clone()]).await.unwrap(), vec![b.clone()]);
        assert_eq!(overlay.apply(&ctx, b.clone()).await.unwrap(), b);
    }

    #[tokio::test]
    async fn test_apply_reports_cancellation() {
        let overlay = overlay();
        let ctx = RequestContext::for_default_tenant();
        ctx.cancellation().cancel();

        assert_eq!(
            overlay.apply(&ctx, balance(1, dec!(0))).await,
            Err(Interrupted::Cancelled)
        );
    }
}

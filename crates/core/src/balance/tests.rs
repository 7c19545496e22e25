//! Balance manager tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ledgerline_shared::config::CacheConfig;
use ledgerline_shared::types::{AccountId, BalanceId, Cursor, LedgerId, ListQuery, OrganizationId};
use ledgerline_shared::{DomainError, ErrorKind, Interrupted, RequestContext, TenantKey};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::*;
use crate::cache::{BalanceCacheOverlay, CacheBackend, CacheError, TenantCacheRegistry};
use crate::memory::InMemoryBalanceStore;
use crate::store::{BalanceStore, StoreResult};

struct Fixture {
    store: Arc<InMemoryBalanceStore>,
    manager: BalanceManager,
    ctx: RequestContext,
    org: OrganizationId,
    ledger: LedgerId,
}

fn overlay() -> BalanceCacheOverlay {
    BalanceCacheOverlay::new(TenantCacheRegistry::for_balances(&CacheConfig::default()))
}

fn fixture() -> Fixture {
    let store = Arc::new(InMemoryBalanceStore::new());
    Fixture {
        manager: BalanceManager::new(store.clone(), overlay()),
        store,
        ctx: RequestContext::for_default_tenant(),
        org: OrganizationId::new(),
        ledger: LedgerId::new(),
    }
}

fn default_balance(
    org: OrganizationId,
    ledger: LedgerId,
    alias: &str,
    account_type: &str,
    available: Decimal,
) -> Balance {
    let now = Utc::now();
    Balance {
        id: BalanceId::new(),
        organization_id: org,
        ledger_id: ledger,
        account_id: AccountId::new(),
        alias: alias.to_string(),
        key: DEFAULT_BALANCE_KEY.to_string(),
        available,
        on_hold: dec!(0),
        asset_code: "BRL".to_string(),
        scale: 2,
        account_type: account_type.to_string(),
        version: 1,
        allow_sending: true,
        allow_receiving: false,
        created_at: now,
        updated_at: now,
        deleted_at: None,
    }
}

impl Fixture {
    async fn seed(&self, alias: &str, account_type: &str, available: Decimal) -> Balance {
        self.store
            .create(
                &self.ctx,
                default_balance(self.org, self.ledger, alias, account_type, available),
            )
            .await
            .unwrap()
    }
}

/// Serves reads from a frozen snapshot, like a replica that has not caught up.
struct LaggingReplica {
    primary: Arc<InMemoryBalanceStore>,
    snapshot: Mutex<Option<Balance>>,
}

impl LaggingReplica {
    fn freeze(&self, balance: Balance) {
        *self.snapshot.lock().unwrap() = Some(balance);
    }
}

#[async_trait]
impl BalanceStore for LaggingReplica {
    async fn find(
        &self,
        ctx: &RequestContext,
        org: OrganizationId,
        ledger: LedgerId,
        id: BalanceId,
    ) -> StoreResult<Balance> {
        let frozen = self.snapshot.lock().unwrap().clone();
        match frozen {
            Some(balance) if balance.id == id => Ok(balance),
            _ => self.primary.find(ctx, org, ledger, id).await,
        }
    }

    async fn find_by_account_and_key(
        &self,
        ctx: &RequestContext,
        org: OrganizationId,
        ledger: LedgerId,
        account: AccountId,
        key: &str,
    ) -> StoreResult<Option<Balance>> {
        self.primary
            .find_by_account_and_key(ctx, org, ledger, account, key)
            .await
    }

    async fn find_by_alias_and_key(
        &self,
        ctx: &RequestContext,
        org: OrganizationId,
        ledger: LedgerId,
        alias: &str,
        key: &str,
    ) -> StoreResult<Option<Balance>> {
        self.primary
            .find_by_alias_and_key(ctx, org, ledger, alias, key)
            .await
    }

    async fn create(&self, ctx: &RequestContext, balance: Balance) -> StoreResult<Balance> {
        self.primary.create(ctx, balance).await
    }

    async fn update_returning(
        &self,
        ctx: &RequestContext,
        org: OrganizationId,
        ledger: LedgerId,
        id: BalanceId,
        mutation: &BalanceMutation,
    ) -> StoreResult<Balance> {
        self.primary
            .update_returning(ctx, org, ledger, id, mutation)
            .await
    }

    async fn delete(
        &self,
        ctx: &RequestContext,
        org: OrganizationId,
        ledger: LedgerId,
        id: BalanceId,
        expected_version: i64,
    ) -> StoreResult<()> {
        self.primary
            .delete(ctx, org, ledger, id, expected_version)
            .await
    }

    async fn list_all(
        &self,
        ctx: &RequestContext,
        org: OrganizationId,
        ledger: LedgerId,
        query: &ListQuery,
    ) -> StoreResult<Vec<Balance>> {
        self.primary.list_all(ctx, org, ledger, query).await
    }

    async fn list_by_account(
        &self,
        ctx: &RequestContext,
        org: OrganizationId,
        ledger: LedgerId,
        account: AccountId,
        query: &ListQuery,
    ) -> StoreResult<Vec<Balance>> {
        self.primary
            .list_by_account(ctx, org, ledger, account, query)
            .await
    }

    async fn list_by_aliases(
        &self,
        ctx: &RequestContext,
        org: OrganizationId,
        ledger: LedgerId,
        aliases: &[String],
    ) -> StoreResult<Vec<Balance>> {
        self.primary.list_by_aliases(ctx, org, ledger, aliases).await
    }

    async fn list_by_account_at_timestamp(
        &self,
        ctx: &RequestContext,
        org: OrganizationId,
        ledger: LedgerId,
        account: AccountId,
        at: DateTime<Utc>,
    ) -> StoreResult<Vec<Balance>> {
        self.primary
            .list_by_account_at_timestamp(ctx, org, ledger, account, at)
            .await
    }
}

/// Cache backend that is always down.
struct UnavailableCache;

#[async_trait]
impl CacheBackend for UnavailableCache {
    async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
        Err(CacheError::Unavailable("connection refused".to_string()))
    }

    async fn mget(&self, _keys: &[String]) -> Result<Vec<Option<String>>, CacheError> {
        Err(CacheError::Unavailable("connection refused".to_string()))
    }

    async fn set(&self, _key: &str, _value: String) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("connection refused".to_string()))
    }

    async fn delete(&self, _key: &str) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("connection refused".to_string()))
    }
}

fn deposit(amount: Decimal) -> BalanceAdjustment {
    BalanceAdjustment {
        available: amount,
        ..BalanceAdjustment::default()
    }
}

// ========== find ==========

#[tokio::test]
async fn test_find_is_idempotent() {
    let f = fixture();
    let seeded = f.seed("@alice", "deposit", dec!(100)).await;

    let first = f.manager.find(&f.ctx, f.org, f.ledger, seeded.id).await.unwrap();
    let second = f.manager.find(&f.ctx, f.org, f.ledger, seeded.id).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first, seeded);
}

#[tokio::test]
async fn test_find_missing() {
    let f = fixture();
    let id = BalanceId::new();
    let err = f.manager.find(&f.ctx, f.org, f.ledger, id).await.unwrap_err();
    assert_eq!(err, BalanceError::NotFound(id));
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_find_is_scoped_to_ledger_and_tenant() {
    let f = fixture();
    let seeded = f.seed("@alice", "deposit", dec!(1)).await;

    let other_ledger = f.manager.find(&f.ctx, f.org, LedgerId::new(), seeded.id).await;
    assert!(matches!(other_ledger, Err(BalanceError::NotFound(_))));

    let other_tenant = RequestContext::new(TenantKey::new("globex"));
    let cross = f.manager.find(&other_tenant, f.org, f.ledger, seeded.id).await;
    assert!(matches!(cross, Err(BalanceError::NotFound(_))));
}

#[tokio::test]
async fn test_find_by_alias() {
    let f = fixture();
    let seeded = f.seed("@alice", "deposit", dec!(5)).await;

    let found = f
        .manager
        .find_by_alias(&f.ctx, f.org, f.ledger, "@alice", "DEFAULT")
        .await
        .unwrap();
    assert_eq!(found.id, seeded.id);

    let missing = f
        .manager
        .find_by_alias(&f.ctx, f.org, f.ledger, "@bob", "default")
        .await;
    assert!(matches!(missing, Err(BalanceError::AliasNotFound { .. })));
}

// ========== update / adjust ==========

#[tokio::test]
async fn test_update_permissions_bumps_version() {
    let f = fixture();
    let seeded = f.seed("@alice", "deposit", dec!(10)).await;

    let patch = BalancePatch {
        allow_sending: Some(false),
        allow_receiving: Some(true),
        expected_version: Some(seeded.version),
    };
    let updated = f
        .manager
        .update(&f.ctx, f.org, f.ledger, seeded.id, patch)
        .await
        .unwrap();

    assert!(!updated.allow_sending);
    assert!(updated.allow_receiving);
    assert_eq!(updated.version, seeded.version + 1);
    assert_eq!(updated.available, dec!(10));

    let stored = f.store.find(&f.ctx, f.org, f.ledger, seeded.id).await.unwrap();
    assert_eq!(stored, updated);
}

#[tokio::test]
async fn test_update_rejects_empty_patch() {
    let f = fixture();
    let seeded = f.seed("@alice", "deposit", dec!(10)).await;

    let err = f
        .manager
        .update(&f.ctx, f.org, f.ledger, seeded.id, BalancePatch::default())
        .await
        .unwrap_err();
    assert_eq!(err, BalanceError::EmptyPatch);
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn test_update_missing_balance() {
    let f = fixture();
    let patch = BalancePatch {
        allow_sending: Some(true),
        ..BalancePatch::default()
    };
    let id = BalanceId::new();
    assert_eq!(
        f.manager.update(&f.ctx, f.org, f.ledger, id, patch).await,
        Err(BalanceError::NotFound(id))
    );
}

#[tokio::test]
async fn test_adjust_rejects_zero() {
    let f = fixture();
    let seeded = f.seed("@alice", "deposit", dec!(10)).await;
    assert_eq!(
        f.manager
            .adjust(&f.ctx, f.org, f.ledger, seeded.id, deposit(dec!(0)))
            .await,
        Err(BalanceError::EmptyAdjustment)
    );
}

#[tokio::test]
async fn test_adjust_overflow_is_rejected() {
    let f = fixture();
    let seeded = f.seed("@whale", "deposit", Decimal::MAX).await;

    let err = f
        .manager
        .adjust(&f.ctx, f.org, f.ledger, seeded.id, deposit(Decimal::MAX))
        .await
        .unwrap_err();
    assert_eq!(err, BalanceError::AmountOverflow(seeded.id));
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(err.error_code(), "AMOUNT_OVERFLOW");

    let stored = f.manager.find(&f.ctx, f.org, f.ledger, seeded.id).await.unwrap();
    assert_eq!(stored.available, Decimal::MAX);
    assert_eq!(stored.version, seeded.version);
}

#[tokio::test]
async fn test_stale_version_conflicts() {
    let f = fixture();
    let seeded = f.seed("@alice", "deposit", dec!(10)).await;

    let pinned = BalanceAdjustment {
        expected_version: Some(seeded.version),
        ..deposit(dec!(5))
    };
    f.manager
        .adjust(&f.ctx, f.org, f.ledger, seeded.id, pinned)
        .await
        .unwrap();

    let err = f
        .manager
        .adjust(&f.ctx, f.org, f.ledger, seeded.id, pinned)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BalanceError::VersionConflict {
            expected: 1,
            actual: 2,
            ..
        }
    ));
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[tokio::test]
async fn test_concurrent_writers_at_same_version_lose_nothing() {
    let f = fixture();
    let seeded = f.seed("@alice", "deposit", dec!(100)).await;

    let first = BalanceAdjustment {
        expected_version: Some(seeded.version),
        ..deposit(dec!(-30))
    };
    let second = BalanceAdjustment {
        expected_version: Some(seeded.version),
        ..deposit(dec!(-50))
    };

    let (a, b) = tokio::join!(
        f.manager.adjust(&f.ctx, f.org, f.ledger, seeded.id, first),
        f.manager.adjust(&f.ctx, f.org, f.ledger, seeded.id, second),
    );

    let outcomes = [a, b];
    let winners: Vec<&Balance> = outcomes.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(winners.len(), 1);
    assert!(
        outcomes
            .iter()
            .any(|r| matches!(r, Err(BalanceError::VersionConflict { .. })))
    );

    let stored = f.store.find(&f.ctx, f.org, f.ledger, seeded.id).await.unwrap();
    assert_eq!(stored.version, seeded.version + 1);
    assert_eq!(stored.available, winners[0].available);
}

// ========== overlay ==========

#[tokio::test]
async fn test_lagging_replica_is_masked_by_overlay() {
    let primary = Arc::new(InMemoryBalanceStore::new());
    let replica = Arc::new(LaggingReplica {
        primary: primary.clone(),
        snapshot: Mutex::new(None),
    });
    let manager = BalanceManager::new(replica.clone(), overlay());
    let ctx = RequestContext::for_default_tenant();
    let (org, ledger) = (OrganizationId::new(), LedgerId::new());

    let seeded = primary
        .create(&ctx, default_balance(org, ledger, "@alice", "deposit", dec!(10)))
        .await
        .unwrap();
    replica.freeze(seeded.clone());

    let written = manager
        .adjust(&ctx, org, ledger, seeded.id, deposit(dec!(15)))
        .await
        .unwrap();
    assert_eq!(written.available, dec!(25));

    let read = manager.find(&ctx, org, ledger, seeded.id).await.unwrap();
    assert_eq!(read.available, dec!(25));
    assert_eq!(read.version, written.version);
}

#[tokio::test]
async fn test_cache_outage_does_not_fail_writes() {
    let store = Arc::new(InMemoryBalanceStore::new());
    let registry = TenantCacheRegistry::new(10, |_| Arc::new(UnavailableCache));
    let manager = BalanceManager::new(store.clone(), BalanceCacheOverlay::new(registry));
    let ctx = RequestContext::for_default_tenant();
    let (org, ledger) = (OrganizationId::new(), LedgerId::new());

    let seeded = store
        .create(&ctx, default_balance(org, ledger, "@alice", "deposit", dec!(10)))
        .await
        .unwrap();

    let written = manager
        .adjust(&ctx, org, ledger, seeded.id, deposit(dec!(1)))
        .await
        .unwrap();
    assert_eq!(written.available, dec!(11));

    let read = manager.find(&ctx, org, ledger, seeded.id).await.unwrap();
    assert_eq!(read, written);

    let page = manager
        .list_all(&ctx, org, ledger, &ListQuery::default())
        .await
        .unwrap();
    assert_eq!(page.items, vec![written]);
}

// ========== delete ==========

#[tokio::test]
async fn test_delete_refuses_funded_balance() {
    let f = fixture();
    let seeded = f.seed("@alice", "deposit", dec!(0)).await;
    f.manager
        .adjust(
            &f.ctx,
            f.org,
            f.ledger,
            seeded.id,
            BalanceAdjustment {
                on_hold: dec!(3),
                ..BalanceAdjustment::default()
            },
        )
        .await
        .unwrap();

    let err = f
        .manager
        .delete(&f.ctx, f.org, f.ledger, seeded.id)
        .await
        .unwrap_err();
    assert!(matches!(err, BalanceError::NonZeroFunds { .. }));
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert!(f.store.find(&f.ctx, f.org, f.ledger, seeded.id).await.is_ok());
}

#[tokio::test]
async fn test_delete_empty_balance() {
    let f = fixture();
    let seeded = f.seed("@alice", "deposit", dec!(0)).await;

    f.manager
        .delete(&f.ctx, f.org, f.ledger, seeded.id)
        .await
        .unwrap();

    assert_eq!(
        f.manager.find(&f.ctx, f.org, f.ledger, seeded.id).await,
        Err(BalanceError::NotFound(seeded.id))
    );
}

#[tokio::test]
async fn test_delete_loses_race_with_deposit() {
    let primary = Arc::new(InMemoryBalanceStore::new());
    let replica = Arc::new(LaggingReplica {
        primary: primary.clone(),
        snapshot: Mutex::new(None),
    });
    let manager = BalanceManager::new(replica.clone(), overlay());
    let ctx = RequestContext::for_default_tenant();
    let (org, ledger) = (OrganizationId::new(), LedgerId::new());

    let seeded = primary
        .create(&ctx, default_balance(org, ledger, "@alice", "deposit", dec!(0)))
        .await
        .unwrap();
    replica.freeze(seeded.clone());

    // A deposit lands directly on the primary after the empty snapshot was taken.
    primary
        .update_returning(&ctx, org, ledger, seeded.id, &deposit(dec!(40)).into())
        .await
        .unwrap();

    let err = manager.delete(&ctx, org, ledger, seeded.id).await.unwrap_err();
    assert!(matches!(err, BalanceError::VersionConflict { .. }));

    let stored = primary.find(&ctx, org, ledger, seeded.id).await.unwrap();
    assert_eq!(stored.available, dec!(40));
}

// ========== additional balances ==========

#[tokio::test]
async fn test_create_additional_balance_freeze_assets() {
    let f = fixture();
    let default = f.seed("@alice", "deposit", dec!(100)).await;
    let input = CreateAdditionalBalanceInput {
        key: "Freeze-Assets".to_string(),
        allow_sending: None,
        allow_receiving: Some(true),
    };

    let created = f
        .manager
        .create_additional(&f.ctx, f.org, f.ledger, default.account_id, input.clone())
        .await
        .unwrap();

    assert_eq!(created.key, "freeze-assets");
    assert_eq!(created.alias, default.alias);
    assert_eq!(created.asset_code, default.asset_code);
    assert_eq!(created.account_type, default.account_type);
    assert_eq!(created.available, dec!(0));
    assert_eq!(created.on_hold, dec!(0));
    assert_eq!(created.allow_sending, default.allow_sending);
    assert!(created.allow_receiving);
    assert_ne!(created.id, default.id);

    let duplicate = f
        .manager
        .create_additional(&f.ctx, f.org, f.ledger, default.account_id, input)
        .await
        .unwrap_err();
    assert!(matches!(duplicate, BalanceError::DuplicateKey { .. }));
    assert_eq!(duplicate.kind(), ErrorKind::Conflict);
}

#[tokio::test]
async fn test_create_additional_balance_on_external_account() {
    let f = fixture();
    let default = f.seed("@external/BRL", "external", dec!(0)).await;

    let err = f
        .manager
        .create_additional(
            &f.ctx,
            f.org,
            f.ledger,
            default.account_id,
            CreateAdditionalBalanceInput {
                key: "freeze-assets".to_string(),
                ..CreateAdditionalBalanceInput::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err, BalanceError::ExternalAccount(default.account_id));
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn test_create_additional_balance_without_default() {
    let f = fixture();
    let account = AccountId::new();
    let err = f
        .manager
        .create_additional(
            &f.ctx,
            f.org,
            f.ledger,
            account,
            CreateAdditionalBalanceInput {
                key: "savings".to_string(),
                ..CreateAdditionalBalanceInput::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err, BalanceError::DefaultBalanceNotFound(account));
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn test_normalize_key() {
    assert_eq!(normalize_key("  Savings ").unwrap(), "savings");
    assert!(matches!(normalize_key("DEFAULT"), Err(BalanceError::InvalidKey(_))));
    assert!(matches!(normalize_key("   "), Err(BalanceError::InvalidKey(_))));
    assert!(normalize_key(&"k".repeat(MAX_BALANCE_KEY_LEN)).is_ok());
    assert!(normalize_key(&"k".repeat(MAX_BALANCE_KEY_LEN + 1)).is_err());
}

// ========== lists ==========

#[tokio::test]
async fn test_list_all_pages_with_overlay() {
    let f = fixture();
    let mut seeded = Vec::new();
    for alias in ["@a", "@b", "@c"] {
        seeded.push(f.seed(alias, "deposit", dec!(1)).await);
    }
    seeded.sort_by_key(|b| b.id);
    f.manager
        .adjust(&f.ctx, f.org, f.ledger, seeded[0].id, deposit(dec!(9)))
        .await
        .unwrap();

    let first = f
        .manager
        .list_all(&f.ctx, f.org, f.ledger, &ListQuery::with_limit(2))
        .await
        .unwrap();
    assert_eq!(first.items.len(), 2);
    assert_eq!(first.items[0].id, seeded[0].id);
    assert_eq!(first.items[0].available, dec!(10));
    assert!(first.prev_cursor.is_none());

    let cursor = Cursor::decode(first.next_cursor.as_deref().unwrap()).unwrap();
    let next = ListQuery {
        cursor: Some(cursor),
        ..ListQuery::with_limit(2)
    };
    let second = f.manager.list_all(&f.ctx, f.org, f.ledger, &next).await.unwrap();
    assert_eq!(second.items.len(), 1);
    assert_eq!(second.items[0].id, seeded[2].id);
    assert!(second.next_cursor.is_none());
    assert!(second.prev_cursor.is_some());
}

#[tokio::test]
async fn test_list_by_account_and_aliases() {
    let f = fixture();
    let alice = f.seed("@alice", "deposit", dec!(1)).await;
    let bob = f.seed("@bob", "deposit", dec!(2)).await;
    f.manager
        .create_additional(
            &f.ctx,
            f.org,
            f.ledger,
            alice.account_id,
            CreateAdditionalBalanceInput {
                key: "savings".to_string(),
                ..CreateAdditionalBalanceInput::default()
            },
        )
        .await
        .unwrap();

    let page = f
        .manager
        .list_all_by_account(&f.ctx, f.org, f.ledger, alice.account_id, &ListQuery::default())
        .await
        .unwrap();
    assert_eq!(page.items.len(), 2);
    assert!(page.items.iter().all(|b| b.account_id == alice.account_id));

    let by_alias = f
        .manager
        .list_by_aliases(&f.ctx, f.org, f.ledger, &["@bob".to_string()])
        .await
        .unwrap();
    assert_eq!(by_alias, vec![bob]);
    assert!(
        f.manager
            .list_by_aliases(&f.ctx, f.org, f.ledger, &[])
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn test_list_rejects_metadata_filter() {
    let f = fixture();
    let mut query = ListQuery::default();
    query.metadata = Some([("team".to_string(), "ops".to_string())].into());

    assert_eq!(
        f.manager.list_all(&f.ctx, f.org, f.ledger, &query).await,
        Err(BalanceError::MetadataFilterUnsupported)
    );
}

// ========== cancellation ==========

#[tokio::test]
async fn test_cancelled_request_has_no_effect() {
    let f = fixture();
    let seeded = f.seed("@alice", "deposit", dec!(10)).await;

    let cancelled = RequestContext::for_default_tenant();
    cancelled.cancellation().cancel();

    let err = f
        .manager
        .adjust(&cancelled, f.org, f.ledger, seeded.id, deposit(dec!(5)))
        .await
        .unwrap_err();
    assert_eq!(err, BalanceError::Interrupted(Interrupted::Cancelled));
    assert_eq!(err.kind(), ErrorKind::Cancelled);

    let stored = f.store.find(&f.ctx, f.org, f.ledger, seeded.id).await.unwrap();
    assert_eq!(stored, seeded);
}

#[test]
fn test_error_maps_to_app_error() {
    let app: ledgerline_shared::AppError = BalanceError::EmptyPatch.into();
    assert_eq!(app.status_code(), 400);

    let app: ledgerline_shared::AppError = BalanceError::Store("disk on fire".to_string()).into();
    assert_eq!(app.status_code(), 500);
    assert!(!app.to_string().contains("disk on fire"));
}

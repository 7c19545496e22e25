//! Per-tenant cache partitions.

use std::sync::Arc;

use ledgerline_shared::TenantKey;
use ledgerline_shared::config::CacheConfig;
use moka::future::Cache;
use tracing::info;

use super::backend::{CacheBackend, MokaCacheBackend};

type BackendFactory = dyn Fn(&TenantKey) -> Arc<dyn CacheBackend> + Send + Sync;

/// Hands out one cache backend per tenant, creating partitions on first use.
///
/// Invalidating a tenant drops its whole partition; the next request for that tenant
/// starts from an empty cache.
#[derive(Clone)]
pub struct TenantCacheRegistry {
    partitions: Cache<TenantKey, Arc<dyn CacheBackend>>,
    factory: Arc<BackendFactory>,
}

impl TenantCacheRegistry {
    /// Creates a registry that builds partitions with `factory`.
    #[must_use]
    pub fn new<F>(max_tenants: u64, factory: F) -> Self
    where
        F: Fn(&TenantKey) -> Arc<dyn CacheBackend> + Send + Sync + 'static,
    {
        Self {
            partitions: Cache::builder().max_capacity(max_tenants).build(),
            factory: Arc::new(factory),
        }
    }

    /// Registry of Moka partitions sized for the balance overlay.
    #[must_use]
    pub fn for_balances(config: &CacheConfig) -> Self {
        let (capacity, ttl) = (config.balance_capacity, config.balance_ttl_secs);
        Self::new(config.max_tenants, move |_| {
            Arc::new(MokaCacheBackend::with_config(capacity, ttl))
        })
    }

    /// Registry of Moka partitions sized for the transaction route cache.
    #[must_use]
    pub fn for_routes(config: &CacheConfig) -> Self {
        let (capacity, ttl) = (config.route_capacity, config.route_ttl_secs);
        Self::new(config.max_tenants, move |_| {
            Arc::new(MokaCacheBackend::with_config(capacity, ttl))
        })
    }

    /// Returns the tenant's partition, creating it if needed.
    pub async fn partition(&self, tenant: &TenantKey) -> Arc<dyn CacheBackend> {
        self.partitions
            .get_with_by_ref(tenant, async { (self.factory)(tenant) })
            .await
    }

    /// Drops one tenant's partition.
    pub async fn invalidate_tenant(&self, tenant: &TenantKey) {
        self.partitions.invalidate(tenant).await;
        info!(tenant = %tenant, "tenant cache partition invalidated");
    }

    /// Drops every partition.
    pub fn invalidate_all(&self) {
        self.partitions.invalidate_all();
        info!("all tenant cache partitions invalidated");
    }

    /// Tenants that currently hold a partition.
    #[must_use]
    pub fn active_tenants(&self) -> Vec<TenantKey> {
        let mut tenants: Vec<TenantKey> = self
            .partitions
            .iter()
            .map(|(tenant, _)| TenantKey::clone(&tenant))
            .collect();
        tenants.sort();
        tenants
    }

    /// Runs cache maintenance tasks.
    pub async fn run_pending_tasks(&self) {
        self.partitions.run_pending_tasks().await;
    }
}

impl std::fmt::Debug for TenantCacheRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantCacheRegistry")
            .field("partitions", &self.partitions.entry_count())
            .finish_non_exhaustive()
    }
}

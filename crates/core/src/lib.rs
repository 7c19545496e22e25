//! Transactional core of the Ledgerline ledger.
//!
//! This crate holds the balance, history and routing logic. It has no web or database
//! dependencies: durable state is reached through the traits in [`store`], and
//! [`memory`] provides in-process implementations of all of them.
//!
//! # Modules
//!
//! - `balance` - Balance manager with optimistic concurrency and the deletion guard
//! - `cache` - Cache backends, per-tenant partitions, and the balance overlay
//! - `history` - Point-in-time balance reconstruction
//! - `routing` - Account rules, routes, and the accounting route cache
//! - `metadata` - Route metadata validation
//! - `store` - Collaborator contracts
//! - `memory` - In-memory store adapters

pub mod balance;
pub mod cache;
pub mod history;
pub mod memory;
pub mod metadata;
pub mod routing;
pub mod store;

use std::sync::Arc;

use ledgerline_shared::config::PaginationConfig;
use ledgerline_shared::types::{ListQuery, QueryError, RawListParams};
use ledgerline_shared::{AppConfig, RequestContext};

use balance::BalanceManager;
use cache::{BalanceCacheOverlay, TenantCacheRegistry};
use history::BalanceHistory;
use memory::{InMemoryBalanceStore, InMemoryMetadataStore, InMemoryOperationLog, InMemoryRouteStore};
use routing::{RoutingService, TransactionRouteCache};
use store::{BalanceStore, MetadataStore, OperationLog, RouteStore};

/// The stores the core runs against.
#[derive(Clone)]
pub struct Stores {
    /// Balance rows.
    pub balances: Arc<dyn BalanceStore>,
    /// Operation log.
    pub operations: Arc<dyn OperationLog>,
    /// Route metadata.
    pub metadata: Arc<dyn MetadataStore>,
    /// Operation and transaction routes.
    pub routes: Arc<dyn RouteStore>,
}

impl Stores {
    /// Fresh in-memory stores.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            balances: Arc::new(InMemoryBalanceStore::new()),
            operations: Arc::new(InMemoryOperationLog::new()),
            metadata: Arc::new(InMemoryMetadataStore::new()),
            routes: Arc::new(InMemoryRouteStore::new()),
        }
    }
}

/// All core services wired from one configuration.
#[derive(Debug, Clone)]
pub struct LedgerCore {
    /// Balance reads and writes.
    pub balances: BalanceManager,
    /// Historical reconstruction.
    pub history: BalanceHistory,
    /// Route management.
    pub routing: RoutingService,
    config: AppConfig,
}

impl LedgerCore {
    /// Wires the services over `stores` with caches sized from `config`.
    #[must_use]
    pub fn new(config: AppConfig, stores: Stores) -> Self {
        let overlay = BalanceCacheOverlay::new(TenantCacheRegistry::for_balances(&config.cache));
        let route_cache = TransactionRouteCache::new(
            TenantCacheRegistry::for_routes(&config.cache),
            Arc::clone(&stores.routes),
        );

        Self {
            balances: BalanceManager::new(Arc::clone(&stores.balances), overlay),
            history: BalanceHistory::new(stores.balances, stores.operations),
            routing: RoutingService::new(stores.routes, stores.metadata, route_cache),
            config,
        }
    }

    /// Builds a request context for the tenant the caller asked for.
    ///
    /// Single-tenant deployments always get the configured default tenant.
    #[must_use]
    pub fn request_context(&self, requested_tenant: Option<&str>) -> RequestContext {
        RequestContext::new(self.config.tenancy.resolve(requested_tenant))
    }

    /// Validates raw list parameters against the configured pagination bounds.
    ///
    /// # Errors
    ///
    /// Returns the first validation failure.
    pub fn list_query(&self, params: RawListParams) -> Result<ListQuery, QueryError> {
        params.validate(&self.pagination())
    }

    /// Configured pagination bounds.
    #[must_use]
    pub fn pagination(&self) -> PaginationConfig {
        self.config.pagination
    }

    /// The configuration the core was built with.
    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}

//! Cached accounting projection of transaction routes.
//!
//! Posting a transaction needs each route's legs and their account rules. That projection
//! is cached per tenant under `accounting_routes:{org}:{ledger}:{route}` and rebuilt from
//! the route store on a miss. Writes after a route commit never fail the commit; their
//! errors are returned to the caller as warnings.

use std::sync::Arc;

use ledgerline_shared::types::{LedgerId, OperationRouteId, OrganizationId, TransactionRouteId};
use ledgerline_shared::{RequestContext, TenantKey};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::error::RoutingError;
use super::rule::AccountRule;
use super::types::{OperationRoute, OperationType, TransactionRoute};
use crate::cache::{CacheError, TenantCacheRegistry};
use crate::store::RouteStore;

/// One leg of a cached transaction route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountingLeg {
    /// Operation route backing the leg.
    pub operation_route_id: OperationRouteId,
    /// Operation route title.
    pub title: String,
    /// Restriction on the accounts allowed to fill the leg.
    pub account: Option<AccountRule>,
}

/// A transaction route as needed at posting time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountingRoute {
    /// Transaction route ID.
    pub transaction_route_id: TransactionRouteId,
    /// Source legs.
    pub source: Vec<AccountingLeg>,
    /// Destination legs.
    pub destination: Vec<AccountingLeg>,
}

impl AccountingRoute {
    /// Projects a transaction route over its operation routes.
    #[must_use]
    pub fn build(route: &TransactionRoute, operation_routes: &[OperationRoute]) -> Self {
        let mut source = Vec::new();
        let mut destination = Vec::new();

        for id in &route.operation_routes {
            let Some(op) = operation_routes.iter().find(|op| op.id == *id) else {
                continue;
            };
            let leg = AccountingLeg {
                operation_route_id: op.id,
                title: op.title.clone(),
                account: op.account.clone(),
            };
            match op.operation_type {
                OperationType::Source => source.push(leg),
                OperationType::Destination => destination.push(leg),
            }
        }

        Self {
            transaction_route_id: route.id,
            source,
            destination,
        }
    }

    /// Legs on one side.
    #[must_use]
    pub fn legs(&self, operation_type: OperationType) -> &[AccountingLeg] {
        match operation_type {
            OperationType::Source => &self.source,
            OperationType::Destination => &self.destination,
        }
    }

    /// Checks that an account may fill some leg on the given side.
    ///
    /// A leg without a rule accepts any account.
    ///
    /// # Errors
    ///
    /// Returns `AccountIneligible` if no leg on that side accepts the account.
    pub fn validate_leg(
        &self,
        operation_type: OperationType,
        alias: &str,
        account_type: &str,
    ) -> Result<(), RoutingError> {
        let eligible = self.legs(operation_type).iter().any(|leg| {
            leg.account
                .as_ref()
                .is_none_or(|rule| rule.matches(alias, account_type))
        });

        if eligible {
            Ok(())
        } else {
            Err(RoutingError::AccountIneligible {
                route_id: self.transaction_route_id,
                operation_type,
                alias: alias.to_string(),
                account_type: account_type.to_string(),
            })
        }
    }
}

/// Per-tenant cache of [`AccountingRoute`]s.
#[derive(Clone)]
pub struct TransactionRouteCache {
    registry: TenantCacheRegistry,
    store: Arc<dyn RouteStore>,
}

impl TransactionRouteCache {
    /// Creates a cache over `registry`, rebuilding misses from `store`.
    #[must_use]
    pub fn new(registry: TenantCacheRegistry, store: Arc<dyn RouteStore>) -> Self {
        Self { registry, store }
    }

    /// Deterministic cache key of a transaction route.
    #[must_use]
    pub fn key(org: OrganizationId, ledger: LedgerId, id: TransactionRouteId) -> String {
        format!("accounting_routes:{org}:{ledger}:{id}")
    }

    /// Writes the projection of `route` into the cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry cannot be encoded or written.
    pub async fn create_accounting_route_cache(
        &self,
        ctx: &RequestContext,
        route: &TransactionRoute,
        operation_routes: &[OperationRoute],
    ) -> Result<(), CacheError> {
        let projection = AccountingRoute::build(route, operation_routes);
        self.put(ctx.tenant(), route.organization_id, route.ledger_id, &projection)
            .await
    }

    /// Rebuilds every cached transaction route that embeds `operation_route`.
    ///
    /// Returns one message per route that could not be refreshed.
    ///
    /// # Errors
    ///
    /// Returns an error if the referencing routes cannot be listed.
    pub async fn reload_operation_route_cache(
        &self,
        ctx: &RequestContext,
        org: OrganizationId,
        ledger: LedgerId,
        operation_route: OperationRouteId,
    ) -> Result<Vec<String>, RoutingError> {
        let routes = ctx
            .guard(
                self.store
                    .list_transaction_routes_by_operation_route(ctx, org, ledger, operation_route),
            )
            .await?;

        let mut failures = Vec::new();
        for route in routes {
            let operation_routes = match ctx
                .guard(
                    self.store
                        .find_operation_routes(ctx, org, ledger, &route.operation_routes),
                )
                .await
            {
                Ok(ops) => ops,
                Err(e) => {
                    failures.push(format!("transaction route {}: {e}", route.id));
                    continue;
                }
            };

            if let Err(e) = self
                .create_accounting_route_cache(ctx, &route, &operation_routes)
                .await
            {
                failures.push(format!("transaction route {}: {e}", route.id));
            }
        }
        Ok(failures)
    }

    /// Removes a transaction route's entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the delete.
    pub async fn delete_transaction_route_cache(
        &self,
        ctx: &RequestContext,
        org: OrganizationId,
        ledger: LedgerId,
        id: TransactionRouteId,
    ) -> Result<(), CacheError> {
        let cache = self.registry.partition(ctx.tenant()).await;
        cache.delete(&Self::key(org, ledger, id)).await
    }

    /// Returns the projection of a transaction route, rebuilding it on a miss.
    ///
    /// Cache read failures and malformed entries are logged and treated as misses.
    ///
    /// # Errors
    ///
    /// Returns `TransactionRouteNotFound` if the route does not exist, or an error if the
    /// store fails or the request is interrupted.
    pub async fn cached_transaction_route(
        &self,
        ctx: &RequestContext,
        org: OrganizationId,
        ledger: LedgerId,
        id: TransactionRouteId,
    ) -> Result<AccountingRoute, RoutingError> {
        let key = Self::key(org, ledger, id);
        let cache = self.registry.partition(ctx.tenant()).await;

        match ctx.guard(cache.get(&key)).await {
            Ok(Some(raw)) => match serde_json::from_str::<AccountingRoute>(&raw) {
                Ok(route) => return Ok(route),
                Err(e) => warn!(error = %e, key = %key, "discarding malformed route cache entry"),
            },
            Ok(None) => {}
            Err(CacheError::Interrupted(reason)) => return Err(reason.into()),
            Err(e) => warn!(error = %e, key = %key, "route cache read failed, rebuilding"),
        }

        let route = ctx
            .guard(self.store.find_transaction_route(ctx, org, ledger, id))
            .await
            .map_err(|e| RoutingError::transaction_route(e, id))?;
        let operation_routes = ctx
            .guard(
                self.store
                    .find_operation_routes(ctx, org, ledger, &route.operation_routes),
            )
            .await?;

        let projection = AccountingRoute::build(&route, &operation_routes);
        if let Err(e) = self.put(ctx.tenant(), org, ledger, &projection).await {
            warn!(error = %e, key = %key, "failed to repopulate route cache");
        }
        Ok(projection)
    }

    /// Drops every cached route of one tenant.
    pub async fn invalidate_tenant(&self, tenant: &TenantKey) {
        self.registry.invalidate_tenant(tenant).await;
    }

    /// Drops every cached route of every tenant.
    pub fn invalidate_all(&self) {
        self.registry.invalidate_all();
    }

    async fn put(
        &self,
        tenant: &TenantKey,
        org: OrganizationId,
        ledger: LedgerId,
        projection: &AccountingRoute,
    ) -> Result<(), CacheError> {
        let value = serde_json::to_string(projection)
            .map_err(|e| CacheError::Serialization(e.to_string()))?;
        let cache = self.registry.partition(tenant).await;
        cache
            .set(&Self::key(org, ledger, projection.transaction_route_id), value)
            .await
    }
}

impl std::fmt::Debug for TransactionRouteCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionRouteCache")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

//! In-memory route store.

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use ledgerline_shared::types::{
    LedgerId, ListQuery, OperationRouteId, OrganizationId, TransactionRouteId,
};
use ledgerline_shared::{RequestContext, TenantKey};

use super::ensure_live;
use crate::routing::{OperationRoute, TransactionRoute};
use crate::store::{RouteStore, StoreError, StoreResult};

const OPERATION_ROUTE: &str = "operation route";
const TRANSACTION_ROUTE: &str = "transaction route";

/// Operation and transaction routes held in memory.
#[derive(Debug, Default)]
pub struct InMemoryRouteStore {
    operation_routes: DashMap<(TenantKey, OperationRouteId), OperationRoute>,
    transaction_routes: DashMap<(TenantKey, TransactionRouteId), TransactionRoute>,
}

impl InMemoryRouteStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn transaction_routes_where<F>(
        &self,
        tenant: &TenantKey,
        org: OrganizationId,
        ledger: LedgerId,
        predicate: F,
    ) -> Vec<TransactionRoute>
    where
        F: Fn(&TransactionRoute) -> bool,
    {
        let mut routes: Vec<TransactionRoute> = self
            .transaction_routes
            .iter()
            .filter(|e| &e.key().0 == tenant)
            .map(|e| e.value().clone())
            .filter(|r| r.organization_id == org && r.ledger_id == ledger && predicate(r))
            .collect();
        routes.sort_by_key(|r| r.id);
        routes
    }
}

#[async_trait]
impl RouteStore for InMemoryRouteStore {
    async fn create_operation_route(
        &self,
        ctx: &RequestContext,
        route: OperationRoute,
    ) -> StoreResult<OperationRoute> {
        ensure_live(ctx)?;
        match self.operation_routes.entry((ctx.tenant().clone(), route.id)) {
            Entry::Occupied(_) => Err(StoreError::Duplicate {
                entity: OPERATION_ROUTE,
                key: route.id.to_string(),
            }),
            Entry::Vacant(vacant) => Ok(vacant.insert(route).value().clone()),
        }
    }

    async fn update_operation_route(
        &self,
        ctx: &RequestContext,
        route: OperationRoute,
    ) -> StoreResult<OperationRoute> {
        ensure_live(ctx)?;
        let mut row = self
            .operation_routes
            .get_mut(&(ctx.tenant().clone(), route.id))
            .filter(|r| r.organization_id == route.organization_id && r.ledger_id == route.ledger_id)
            .ok_or_else(|| StoreError::not_found(OPERATION_ROUTE, route.id))?;
        *row = route;
        Ok(row.clone())
    }

    async fn delete_operation_route(
        &self,
        ctx: &RequestContext,
        org: OrganizationId,
        ledger: LedgerId,
        id: OperationRouteId,
    ) -> StoreResult<()> {
        ensure_live(ctx)?;
        self.operation_routes
            .remove_if(&(ctx.tenant().clone(), id), |_, r| {
                r.organization_id == org && r.ledger_id == ledger
            })
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found(OPERATION_ROUTE, id))
    }

    async fn find_operation_route(
        &self,
        ctx: &RequestContext,
        org: OrganizationId,
        ledger: LedgerId,
        id: OperationRouteId,
    ) -> StoreResult<OperationRoute> {
        ensure_live(ctx)?;
        self.operation_routes
            .get(&(ctx.tenant().clone(), id))
            .map(|r| r.value().clone())
            .filter(|r| r.organization_id == org && r.ledger_id == ledger)
            .ok_or_else(|| StoreError::not_found(OPERATION_ROUTE, id))
    }

    async fn find_operation_routes(
        &self,
        ctx: &RequestContext,
        org: OrganizationId,
        ledger: LedgerId,
        ids: &[OperationRouteId],
    ) -> StoreResult<Vec<OperationRoute>> {
        ensure_live(ctx)?;
        Ok(ids
            .iter()
            .filter_map(|id| self.operation_routes.get(&(ctx.tenant().clone(), *id)))
            .map(|r| r.value().clone())
            .filter(|r| r.organization_id == org && r.ledger_id == ledger)
            .collect())
    }

    async fn list_operation_routes(
        &self,
        ctx: &RequestContext,
        org: OrganizationId,
        ledger: LedgerId,
        query: &ListQuery,
    ) -> StoreResult<Vec<OperationRoute>> {
        ensure_live(ctx)?;
        let tenant = ctx.tenant();
        let rows = self
            .operation_routes
            .iter()
            .filter(|e| &e.key().0 == tenant)
            .map(|e| e.value().clone())
            .filter(|r| {
                r.organization_id == org
                    && r.ledger_id == ledger
                    && query.admits_created_at(r.created_at)
            })
            .collect::<Vec<_>>();
        Ok(query.window().select(rows, |r| r.id.to_string()))
    }

    async fn create_transaction_route(
        &self,
        ctx: &RequestContext,
        route: TransactionRoute,
    ) -> StoreResult<TransactionRoute> {
        ensure_live(ctx)?;
        match self.transaction_routes.entry((ctx.tenant().clone(), route.id)) {
            Entry::Occupied(_) => Err(StoreError::Duplicate {
                entity: TRANSACTION_ROUTE,
                key: route.id.to_string(),
            }),
            Entry::Vacant(vacant) => Ok(vacant.insert(route).value().clone()),
        }
    }

    async fn update_transaction_route(
        &self,
        ctx: &RequestContext,
        route: TransactionRoute,
    ) -> StoreResult<TransactionRoute> {
        ensure_live(ctx)?;
        let mut row = self
            .transaction_routes
            .get_mut(&(ctx.tenant().clone(), route.id))
            .filter(|r| r.organization_id == route.organization_id && r.ledger_id == route.ledger_id)
            .ok_or_else(|| StoreError::not_found(TRANSACTION_ROUTE, route.id))?;
        *row = route;
        Ok(row.clone())
    }

    async fn delete_transaction_route(
        &self,
        ctx: &RequestContext,
        org: OrganizationId,
        ledger: LedgerId,
        id: TransactionRouteId,
    ) -> StoreResult<()> {
        ensure_live(ctx)?;
        self.transaction_routes
            .remove_if(&(ctx.tenant().clone(), id), |_, r| {
                r.organization_id == org && r.ledger_id == ledger
            })
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found(TRANSACTION_ROUTE, id))
    }

    async fn find_transaction_route(
        &self,
        ctx: &RequestContext,
        org: OrganizationId,
        ledger: LedgerId,
        id: TransactionRouteId,
    ) -> StoreResult<TransactionRoute> {
        ensure_live(ctx)?;
        self.transaction_routes
            .get(&(ctx.tenant().clone(), id))
            .map(|r| r.value().clone())
            .filter(|r| r.organization_id == org && r.ledger_id == ledger)
            .ok_or_else(|| StoreError::not_found(TRANSACTION_ROUTE, id))
    }

    async fn find_transaction_routes(
        &self,
        ctx: &RequestContext,
        org: OrganizationId,
        ledger: LedgerId,
        ids: &[TransactionRouteId],
    ) -> StoreResult<Vec<TransactionRoute>> {
        ensure_live(ctx)?;
        Ok(ids
            .iter()
            .filter_map(|id| self.transaction_routes.get(&(ctx.tenant().clone(), *id)))
            .map(|r| r.value().clone())
            .filter(|r| r.organization_id == org && r.ledger_id == ledger)
            .collect())
    }

    async fn list_transaction_routes(
        &self,
        ctx: &RequestContext,
        org: OrganizationId,
        ledger: LedgerId,
        query: &ListQuery,
    ) -> StoreResult<Vec<TransactionRoute>> {
        ensure_live(ctx)?;
        let rows = self.transaction_routes_where(ctx.tenant(), org, ledger, |r| {
            query.admits_created_at(r.created_at)
        });
        Ok(query.window().select(rows, |r| r.id.to_string()))
    }

    async fn list_transaction_routes_by_operation_route(
        &self,
        ctx: &RequestContext,
        org: OrganizationId,
        ledger: LedgerId,
        operation_route: OperationRouteId,
    ) -> StoreResult<Vec<TransactionRoute>> {
        ensure_live(ctx)?;
        Ok(self.transaction_routes_where(ctx.tenant(), org, ledger, |r| {
            r.operation_routes.contains(&operation_route)
        }))
    }
}

//! Route management: validation, persistence, metadata, and cache upkeep.

use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use futures::future::try_join_all;
use ledgerline_shared::types::{
    CursorPage, LedgerId, ListQuery, OperationRouteId, OrganizationId, TransactionRouteId,
};
use ledgerline_shared::{RequestContext, TenantKey};
use serde_json::{Map, Value};
use tracing::{info, instrument, warn};

use super::cache::{AccountingRoute, TransactionRouteCache};
use super::error::RoutingError;
use super::types::{
    CreateOperationRouteInput, CreateTransactionRouteInput, MAX_DESCRIPTION_LEN, MAX_TITLE_LEN,
    OperationRoute, OperationType, RouteWrite, TransactionRoute, UpdateOperationRouteInput,
    UpdateTransactionRouteInput,
};
use crate::metadata::{MetadataEntity, MetadataRecord, validate_metadata};
use crate::store::{MetadataStore, RouteStore};

/// Operation and transaction route service.
///
/// Every input is validated before any store is touched. Route writes are committed
/// first; the accounting route cache is refreshed afterwards and its failures come back
/// as [`RouteWrite::warnings`].
#[derive(Clone)]
pub struct RoutingService {
    routes: Arc<dyn RouteStore>,
    metadata: Arc<dyn MetadataStore>,
    cache: TransactionRouteCache,
}

impl RoutingService {
    /// Creates a service over the given stores and cache.
    #[must_use]
    pub fn new(
        routes: Arc<dyn RouteStore>,
        metadata: Arc<dyn MetadataStore>,
        cache: TransactionRouteCache,
    ) -> Self {
        Self {
            routes,
            metadata,
            cache,
        }
    }

    // ========== Operation Routes ==========

    /// Creates an operation route.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a bad title, description, operation type, account
    /// rule, or metadata.
    #[instrument(skip_all, fields(tenant = %ctx.tenant()))]
    pub async fn create_operation_route(
        &self,
        ctx: &RequestContext,
        org: OrganizationId,
        ledger: LedgerId,
        input: CreateOperationRouteInput,
    ) -> Result<OperationRoute, RoutingError> {
        let title = validate_title(&input.title)?;
        validate_description(input.description.as_deref())?;
        let operation_type = OperationType::from_str(&input.operation_type)
            .map_err(|_| RoutingError::InvalidOperationType(input.operation_type.clone()))?;
        let account = match &input.account {
            Some(rule) => rule.validate()?,
            None => None,
        };
        if let Some(metadata) = &input.metadata {
            validate_metadata(metadata)?;
        }

        let id = OperationRouteId::new();
        let now = Utc::now();
        let route = OperationRoute {
            id,
            organization_id: org,
            ledger_id: ledger,
            title,
            description: input.description,
            operation_type,
            account,
            metadata: None,
            created_at: now,
            updated_at: now,
        };

        let entity = MetadataEntity::OperationRoute;
        let metadata = self
            .create_metadata(ctx, entity, &id.to_string(), input.metadata)
            .await?;
        let mut created = match ctx.guard(self.routes.create_operation_route(ctx, route)).await {
            Ok(created) => created,
            Err(e) => {
                if metadata.is_some() {
                    self.discard_metadata(ctx, entity, &id.to_string()).await;
                }
                return Err(e.into());
            }
        };
        created.metadata = metadata;

        info!(org_id = %org, operation_route_id = %created.id, "Operation route created");
        Ok(created)
    }

    /// Updates an operation route.
    ///
    /// A changed title or account rule refreshes every cached transaction route that
    /// embeds it.
    ///
    /// # Errors
    ///
    /// Returns a validation error for bad input or `OperationRouteNotFound`.
    #[instrument(skip_all, fields(tenant = %ctx.tenant(), operation_route_id = %id))]
    pub async fn update_operation_route(
        &self,
        ctx: &RequestContext,
        org: OrganizationId,
        ledger: LedgerId,
        id: OperationRouteId,
        input: UpdateOperationRouteInput,
    ) -> Result<RouteWrite<OperationRoute>, RoutingError> {
        let title = input.title.as_deref().map(validate_title).transpose()?;
        validate_description(input.description.as_deref())?;
        let account = match &input.account {
            Some(rule) => Some(rule.validate()?),
            None => None,
        };
        if let Some(metadata) = &input.metadata {
            validate_metadata(metadata)?;
        }

        let mut route = ctx
            .guard(self.routes.find_operation_route(ctx, org, ledger, id))
            .await
            .map_err(|e| RoutingError::operation_route(e, id))?;

        let legs_changed = title.as_ref().is_some_and(|t| *t != route.title)
            || account.as_ref().is_some_and(|rule| *rule != route.account);
        if let Some(title) = title {
            route.title = title;
        }
        if let Some(description) = input.description {
            route.description = Some(description);
        }
        if let Some(rule) = account {
            route.account = rule;
        }
        route.updated_at = Utc::now();

        // Metadata goes first: once the route commits, only cache upkeep may follow.
        let metadata = self
            .replace_metadata(ctx, MetadataEntity::OperationRoute, &id.to_string(), input.metadata)
            .await?;
        let mut updated = ctx
            .guard(self.routes.update_operation_route(ctx, route))
            .await
            .map_err(|e| RoutingError::operation_route(e, id))?;
        updated.metadata = metadata;

        let mut write = RouteWrite::clean(updated);
        if legs_changed {
            match self
                .cache
                .reload_operation_route_cache(ctx, org, ledger, id)
                .await
            {
                Ok(failures) => write.warnings.extend(failures),
                Err(e) => write.warnings.push(e.to_string()),
            }
            for warning in &write.warnings {
                warn!(operation_route_id = %id, warning = %warning, "accounting route cache not refreshed");
            }
        }

        info!(org_id = %org, operation_route_id = %id, "Operation route updated");
        Ok(write)
    }

    /// Deletes an operation route that no transaction route references, and its metadata.
    ///
    /// # Errors
    ///
    /// Returns `OperationRouteNotFound` or `OperationRouteInUse`.
    #[instrument(skip_all, fields(tenant = %ctx.tenant(), operation_route_id = %id))]
    pub async fn delete_operation_route(
        &self,
        ctx: &RequestContext,
        org: OrganizationId,
        ledger: LedgerId,
        id: OperationRouteId,
    ) -> Result<RouteWrite<()>, RoutingError> {
        ctx.guard(self.routes.find_operation_route(ctx, org, ledger, id))
            .await
            .map_err(|e| RoutingError::operation_route(e, id))?;

        let users = ctx
            .guard(
                self.routes
                    .list_transaction_routes_by_operation_route(ctx, org, ledger, id),
            )
            .await?;
        if !users.is_empty() {
            return Err(RoutingError::OperationRouteInUse {
                id,
                count: users.len(),
            });
        }

        ctx.guard(self.routes.delete_operation_route(ctx, org, ledger, id))
            .await
            .map_err(|e| RoutingError::operation_route(e, id))?;

        let mut write = RouteWrite::clean(());
        write.warnings.extend(
            self.discard_metadata(ctx, MetadataEntity::OperationRoute, &id.to_string())
                .await,
        );

        info!(org_id = %org, operation_route_id = %id, "Operation route deleted");
        Ok(write)
    }

    /// Loads an operation route with its metadata.
    ///
    /// # Errors
    ///
    /// Returns `OperationRouteNotFound` if it does not exist.
    pub async fn find_operation_route(
        &self,
        ctx: &RequestContext,
        org: OrganizationId,
        ledger: LedgerId,
        id: OperationRouteId,
    ) -> Result<OperationRoute, RoutingError> {
        let mut route = ctx
            .guard(self.routes.find_operation_route(ctx, org, ledger, id))
            .await
            .map_err(|e| RoutingError::operation_route(e, id))?;
        route.metadata = self
            .load_metadata(ctx, MetadataEntity::OperationRoute, &id.to_string())
            .await?;
        Ok(route)
    }

    /// Lists operation routes, through the metadata store when the query filters on it.
    ///
    /// # Errors
    ///
    /// Returns an error if a store fails or the request is interrupted.
    #[instrument(skip_all, fields(tenant = %ctx.tenant(), limit = query.limit))]
    pub async fn list_operation_routes(
        &self,
        ctx: &RequestContext,
        org: OrganizationId,
        ledger: LedgerId,
        query: &ListQuery,
    ) -> Result<CursorPage<OperationRoute>, RoutingError> {
        let entity = MetadataEntity::OperationRoute;
        let window = query.window();

        let page = if let Some(filter) = &query.metadata {
            let (ids, mut documents) = self.matching_ids::<OperationRouteId>(ctx, entity, filter).await?;
            let rows = ctx
                .guard(self.routes.find_operation_routes(ctx, org, ledger, &ids))
                .await?
                .into_iter()
                .filter(|r| query.admits_created_at(r.created_at));
            let rows = window.select(rows, |r| r.id.to_string());
            CursorPage::assemble(rows, &window, |r| r.id.to_string()).map(|mut r| {
                r.metadata = documents.remove(&r.id.to_string());
                r
            })
        } else {
            let rows = ctx
                .guard(self.routes.list_operation_routes(ctx, org, ledger, query))
                .await?;
            let mut page = CursorPage::assemble(rows, &window, |r| r.id.to_string());
            let documents = self
                .load_many_metadata(ctx, entity, page.items.iter().map(|r| r.id.to_string()))
                .await?;
            for (route, metadata) in page.items.iter_mut().zip(documents) {
                route.metadata = metadata;
            }
            page
        };

        Ok(page)
    }

    // ========== Transaction Routes ==========

    /// Creates a transaction route and caches its accounting projection.
    ///
    /// # Errors
    ///
    /// Returns a validation error for bad input, `OperationRouteNotFound` for an unknown
    /// operation route, or `IncompleteTransactionRoute` without both leg sides.
    #[instrument(skip_all, fields(tenant = %ctx.tenant()))]
    pub async fn create_transaction_route(
        &self,
        ctx: &RequestContext,
        org: OrganizationId,
        ledger: LedgerId,
        input: CreateTransactionRouteInput,
    ) -> Result<RouteWrite<TransactionRoute>, RoutingError> {
        let title = validate_title(&input.title)?;
        validate_description(input.description.as_deref())?;
        if let Some(metadata) = &input.metadata {
            validate_metadata(metadata)?;
        }
        let ids = dedupe(&input.operation_routes);
        let operation_routes = self.resolve_legs(ctx, org, ledger, &ids).await?;

        let id = TransactionRouteId::new();
        let now = Utc::now();
        let route = TransactionRoute {
            id,
            organization_id: org,
            ledger_id: ledger,
            title,
            description: input.description,
            operation_routes: ids,
            metadata: None,
            created_at: now,
            updated_at: now,
        };

        let entity = MetadataEntity::TransactionRoute;
        let metadata = self
            .create_metadata(ctx, entity, &id.to_string(), input.metadata)
            .await?;
        let mut created = match ctx.guard(self.routes.create_transaction_route(ctx, route)).await {
            Ok(created) => created,
            Err(e) => {
                if metadata.is_some() {
                    self.discard_metadata(ctx, entity, &id.to_string()).await;
                }
                return Err(e.into());
            }
        };
        created.metadata = metadata;

        let mut write = RouteWrite::clean(created);
        self.refresh_cache(ctx, &mut write, &operation_routes).await;

        info!(org_id = %org, transaction_route_id = %write.value.id, "Transaction route created");
        Ok(write)
    }

    /// Updates a transaction route and refreshes its cached projection.
    ///
    /// # Errors
    ///
    /// Returns a validation error for bad input, `TransactionRouteNotFound`, or the
    /// same leg errors as creation when the operation routes change.
    #[instrument(skip_all, fields(tenant = %ctx.tenant(), transaction_route_id = %id))]
    pub async fn update_transaction_route(
        &self,
        ctx: &RequestContext,
        org: OrganizationId,
        ledger: LedgerId,
        id: TransactionRouteId,
        input: UpdateTransactionRouteInput,
    ) -> Result<RouteWrite<TransactionRoute>, RoutingError> {
        let title = input.title.as_deref().map(validate_title).transpose()?;
        validate_description(input.description.as_deref())?;
        if let Some(metadata) = &input.metadata {
            validate_metadata(metadata)?;
        }

        let mut route = ctx
            .guard(self.routes.find_transaction_route(ctx, org, ledger, id))
            .await
            .map_err(|e| RoutingError::transaction_route(e, id))?;

        if let Some(ids) = input.operation_routes {
            route.operation_routes = dedupe(&ids);
        }
        let operation_routes = self
            .resolve_legs(ctx, org, ledger, &route.operation_routes)
            .await?;

        if let Some(title) = title {
            route.title = title;
        }
        if let Some(description) = input.description {
            route.description = Some(description);
        }
        route.updated_at = Utc::now();

        let metadata = self
            .replace_metadata(ctx, MetadataEntity::TransactionRoute, &id.to_string(), input.metadata)
            .await?;
        let mut updated = ctx
            .guard(self.routes.update_transaction_route(ctx, route))
            .await
            .map_err(|e| RoutingError::transaction_route(e, id))?;
        updated.metadata = metadata;

        let mut write = RouteWrite::clean(updated);
        self.refresh_cache(ctx, &mut write, &operation_routes).await;

        info!(org_id = %org, transaction_route_id = %id, "Transaction route updated");
        Ok(write)
    }

    /// Deletes a transaction route, its cached projection, and its metadata.
    ///
    /// # Errors
    ///
    /// Returns `TransactionRouteNotFound` if it does not exist.
    #[instrument(skip_all, fields(tenant = %ctx.tenant(), transaction_route_id = %id))]
    pub async fn delete_transaction_route(
        &self,
        ctx: &RequestContext,
        org: OrganizationId,
        ledger: LedgerId,
        id: TransactionRouteId,
    ) -> Result<RouteWrite<()>, RoutingError> {
        ctx.guard(self.routes.delete_transaction_route(ctx, org, ledger, id))
            .await
            .map_err(|e| RoutingError::transaction_route(e, id))?;

        let mut write = RouteWrite::clean(());
        if let Err(e) = self
            .cache
            .delete_transaction_route_cache(ctx, org, ledger, id)
            .await
        {
            warn!(error = %e, transaction_route_id = %id, "failed to evict accounting route cache");
            write.warnings.push(format!("transaction route {id}: {e}"));
        }
        write.warnings.extend(
            self.discard_metadata(ctx, MetadataEntity::TransactionRoute, &id.to_string())
                .await,
        );

        info!(org_id = %org, transaction_route_id = %id, "Transaction route deleted");
        Ok(write)
    }

    /// Loads a transaction route with its metadata.
    ///
    /// # Errors
    ///
    /// Returns `TransactionRouteNotFound` if it does not exist.
    pub async fn find_transaction_route(
        &self,
        ctx: &RequestContext,
        org: OrganizationId,
        ledger: LedgerId,
        id: TransactionRouteId,
    ) -> Result<TransactionRoute, RoutingError> {
        let mut route = ctx
            .guard(self.routes.find_transaction_route(ctx, org, ledger, id))
            .await
            .map_err(|e| RoutingError::transaction_route(e, id))?;
        route.metadata = self
            .load_metadata(ctx, MetadataEntity::TransactionRoute, &id.to_string())
            .await?;
        Ok(route)
    }

    /// Lists transaction routes, through the metadata store when the query filters on it.
    ///
    /// # Errors
    ///
    /// Returns an error if a store fails or the request is interrupted.
    #[instrument(skip_all, fields(tenant = %ctx.tenant(), limit = query.limit))]
    pub async fn list_transaction_routes(
        &self,
        ctx: &RequestContext,
        org: OrganizationId,
        ledger: LedgerId,
        query: &ListQuery,
    ) -> Result<CursorPage<TransactionRoute>, RoutingError> {
        let entity = MetadataEntity::TransactionRoute;
        let window = query.window();

        let page = if let Some(filter) = &query.metadata {
            let (ids, mut documents) = self.matching_ids::<TransactionRouteId>(ctx, entity, filter).await?;
            let rows = ctx
                .guard(self.routes.find_transaction_routes(ctx, org, ledger, &ids))
                .await?
                .into_iter()
                .filter(|r| query.admits_created_at(r.created_at));
            let rows = window.select(rows, |r| r.id.to_string());
            CursorPage::assemble(rows, &window, |r| r.id.to_string()).map(|mut r| {
                r.metadata = documents.remove(&r.id.to_string());
                r
            })
        } else {
            let rows = ctx
                .guard(self.routes.list_transaction_routes(ctx, org, ledger, query))
                .await?;
            let mut page = CursorPage::assemble(rows, &window, |r| r.id.to_string());
            let documents = self
                .load_many_metadata(ctx, entity, page.items.iter().map(|r| r.id.to_string()))
                .await?;
            for (route, metadata) in page.items.iter_mut().zip(documents) {
                route.metadata = metadata;
            }
            page
        };

        Ok(page)
    }

    // ========== Accounting Route Cache ==========

    /// Returns the cached accounting projection of a transaction route.
    ///
    /// # Errors
    ///
    /// Returns `TransactionRouteNotFound` if the route does not exist.
    pub async fn cached_transaction_route(
        &self,
        ctx: &RequestContext,
        org: OrganizationId,
        ledger: LedgerId,
        id: TransactionRouteId,
    ) -> Result<AccountingRoute, RoutingError> {
        self.cache.cached_transaction_route(ctx, org, ledger, id).await
    }

    /// Checks that an account may fill a leg of a transaction route.
    ///
    /// # Errors
    ///
    /// Returns `AccountIneligible` if no leg on that side accepts the account, or
    /// `TransactionRouteNotFound` if the route does not exist.
    #[allow(clippy::too_many_arguments)]
    pub async fn validate_account(
        &self,
        ctx: &RequestContext,
        org: OrganizationId,
        ledger: LedgerId,
        route_id: TransactionRouteId,
        operation_type: OperationType,
        alias: &str,
        account_type: &str,
    ) -> Result<(), RoutingError> {
        self.cache
            .cached_transaction_route(ctx, org, ledger, route_id)
            .await?
            .validate_leg(operation_type, alias, account_type)
    }

    /// Drops every cached accounting route of one tenant.
    pub async fn invalidate_tenant_cache(&self, tenant: &TenantKey) {
        self.cache.invalidate_tenant(tenant).await;
    }

    /// Drops every cached accounting route of every tenant.
    pub fn invalidate_all_caches(&self) {
        self.cache.invalidate_all();
    }

    // ========== Helpers ==========

    async fn resolve_legs(
        &self,
        ctx: &RequestContext,
        org: OrganizationId,
        ledger: LedgerId,
        ids: &[OperationRouteId],
    ) -> Result<Vec<OperationRoute>, RoutingError> {
        if ids.is_empty() {
            return Err(RoutingError::IncompleteTransactionRoute);
        }

        let found = ctx
            .guard(self.routes.find_operation_routes(ctx, org, ledger, ids))
            .await?;
        if let Some(missing) = ids.iter().find(|id| !found.iter().any(|r| r.id == **id)) {
            return Err(RoutingError::OperationRouteNotFound(*missing));
        }

        let has = |side| found.iter().any(|r| r.operation_type == side);
        if !has(OperationType::Source) || !has(OperationType::Destination) {
            return Err(RoutingError::IncompleteTransactionRoute);
        }
        Ok(found)
    }

    async fn refresh_cache(
        &self,
        ctx: &RequestContext,
        write: &mut RouteWrite<TransactionRoute>,
        operation_routes: &[OperationRoute],
    ) {
        if let Err(e) = self
            .cache
            .create_accounting_route_cache(ctx, &write.value, operation_routes)
            .await
        {
            warn!(error = %e, transaction_route_id = %write.value.id, "failed to cache accounting route");
            write
                .warnings
                .push(format!("transaction route {}: {e}", write.value.id));
        }
    }

    async fn create_metadata(
        &self,
        ctx: &RequestContext,
        entity: MetadataEntity,
        entity_id: &str,
        data: Option<Map<String, Value>>,
    ) -> Result<Option<Map<String, Value>>, RoutingError> {
        let Some(data) = data else {
            return Ok(None);
        };
        let record = MetadataRecord::new(entity_id, data.clone(), Utc::now());
        ctx.guard(self.metadata.create(ctx, entity, record)).await?;
        Ok(Some(data))
    }

    /// Removes an entity's metadata after its route is gone. Failures are logged and
    /// returned as a warning.
    async fn discard_metadata(
        &self,
        ctx: &RequestContext,
        entity: MetadataEntity,
        entity_id: &str,
    ) -> Option<String> {
        match self.metadata.delete(ctx, entity, entity_id).await {
            Ok(()) => None,
            Err(e) => {
                warn!(error = %e, entity = entity.as_str(), entity_id = %entity_id, "failed to remove metadata");
                Some(format!("{} {entity_id} metadata: {e}", entity.as_str()))
            }
        }
    }

    async fn replace_metadata(
        &self,
        ctx: &RequestContext,
        entity: MetadataEntity,
        entity_id: &str,
        data: Option<Map<String, Value>>,
    ) -> Result<Option<Map<String, Value>>, RoutingError> {
        match data {
            Some(data) => {
                ctx.guard(self.metadata.update(ctx, entity, entity_id, data.clone()))
                    .await?;
                Ok(Some(data))
            }
            None => self.load_metadata(ctx, entity, entity_id).await,
        }
    }

    async fn load_metadata(
        &self,
        ctx: &RequestContext,
        entity: MetadataEntity,
        entity_id: &str,
    ) -> Result<Option<Map<String, Value>>, RoutingError> {
        Ok(ctx
            .guard(self.metadata.find_by_entity(ctx, entity, entity_id))
            .await?
            .map(|record| record.data))
    }

    async fn load_many_metadata<I>(
        &self,
        ctx: &RequestContext,
        entity: MetadataEntity,
        ids: I,
    ) -> Result<Vec<Option<Map<String, Value>>>, RoutingError>
    where
        I: Iterator<Item = String>,
    {
        let ids: Vec<String> = ids.collect();
        try_join_all(ids.iter().map(|id| self.load_metadata(ctx, entity, id))).await
    }

    async fn matching_ids<T: FromStr>(
        &self,
        ctx: &RequestContext,
        entity: MetadataEntity,
        filter: &BTreeMap<String, String>,
    ) -> Result<(Vec<T>, BTreeMap<String, Map<String, Value>>), RoutingError> {
        let records = ctx
            .guard(self.metadata.find_list(ctx, entity, filter))
            .await?;

        let mut ids = Vec::with_capacity(records.len());
        let mut documents = BTreeMap::new();
        for record in records {
            match T::from_str(&record.entity_id) {
                Ok(id) => {
                    ids.push(id);
                    documents.insert(record.entity_id, record.data);
                }
                Err(_) => {
                    warn!(entity = entity.as_str(), entity_id = %record.entity_id, "skipping metadata for unparseable id");
                }
            }
        }
        Ok((ids, documents))
    }
}

impl std::fmt::Debug for RoutingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutingService")
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

fn validate_title(raw: &str) -> Result<String, RoutingError> {
    let title = raw.trim();
    if title.is_empty() {
        return Err(RoutingError::InvalidTitle("title is required".to_string()));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(RoutingError::InvalidTitle(format!(
            "title exceeds {MAX_TITLE_LEN} characters"
        )));
    }
    Ok(title.to_string())
}

fn validate_description(description: Option<&str>) -> Result<(), RoutingError> {
    match description {
        Some(d) if d.chars().count() > MAX_DESCRIPTION_LEN => {
            Err(RoutingError::DescriptionTooLong(MAX_DESCRIPTION_LEN))
        }
        _ => Ok(()),
    }
}

fn dedupe(ids: &[OperationRouteId]) -> Vec<OperationRouteId> {
    let mut seen = BTreeSet::new();
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

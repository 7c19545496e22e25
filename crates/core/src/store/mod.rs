//! Collaborator contracts for durable storage.
//!
//! The core never talks to a database directly. Every read and write goes through one of
//! these traits, scoped by organization and ledger, with the request context passed along
//! so adapters can honour the tenant, cancellation and deadline.
//!
//! List methods receive a validated [`ListQuery`] and must return rows that satisfy its
//! [`ListQuery::window`]: keyed past the cursor, in read order, at most `limit + 1` rows.

mod error;

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ledgerline_shared::RequestContext;
use ledgerline_shared::types::{
    AccountId, BalanceId, LedgerId, ListQuery, OperationRouteId, OrganizationId,
    TransactionRouteId,
};
use serde_json::{Map, Value};

pub use error::StoreError;

use crate::balance::{Balance, BalanceMutation};
use crate::history::Operation;
use crate::metadata::{MetadataEntity, MetadataRecord};
use crate::routing::{OperationRoute, TransactionRoute};

/// Result type for store calls.
pub type StoreResult<T> = Result<T, StoreError>;

/// Durable storage of balance rows.
#[async_trait]
pub trait BalanceStore: Send + Sync {
    /// Loads a live balance by ID.
    async fn find(
        &self,
        ctx: &RequestContext,
        org: OrganizationId,
        ledger: LedgerId,
        id: BalanceId,
    ) -> StoreResult<Balance>;

    /// Loads the live balance of an account with the given slot key.
    async fn find_by_account_and_key(
        &self,
        ctx: &RequestContext,
        org: OrganizationId,
        ledger: LedgerId,
        account: AccountId,
        key: &str,
    ) -> StoreResult<Option<Balance>>;

    /// Loads the live balance of an account alias with the given slot key.
    async fn find_by_alias_and_key(
        &self,
        ctx: &RequestContext,
        org: OrganizationId,
        ledger: LedgerId,
        alias: &str,
        key: &str,
    ) -> StoreResult<Option<Balance>>;

    /// Inserts a balance. `(account, key)` must be unique among live rows.
    async fn create(&self, ctx: &RequestContext, balance: Balance) -> StoreResult<Balance>;

    /// Applies `mutation` as one atomic read-modify-write and returns the persisted row.
    ///
    /// Fails with [`StoreError::VersionConflict`] when the mutation pins a version the
    /// row has already moved past.
    async fn update_returning(
        &self,
        ctx: &RequestContext,
        org: OrganizationId,
        ledger: LedgerId,
        id: BalanceId,
        mutation: &BalanceMutation,
    ) -> StoreResult<Balance>;

    /// Soft-deletes a balance if it is still at `expected_version`.
    async fn delete(
        &self,
        ctx: &RequestContext,
        org: OrganizationId,
        ledger: LedgerId,
        id: BalanceId,
        expected_version: i64,
    ) -> StoreResult<()>;

    /// Lists live balances of a ledger.
    async fn list_all(
        &self,
        ctx: &RequestContext,
        org: OrganizationId,
        ledger: LedgerId,
        query: &ListQuery,
    ) -> StoreResult<Vec<Balance>>;

    /// Lists live balances of one account.
    async fn list_by_account(
        &self,
        ctx: &RequestContext,
        org: OrganizationId,
        ledger: LedgerId,
        account: AccountId,
        query: &ListQuery,
    ) -> StoreResult<Vec<Balance>>;

    /// Loads every live balance whose alias is in `aliases`.
    async fn list_by_aliases(
        &self,
        ctx: &RequestContext,
        org: OrganizationId,
        ledger: LedgerId,
        aliases: &[String],
    ) -> StoreResult<Vec<Balance>>;

    /// Lists the balances of an account that existed at `at` (created at or before it
    /// and not deleted by then).
    async fn list_by_account_at_timestamp(
        &self,
        ctx: &RequestContext,
        org: OrganizationId,
        ledger: LedgerId,
        account: AccountId,
        at: DateTime<Utc>,
    ) -> StoreResult<Vec<Balance>>;
}

/// Read access to the append-only operation log.
#[async_trait]
pub trait OperationLog: Send + Sync {
    /// Latest operation on `(account, key)` created at or before `at`.
    async fn find_last_operation_before_timestamp(
        &self,
        ctx: &RequestContext,
        org: OrganizationId,
        ledger: LedgerId,
        account: AccountId,
        key: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<Operation>>;

    /// Latest operation per balance slot of `account` created at or before `at`.
    async fn find_last_operations_for_account_before_timestamp(
        &self,
        ctx: &RequestContext,
        org: OrganizationId,
        ledger: LedgerId,
        account: AccountId,
        at: DateTime<Utc>,
    ) -> StoreResult<Vec<Operation>>;
}

/// Document store for entity metadata.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Loads the metadata of one entity.
    async fn find_by_entity(
        &self,
        ctx: &RequestContext,
        entity: MetadataEntity,
        entity_id: &str,
    ) -> StoreResult<Option<MetadataRecord>>;

    /// Loads every record of `entity` matching all `filter` pairs.
    async fn find_list(
        &self,
        ctx: &RequestContext,
        entity: MetadataEntity,
        filter: &BTreeMap<String, String>,
    ) -> StoreResult<Vec<MetadataRecord>>;

    /// Stores a new record.
    async fn create(
        &self,
        ctx: &RequestContext,
        entity: MetadataEntity,
        record: MetadataRecord,
    ) -> StoreResult<()>;

    /// Replaces the data of an entity's record, creating it if absent.
    async fn update(
        &self,
        ctx: &RequestContext,
        entity: MetadataEntity,
        entity_id: &str,
        data: Map<String, Value>,
    ) -> StoreResult<()>;

    /// Removes an entity's record. Removing an absent record succeeds.
    async fn delete(
        &self,
        ctx: &RequestContext,
        entity: MetadataEntity,
        entity_id: &str,
    ) -> StoreResult<()>;
}

/// Durable storage of operation and transaction routes.
#[async_trait]
pub trait RouteStore: Send + Sync {
    /// Inserts an operation route.
    async fn create_operation_route(
        &self,
        ctx: &RequestContext,
        route: OperationRoute,
    ) -> StoreResult<OperationRoute>;

    /// Replaces a stored operation route.
    async fn update_operation_route(
        &self,
        ctx: &RequestContext,
        route: OperationRoute,
    ) -> StoreResult<OperationRoute>;

    /// Deletes an operation route.
    async fn delete_operation_route(
        &self,
        ctx: &RequestContext,
        org: OrganizationId,
        ledger: LedgerId,
        id: OperationRouteId,
    ) -> StoreResult<()>;

    /// Loads an operation route.
    async fn find_operation_route(
        &self,
        ctx: &RequestContext,
        org: OrganizationId,
        ledger: LedgerId,
        id: OperationRouteId,
    ) -> StoreResult<OperationRoute>;

    /// Loads the operation routes among `ids` that exist. Missing IDs are skipped.
    async fn find_operation_routes(
        &self,
        ctx: &RequestContext,
        org: OrganizationId,
        ledger: LedgerId,
        ids: &[OperationRouteId],
    ) -> StoreResult<Vec<OperationRoute>>;

    /// Lists the operation routes of a ledger.
    async fn list_operation_routes(
        &self,
        ctx: &RequestContext,
        org: OrganizationId,
        ledger: LedgerId,
        query: &ListQuery,
    ) -> StoreResult<Vec<OperationRoute>>;

    /// Inserts a transaction route.
    async fn create_transaction_route(
        &self,
        ctx: &RequestContext,
        route: TransactionRoute,
    ) -> StoreResult<TransactionRoute>;

    /// Replaces a stored transaction route.
    async fn update_transaction_route(
        &self,
        ctx: &RequestContext,
        route: TransactionRoute,
    ) -> StoreResult<TransactionRoute>;

    /// Deletes a transaction route.
    async fn delete_transaction_route(
        &self,
        ctx: &RequestContext,
        org: OrganizationId,
        ledger: LedgerId,
        id: TransactionRouteId,
    ) -> StoreResult<()>;

    /// Loads a transaction route.
    async fn find_transaction_route(
        &self,
        ctx: &RequestContext,
        org: OrganizationId,
        ledger: LedgerId,
        id: TransactionRouteId,
    ) -> StoreResult<TransactionRoute>;

    /// Loads the transaction routes among `ids` that exist. Missing IDs are skipped.
    async fn find_transaction_routes(
        &self,
        ctx: &RequestContext,
        org: OrganizationId,
        ledger: LedgerId,
        ids: &[TransactionRouteId],
    ) -> StoreResult<Vec<TransactionRoute>>;

    /// Lists the transaction routes of a ledger.
    async fn list_transaction_routes(
        &self,
        ctx: &RequestContext,
        org: OrganizationId,
        ledger: LedgerId,
        query: &ListQuery,
    ) -> StoreResult<Vec<TransactionRoute>>;

    /// Lists every transaction route that references `operation_route`.
    async fn list_transaction_routes_by_operation_route(
        &self,
        ctx: &RequestContext,
        org: OrganizationId,
        ledger: LedgerId,
        operation_route: OperationRouteId,
    ) -> StoreResult<Vec<TransactionRoute>>;
}

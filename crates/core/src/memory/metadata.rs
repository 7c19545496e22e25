//! In-memory metadata store.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use ledgerline_shared::{RequestContext, TenantKey};
use serde_json::{Map, Value};

use super::ensure_live;
use crate::metadata::{MetadataEntity, MetadataRecord};
use crate::store::{MetadataStore, StoreError, StoreResult};

/// Metadata documents held in memory.
#[derive(Debug, Default)]
pub struct InMemoryMetadataStore {
    records: DashMap<(TenantKey, MetadataEntity, String), MetadataRecord>,
}

impl InMemoryMetadataStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn find_by_entity(
        &self,
        ctx: &RequestContext,
        entity: MetadataEntity,
        entity_id: &str,
    ) -> StoreResult<Option<MetadataRecord>> {
        ensure_live(ctx)?;
        Ok(self
            .records
            .get(&(ctx.tenant().clone(), entity, entity_id.to_string()))
            .map(|r| r.value().clone()))
    }

    async fn find_list(
        &self,
        ctx: &RequestContext,
        entity: MetadataEntity,
        filter: &BTreeMap<String, String>,
    ) -> StoreResult<Vec<MetadataRecord>> {
        ensure_live(ctx)?;
        let tenant = ctx.tenant();
        Ok(self
            .records
            .iter()
            .filter(|r| &r.key().0 == tenant && r.key().1 == entity && r.value().matches(filter))
            .map(|r| r.value().clone())
            .collect())
    }

    async fn create(
        &self,
        ctx: &RequestContext,
        entity: MetadataEntity,
        record: MetadataRecord,
    ) -> StoreResult<()> {
        ensure_live(ctx)?;
        let key = (ctx.tenant().clone(), entity, record.entity_id.clone());
        match self.records.entry(key) {
            Entry::Occupied(_) => Err(StoreError::Duplicate {
                entity: entity.as_str(),
                key: record.entity_id,
            }),
            Entry::Vacant(vacant) => {
                vacant.insert(record);
                Ok(())
            }
        }
    }

    async fn update(
        &self,
        ctx: &RequestContext,
        entity: MetadataEntity,
        entity_id: &str,
        data: Map<String, Value>,
    ) -> StoreResult<()> {
        ensure_live(ctx)?;
        let now = Utc::now();
        self.records
            .entry((ctx.tenant().clone(), entity, entity_id.to_string()))
            .and_modify(|record| {
                record.data.clone_from(&data);
                record.updated_at = now;
            })
            .or_insert_with(|| MetadataRecord::new(entity_id, data.clone(), now));
        Ok(())
    }

    async fn delete(
        &self,
        ctx: &RequestContext,
        entity: MetadataEntity,
        entity_id: &str,
    ) -> StoreResult<()> {
        ensure_live(ctx)?;
        self.records
            .remove(&(ctx.tenant().clone(), entity, entity_id.to_string()));
        Ok(())
    }
}

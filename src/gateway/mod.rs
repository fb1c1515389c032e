//! Generic CRUD operations over any registered entity type.

use crate::core::{Result, TtmError, Value, WireRecord};
use crate::datastore::DatastoreRegistry;
use crate::entity::{AnyEntity, EntityId, EntityType};
use crate::mapper::RecordMapper;
use crate::query::{EntityQuery, parse_predicate};
use crate::storage::EntityStore;
use serde::Deserialize;
use std::sync::Arc;

/// How the gateway picks the store for an entity type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayKind {
    /// By the namespace of the entity type.
    #[default]
    Routed,
    /// Always the default (first registered) store.
    SingleStore,
}

#[derive(Debug, Clone)]
pub struct CrudGateway {
    kind: GatewayKind,
    datastores: Arc<DatastoreRegistry>,
    mapper: RecordMapper,
}

impl CrudGateway {
    pub fn new(kind: GatewayKind, datastores: Arc<DatastoreRegistry>, mapper: RecordMapper) -> Self {
        Self {
            kind,
            datastores,
            mapper,
        }
    }

    pub fn kind(&self) -> GatewayKind {
        self.kind
    }

    pub fn datastores(&self) -> &Arc<DatastoreRegistry> {
        &self.datastores
    }

    pub fn mapper(&self) -> &RecordMapper {
        &self.mapper
    }

    fn store_for(&self, type_name: &str) -> Result<Arc<dyn EntityStore>> {
        match self.kind {
            GatewayKind::Routed => self.datastores.resolve_by_entity(type_name),
            GatewayKind::SingleStore => self.datastores.resolve_by_alias(None),
        }
    }

    pub async fn get(&self, entity_type: &EntityType, id: &EntityId) -> Result<Option<AnyEntity>> {
        tracing::debug!(entity = entity_type.name(), %id, "get");
        self.store_for(entity_type.name())?
            .find(entity_type, id)
            .await
    }

    pub async fn get_all(&self, entity_type: &EntityType) -> Result<Vec<AnyEntity>> {
        tracing::debug!(entity = entity_type.name(), "get all");
        self.store_for(entity_type.name())?
            .find_all(entity_type)
            .await
    }

    /// Entities of `entity_type` matching `predicate`, written against `alias`.
    pub async fn get_by_criteria(
        &self,
        entity_type: &EntityType,
        alias: &str,
        predicate: &str,
    ) -> Result<Vec<AnyEntity>> {
        if alias.trim().is_empty() {
            return Err(TtmError::argument("The alias can't be null"));
        }
        if predicate.trim().is_empty() {
            return Err(TtmError::argument("The clause can't be null"));
        }

        let predicate = parse_predicate(alias, predicate, Some(entity_type))?;
        let query = EntityQuery::new(entity_type.name(), alias, Some(predicate));
        tracing::debug!(%query, "get by criteria");

        self.store_for(entity_type.name())?.query(&query, &[]).await
    }

    /// Runs an entity query; without a datastore alias it goes to the store
    /// owning the queried type.
    pub async fn get_result(
        &self,
        query: &str,
        params: &[Value],
        datastore: Option<&str>,
    ) -> Result<Vec<AnyEntity>> {
        if query.trim().is_empty() {
            return Err(TtmError::argument("The query can't be null"));
        }
        let query = EntityQuery::parse(query)?;
        let store = match datastore {
            Some(alias) => self.datastores.resolve_by_alias(Some(alias))?,
            None => self.store_for(&query.entity)?,
        };
        tracing::debug!(%query, params = params.len(), "get result");
        store.query(&query, params).await
    }

    /// Runs a raw select; without a datastore alias it goes to the default store.
    pub async fn get_result_set(
        &self,
        query: &str,
        params: &[Value],
        datastore: Option<&str>,
    ) -> Result<Vec<Vec<Value>>> {
        if query.trim().is_empty() {
            return Err(TtmError::argument("The query can't be null"));
        }
        let store = self.datastores.resolve_by_alias(datastore)?;
        tracing::debug!(query, params = params.len(), "get result set");
        store.raw_query(query, params).await
    }

    /// Maps `record` onto a new entity and persists it.
    ///
    /// Any identity carried by the record is discarded unread.
    pub async fn create(&self, entity_type: &EntityType, record: &WireRecord) -> Result<AnyEntity> {
        let record: WireRecord = record
            .iter()
            .filter(|(name, _)| !entity_type.field(name).is_some_and(|field| field.identity))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        let mut entity = self.mapper.new_entity(&record, entity_type)?;
        entity.assign_identity(EntityId::SENTINEL)?;

        let store = self.store_for(entity_type.name())?;
        let created = store.create(entity).await?;
        tracing::debug!(entity = entity_type.name(), id = %created.identity(), "created");
        Ok(created)
    }

    /// Loads the entity named by `record["id"]`, applies the record and persists it.
    pub async fn update(&self, entity_type: &EntityType, record: &WireRecord) -> Result<AnyEntity> {
        let id = match record.get("id") {
            Some(id) if !id.is_null() => EntityId::from_json(id)?,
            _ => return Err(TtmError::argument("The object id should be set")),
        };

        let store = self.store_for(entity_type.name())?;
        let mut entity = store
            .find(entity_type, &id)
            .await?
            .ok_or_else(|| TtmError::not_found(entity_type.name(), &id, "updating"))?;

        self.mapper.to_entity(record, &mut entity)?;
        entity.assign_identity(id)?;
        store.update(&entity).await?;
        tracing::debug!(entity = entity_type.name(), id = %entity.identity(), "updated");
        Ok(entity)
    }

    pub async fn delete(&self, entity_type: &EntityType, id: &EntityId) -> Result<()> {
        let store = self.store_for(entity_type.name())?;
        let entity = store
            .find(entity_type, id)
            .await?
            .ok_or_else(|| TtmError::not_found(entity_type.name(), id, "deleting"))?;

        store.remove(&entity).await?;
        tracing::debug!(entity = entity_type.name(), %id, "deleted");
        Ok(())
    }
}

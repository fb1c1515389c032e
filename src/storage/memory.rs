use super::{BackendConfig, EntityStore, StoreFactory};
use crate::core::{Result, TtmError, Value};
use crate::entity::{AnyEntity, EntityId, EntityType};
use crate::query::{EntityQuery, SelectStatement};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

pub(crate) const KIND: &str = "memory";

/// Rows of one entity type, ordered by identity.
#[derive(Debug)]
struct Table {
    entity_type: EntityType,
    rows: BTreeMap<EntityId, AnyEntity>,
    next_id: i64,
}

impl Table {
    fn new(entity_type: EntityType, first_id: i64) -> Self {
        Self {
            entity_type,
            rows: BTreeMap::new(),
            next_id: first_id,
        }
    }

    fn allocate(&mut self) -> EntityId {
        let id = EntityId::Scalar(self.next_id);
        self.next_id += 1;
        id
    }

    fn check_owner(&self, entity: &AnyEntity) -> Result<()> {
        if entity.entity_type() == &self.entity_type {
            Ok(())
        } else {
            Err(TtmError::unclassified(format!(
                "Table '{}' cannot hold an entity of another type",
                self.entity_type.name()
            )))
        }
    }
}

/// Reference entity store keeping everything in process memory.
///
/// One table per entity type, each behind its own lock; the table map only
/// takes its write lock when a type is seen for the first time.
#[derive(Debug)]
pub struct InMemoryStore {
    tables: RwLock<HashMap<&'static str, Arc<RwLock<Table>>>>,
    first_id: i64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_first_id(1)
    }

    /// Store whose scalar identities start at `first_id`.
    pub fn with_first_id(first_id: i64) -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            first_id,
        }
    }

    async fn table(&self, name: &str) -> Option<Arc<RwLock<Table>>> {
        self.tables.read().await.get(name).cloned()
    }

    async fn table_or_create(&self, entity_type: &EntityType) -> Arc<RwLock<Table>> {
        if let Some(table) = self.table(entity_type.name()).await {
            return table;
        }
        let mut tables = self.tables.write().await;
        Arc::clone(tables.entry(entity_type.name()).or_insert_with(|| {
            tracing::debug!(entity = entity_type.name(), "creating in-memory table");
            Arc::new(RwLock::new(Table::new(entity_type.clone(), self.first_id)))
        }))
    }

    /// Number of stored entities of a type.
    pub async fn count(&self, entity_type: &EntityType) -> usize {
        match self.table(entity_type.name()).await {
            Some(table) => table.read().await.rows.len(),
            None => 0,
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EntityStore for InMemoryStore {
    fn kind(&self) -> &str {
        KIND
    }

    async fn find(&self, entity_type: &EntityType, id: &EntityId) -> Result<Option<AnyEntity>> {
        let Some(table) = self.table(entity_type.name()).await else {
            return Ok(None);
        };
        let table = table.read().await;
        Ok(table.rows.get(id).cloned())
    }

    async fn find_all(&self, entity_type: &EntityType) -> Result<Vec<AnyEntity>> {
        let Some(table) = self.table(entity_type.name()).await else {
            return Ok(Vec::new());
        };
        let table = table.read().await;
        Ok(table.rows.values().cloned().collect())
    }

    async fn create(&self, mut entity: AnyEntity) -> Result<AnyEntity> {
        let handle = self.table_or_create(entity.entity_type()).await;
        let mut table = handle.write().await;
        table.check_owner(&entity)?;

        let id = match entity.natural_key() {
            Some(key) => key,
            None => table.allocate(),
        };
        if table.rows.contains_key(&id) {
            return Err(TtmError::argument(format!(
                "Object {}:({id}) already exists",
                entity.type_name()
            )));
        }

        entity.assign_identity(id.clone())?;
        table.rows.insert(id, entity.clone());
        Ok(entity)
    }

    async fn update(&self, entity: &AnyEntity) -> Result<()> {
        let id = entity.identity();
        let not_found = || TtmError::not_found(entity.type_name(), &id, "updating");

        let handle = self.table(entity.type_name()).await.ok_or_else(not_found)?;
        let mut table = handle.write().await;
        table.check_owner(entity)?;
        let row = table.rows.get_mut(&id).ok_or_else(not_found)?;
        *row = entity.clone();
        Ok(())
    }

    async fn remove(&self, entity: &AnyEntity) -> Result<()> {
        let id = entity.identity();
        let not_found = || TtmError::not_found(entity.type_name(), &id, "deleting");

        let handle = self.table(entity.type_name()).await.ok_or_else(not_found)?;
        let mut table = handle.write().await;
        table.rows.remove(&id).map(|_| ()).ok_or_else(not_found)
    }

    async fn query(&self, query: &EntityQuery, params: &[Value]) -> Result<Vec<AnyEntity>> {
        let Some(table) = self.table(&query.entity).await else {
            return Ok(Vec::new());
        };
        let table = table.read().await;
        query.check(&table.entity_type)?;

        let mut matched = Vec::new();
        for entity in table.rows.values() {
            if query.matches(entity, params)? {
                matched.push(entity.clone());
            }
        }
        Ok(matched)
    }

    async fn raw_query(&self, query: &str, params: &[Value]) -> Result<Vec<Vec<Value>>> {
        let select = SelectStatement::parse(query)?;
        let Some(table) = self.table(&select.entity).await else {
            return Ok(Vec::new());
        };
        let table = table.read().await;
        select.check(&table.entity_type)?;

        let mut rows = Vec::new();
        for entity in table.rows.values() {
            if select.matches(entity, params)? {
                rows.push(select.project(entity));
            }
        }
        Ok(rows)
    }
}

/// Factory for the `memory` backend kind.
///
/// Accepts an optional integer `first_id` parameter.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryStoreFactory;

impl MemoryStoreFactory {
    fn first_id(backend: &BackendConfig) -> Result<i64> {
        match backend.get("first_id") {
            None => Ok(1),
            Some(value) => value.as_i64().filter(|id| *id > 0).ok_or_else(|| {
                TtmError::configuration(format!(
                    "Backend parameter 'first_id' must be a positive integer, got {value}"
                ))
            }),
        }
    }
}

impl StoreFactory for MemoryStoreFactory {
    fn kind(&self) -> &'static str {
        KIND
    }

    fn open(&self, backend: &BackendConfig) -> Result<Arc<dyn EntityStore>> {
        Ok(Arc::new(InMemoryStore::with_first_id(Self::first_id(backend)?)))
    }

    fn validate(&self, backend: &BackendConfig) -> Result<()> {
        Self::first_id(backend).map(|_| ())
    }
}

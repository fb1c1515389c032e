//! Entity-store capability and the factories that open stores.

pub mod memory;

pub use memory::{InMemoryStore, MemoryStoreFactory};

use crate::core::{Result, TtmError, Value};
use crate::entity::{AnyEntity, EntityId, EntityType};
use crate::query::EntityQuery;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Opaque persistence backend behind a datastore alias.
///
/// Stores never see wire records: they receive and return entities, and
/// queries arrive already parsed.
#[async_trait]
pub trait EntityStore: Send + Sync + fmt::Debug {
    /// Backend kind this store was opened from.
    fn kind(&self) -> &str;

    async fn find(&self, entity_type: &EntityType, id: &EntityId) -> Result<Option<AnyEntity>>;

    async fn find_all(&self, entity_type: &EntityType) -> Result<Vec<AnyEntity>>;

    /// Persists a new entity and returns it with its store-assigned identity.
    async fn create(&self, entity: AnyEntity) -> Result<AnyEntity>;

    async fn update(&self, entity: &AnyEntity) -> Result<()>;

    async fn remove(&self, entity: &AnyEntity) -> Result<()>;

    async fn query(&self, query: &EntityQuery, params: &[Value]) -> Result<Vec<AnyEntity>>;

    /// Runs a raw select and returns bare rows.
    async fn raw_query(&self, query: &str, params: &[Value]) -> Result<Vec<Vec<Value>>>;
}

/// `backend` section of a datastore entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    pub kind: String,
    #[serde(flatten)]
    pub params: serde_json::Map<String, JsonValue>,
}

impl BackendConfig {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            params: serde_json::Map::new(),
        }
    }

    pub fn memory() -> Self {
        Self::new(memory::KIND)
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.params.get(key)
    }
}

/// Builds stores of one backend kind.
pub trait StoreFactory: Send + Sync {
    fn kind(&self) -> &'static str;

    fn open(&self, backend: &BackendConfig) -> Result<Arc<dyn EntityStore>>;

    /// Checks backend parameters without opening anything.
    fn validate(&self, _backend: &BackendConfig) -> Result<()> {
        Ok(())
    }
}

/// Backend kind → factory, consulted when datastores are registered.
#[derive(Clone)]
pub struct StoreFactories {
    factories: HashMap<&'static str, Arc<dyn StoreFactory>>,
}

impl StoreFactories {
    /// Factories for the built-in backends.
    pub fn new() -> Self {
        let mut factories = Self::empty();
        factories.register(MemoryStoreFactory);
        factories
    }

    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    pub fn register(&mut self, factory: impl StoreFactory + 'static) -> &mut Self {
        self.factories.insert(factory.kind(), Arc::new(factory));
        self
    }

    pub fn get(&self, kind: &str) -> Result<&Arc<dyn StoreFactory>> {
        self.factories.get(kind).ok_or_else(|| {
            TtmError::configuration(format!("Unknown datastore backend '{kind}'"))
        })
    }

    pub fn validate(&self, backend: &BackendConfig) -> Result<()> {
        self.get(&backend.kind)?.validate(backend)
    }

    pub fn open(&self, backend: &BackendConfig) -> Result<Arc<dyn EntityStore>> {
        let factory = self.get(&backend.kind)?;
        factory.validate(backend)?;
        factory.open(backend)
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        let mut kinds: Vec<_> = self.factories.keys().copied().collect();
        kinds.sort_unstable();
        kinds
    }
}

impl Default for StoreFactories {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StoreFactories {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreFactories")
            .field("kinds", &self.kinds())
            .finish()
    }
}

//! Core configuration.
//!
//! Read from JSON by the host (`CoreConfig::from_json_str`) or assembled with
//! the builder setters. Every section is optional:
//!
//! ```json
//! {
//!   "mapper": { "kind": "strict" },
//!   "gateway": "routed",
//!   "namespace_match": "exact",
//!   "datastores": [
//!     { "alias": "main", "namespace": "inventory", "backend": { "kind": "memory" } }
//!   ]
//! }
//! ```

use crate::core::{Result, TtmError};
use crate::datastore::NamespaceMatch;
use crate::dispatcher::RoutingConvention;
use crate::gateway::GatewayKind;
use crate::mapper::MapperKind;
use crate::storage::StoreFactories;
use serde::Deserialize;
use std::collections::HashSet;

pub use crate::storage::BackendConfig;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MapperConfig {
    pub kind: MapperKind,
}

/// One datastore entry.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DatastoreConfig {
    pub alias: String,
    /// Namespace prefix served by this store. Under ancestor matching an
    /// empty prefix serves every type no other store claims.
    #[serde(default)]
    pub namespace: String,
    pub backend: BackendConfig,
}

impl DatastoreConfig {
    pub fn new(alias: impl Into<String>, namespace: impl Into<String>, backend: BackendConfig) -> Self {
        Self {
            alias: alias.into(),
            namespace: namespace.into(),
            backend,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub mapper: MapperConfig,
    pub gateway: GatewayKind,
    pub namespace_match: NamespaceMatch,
    pub datastores: Vec<DatastoreConfig>,
    /// Send configuration and unclassified fault messages to clients
    pub expose_internal_errors: bool,
    pub routing: RoutingConvention,
}

impl CoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|err| TtmError::configuration(format!("Invalid core configuration: {err}")))
    }

    pub fn mapper(mut self, kind: MapperKind) -> Self {
        self.mapper.kind = kind;
        self
    }

    pub fn gateway(mut self, kind: GatewayKind) -> Self {
        self.gateway = kind;
        self
    }

    pub fn namespace_match(mut self, matching: NamespaceMatch) -> Self {
        self.namespace_match = matching;
        self
    }

    pub fn datastore(mut self, datastore: DatastoreConfig) -> Self {
        self.datastores.push(datastore);
        self
    }

    pub fn expose_internal_errors(mut self, expose: bool) -> Self {
        self.expose_internal_errors = expose;
        self
    }

    pub fn routing(mut self, routing: RoutingConvention) -> Self {
        self.routing = routing;
        self
    }

    /// Checks everything that can be checked without opening a store.
    ///
    /// A repeated alias is skipped with a warning, the same way registration
    /// skips it.
    pub fn validate(&self, factories: &StoreFactories) -> Result<()> {
        self.routing.validate()?;

        let mut aliases = HashSet::new();
        let mut namespaces = HashSet::new();
        for datastore in &self.datastores {
            if datastore.alias.trim().is_empty() {
                return Err(TtmError::configuration("A datastore alias can't be empty"));
            }
            if !aliases.insert(datastore.alias.as_str()) {
                tracing::warn!(alias = %datastore.alias, "datastore alias declared twice; keeping the first");
                continue;
            }
            if !namespaces.insert(datastore.namespace.as_str()) {
                return Err(TtmError::configuration(format!(
                    "Namespace '{}' is declared by more than one datastore",
                    datastore.namespace
                )));
            }
            factories.validate(&datastore.backend)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_gives_defaults() {
        let config = CoreConfig::from_json_str("{}").unwrap();
        assert_eq!(config, CoreConfig::default());
        assert_eq!(config.routing, RoutingConvention::default());
        assert!(!config.expose_internal_errors);
    }

    #[test]
    fn full_document_is_read() {
        let config = CoreConfig::from_json_str(
            r#"{
                "mapper": {"kind": "strict"},
                "gateway": "single_store",
                "namespace_match": "ancestor",
                "expose_internal_errors": true,
                "routing": {"command": "cmd", "service": "svc"},
                "datastores": [
                    {"alias": "main", "backend": {"kind": "memory", "first_id": 100}},
                    {"alias": "stock", "namespace": "inventory", "backend": {"kind": "memory"}}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(config.mapper.kind, MapperKind::Strict);
        assert_eq!(config.gateway, GatewayKind::SingleStore);
        assert_eq!(config.namespace_match, NamespaceMatch::Ancestor);
        assert_eq!(config.routing, RoutingConvention::new("cmd", "svc"));
        assert_eq!(config.datastores.len(), 2);
        assert_eq!(config.datastores[0].namespace, "");
        assert_eq!(config.datastores[0].backend.get("first_id"), Some(&100.into()));
        config.validate(&StoreFactories::new()).unwrap();
    }

    #[test]
    fn malformed_documents_are_configuration_faults() {
        let err = CoreConfig::from_json_str(r#"{"gateway": "sharded"}"#).unwrap_err();
        assert!(matches!(err, TtmError::Configuration(_)));
    }

    #[test]
    fn validation_rejects_conflicts_and_unknown_backends() {
        let factories = StoreFactories::new();

        let shared = CoreConfig::new()
            .datastore(DatastoreConfig::new("a", "shop", BackendConfig::memory()))
            .datastore(DatastoreConfig::new("b", "shop", BackendConfig::memory()));
        assert!(shared.validate(&factories).is_err());

        let unknown = CoreConfig::new()
            .datastore(DatastoreConfig::new("main", "", BackendConfig::new("cassandra")));
        let err = unknown.validate(&factories).unwrap_err();
        assert!(err.to_string().contains("cassandra"));
    }

    #[test]
    fn repeated_aliases_keep_the_first_declaration() {
        let factories = StoreFactories::new();
        let twice = CoreConfig::new()
            .datastore(DatastoreConfig::new("main", "shop", BackendConfig::memory()))
            .datastore(DatastoreConfig::new("main", "shop", BackendConfig::new("tape")));
        twice.validate(&factories).unwrap();

        let registry = crate::datastore::DatastoreRegistry::new();
        assert_eq!(registry.register(&twice.datastores, &factories).unwrap(), 1);
        assert_eq!(registry.namespace("main").unwrap().as_deref(), Some("shop"));
    }
}

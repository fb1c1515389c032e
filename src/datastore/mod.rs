//! Datastore registry: alias and namespace-prefix lookup of entity stores.

use crate::config::DatastoreConfig;
use crate::core::{Result, TtmError};
use crate::entity::handle::namespace_of;
use crate::storage::{EntityStore, StoreFactories};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// How an entity namespace is matched against registered prefixes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamespaceMatch {
    /// Only the namespace itself.
    #[default]
    Exact,
    /// The namespace, then its longest registered ancestor, down to a store
    /// bound to the empty namespace.
    Ancestor,
}

#[derive(Debug, Clone)]
struct Binding {
    namespace: String,
    store: Arc<dyn EntityStore>,
}

#[derive(Debug, Default)]
struct Bindings {
    by_alias: HashMap<String, Binding>,
    /// namespace prefix → alias
    by_namespace: HashMap<String, String>,
    /// aliases in registration order; the first one is the default store
    order: Vec<String>,
}

/// Shared index of opened entity stores.
///
/// Registration is insert-if-absent per alias, so replaying the same
/// configuration is harmless. Every namespace prefix is bound to exactly one
/// alias.
#[derive(Debug, Default)]
pub struct DatastoreRegistry {
    matching: NamespaceMatch,
    bindings: RwLock<Bindings>,
}

impl DatastoreRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_matching(matching: NamespaceMatch) -> Self {
        Self {
            matching,
            bindings: RwLock::default(),
        }
    }

    pub fn matching(&self) -> NamespaceMatch {
        self.matching
    }

    /// Opens and indexes every configured datastore whose alias is new.
    ///
    /// Returns how many stores were added.
    pub fn register(&self, configs: &[DatastoreConfig], factories: &StoreFactories) -> Result<usize> {
        let mut added = 0;
        for config in configs {
            if self.contains(&config.alias)? {
                tracing::debug!(alias = %config.alias, "datastore already registered");
                continue;
            }
            let store = factories.open(&config.backend)?;
            if self.register_store(&config.alias, &config.namespace, store)? {
                added += 1;
            }
        }
        Ok(added)
    }

    /// Indexes an already opened store; `false` when the alias is taken.
    pub fn register_store(
        &self,
        alias: &str,
        namespace: &str,
        store: Arc<dyn EntityStore>,
    ) -> Result<bool> {
        if alias.trim().is_empty() {
            return Err(TtmError::configuration("A datastore alias can't be empty"));
        }

        let mut bindings = self.bindings.write()?;
        if bindings.by_alias.contains_key(alias) {
            return Ok(false);
        }
        if let Some(owner) = bindings.by_namespace.get(namespace) {
            return Err(TtmError::configuration(format!(
                "Namespace '{namespace}' is already bound to datastore '{owner}'"
            )));
        }

        tracing::info!(alias, namespace, kind = store.kind(), "datastore registered");
        bindings
            .by_namespace
            .insert(namespace.to_string(), alias.to_string());
        bindings.by_alias.insert(
            alias.to_string(),
            Binding {
                namespace: namespace.to_string(),
                store,
            },
        );
        bindings.order.push(alias.to_string());
        Ok(true)
    }

    pub fn contains(&self, alias: &str) -> Result<bool> {
        Ok(self.bindings.read()?.by_alias.contains_key(alias))
    }

    /// Store registered under `alias`; with no alias, the first one registered.
    pub fn resolve_by_alias(&self, alias: Option<&str>) -> Result<Arc<dyn EntityStore>> {
        let bindings = self.bindings.read()?;
        let alias = match alias {
            Some(alias) => alias,
            None => bindings
                .order
                .first()
                .map(String::as_str)
                .ok_or_else(|| TtmError::configuration("There aren't datastores registered"))?,
        };
        bindings
            .by_alias
            .get(alias)
            .map(|binding| Arc::clone(&binding.store))
            .ok_or_else(|| TtmError::configuration(format!("Datastore '{alias}' is not registered")))
    }

    /// Store owning the namespace of a qualified entity type name.
    ///
    /// With [`NamespaceMatch::Exact`] only the namespace itself is looked up.
    /// With [`NamespaceMatch::Ancestor`] the longest registered ancestor
    /// (`a.b` for `a.b.c.Type`) is tried next, down to the empty namespace.
    pub fn resolve_by_entity(&self, type_name: &str) -> Result<Arc<dyn EntityStore>> {
        let bindings = self.bindings.read()?;
        let namespace = namespace_of(type_name);

        let mut candidate = namespace;
        loop {
            if let Some(alias) = bindings.by_namespace.get(candidate) {
                if candidate != namespace {
                    tracing::trace!(type_name, namespace = candidate, "resolved by ancestor namespace");
                }
                if let Some(binding) = bindings.by_alias.get(alias) {
                    return Ok(Arc::clone(&binding.store));
                }
            }
            if self.matching == NamespaceMatch::Exact || candidate.is_empty() {
                break;
            }
            candidate = namespace_of(candidate);
        }

        Err(TtmError::configuration(format!(
            "There isn't a datastore registered for namespace '{namespace}'"
        )))
    }

    /// Registered aliases in registration order.
    pub fn aliases(&self) -> Result<Vec<String>> {
        Ok(self.bindings.read()?.order.clone())
    }

    /// Namespace bound to `alias`.
    pub fn namespace(&self, alias: &str) -> Result<Option<String>> {
        Ok(self
            .bindings
            .read()?
            .by_alias
            .get(alias)
            .map(|binding| binding.namespace.clone()))
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.bindings.read()?.order.is_empty())
    }

    /// Drops every binding; stores close when their last handle goes away.
    pub fn clear(&self) -> Result<()> {
        let mut bindings = self.bindings.write()?;
        *bindings = Bindings::default();
        tracing::debug!("datastore registry cleared");
        Ok(())
    }
}

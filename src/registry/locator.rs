use super::handler::{Command, Service};
use super::{Handler, HandlerKind};
use crate::entity::{Entity, EntityType};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Application-supplied lookup behind the resource registry.
///
/// The registry validates whatever the locator returns, so a locator may be
/// as loose as it likes.
pub trait ResourceLocator: Send + Sync {
    /// Handler for `key`: a command alias, a service interface name, or an
    /// entity alias.
    fn locate(&self, kind: HandlerKind, key: &str) -> Option<Handler>;

    /// Interface name behind a service alias.
    fn solve_service_alias(&self, alias: &str) -> Option<String> {
        Some(alias.to_string())
    }
}

/// Locator filled by registration calls at startup.
#[derive(Clone, Default)]
pub struct StaticLocator {
    commands: HashMap<String, Arc<dyn Command>>,
    services: HashMap<String, Arc<dyn Service>>,
    service_aliases: HashMap<String, String>,
    entities: HashMap<String, EntityType>,
}

impl StaticLocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn command(mut self, alias: impl Into<String>, command: impl Command + 'static) -> Self {
        self.commands.insert(alias.into(), Arc::new(command));
        self
    }

    /// Registers `service` under `interface`, reachable as `alias`.
    pub fn service(
        mut self,
        alias: impl Into<String>,
        interface: impl Into<String>,
        service: impl Service + 'static,
    ) -> Self {
        let interface = interface.into();
        self.service_aliases.insert(alias.into(), interface.clone());
        self.services.insert(interface, Arc::new(service));
        self
    }

    pub fn entity<E: Entity>(self, alias: impl Into<String>) -> Self {
        self.entity_type(alias, EntityType::of::<E>())
    }

    pub fn entity_type(mut self, alias: impl Into<String>, entity_type: EntityType) -> Self {
        self.entities.insert(alias.into(), entity_type);
        self
    }
}

impl ResourceLocator for StaticLocator {
    fn locate(&self, kind: HandlerKind, key: &str) -> Option<Handler> {
        match kind {
            HandlerKind::Command => self.commands.get(key).cloned().map(Handler::Command),
            HandlerKind::Service => self.services.get(key).cloned().map(Handler::Service),
            HandlerKind::Entity => self.entities.get(key).cloned().map(Handler::Entity),
        }
    }

    fn solve_service_alias(&self, alias: &str) -> Option<String> {
        self.service_aliases.get(alias).cloned()
    }
}

impl fmt::Debug for StaticLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticLocator")
            .field("commands", &self.commands.keys().collect::<Vec<_>>())
            .field("services", &self.service_aliases)
            .field("entities", &self.entities.keys().collect::<Vec<_>>())
            .finish()
    }
}

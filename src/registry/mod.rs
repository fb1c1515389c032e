//! Resource registry: flyweight cache of resolved handlers.
//!
//! Lookups go cache first, then to the application's [`ResourceLocator`].
//! Whatever the locator returns is checked against the requested capability
//! before it is cached; a mismatch is a configuration fault.

pub mod handler;
pub mod locator;

pub use handler::{Arguments, Command, Service, unknown_method};
pub use locator::{ResourceLocator, StaticLocator};

use crate::core::{Result, TtmError};
use crate::entity::EntityType;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerKind {
    Command,
    Service,
    Entity,
}

impl fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Command => "command",
            Self::Service => "service",
            Self::Entity => "entity",
        })
    }
}

/// A located handler of any kind.
#[derive(Clone)]
pub enum Handler {
    Command(Arc<dyn Command>),
    Service(Arc<dyn Service>),
    Entity(EntityType),
}

impl Handler {
    pub fn kind(&self) -> HandlerKind {
        match self {
            Self::Command(_) => HandlerKind::Command,
            Self::Service(_) => HandlerKind::Service,
            Self::Entity(_) => HandlerKind::Entity,
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Command(_) => f.write_str("Handler::Command"),
            Self::Service(service) => f
                .debug_tuple("Handler::Service")
                .field(&service.interfaces())
                .finish(),
            Self::Entity(entity_type) => f.debug_tuple("Handler::Entity").field(entity_type).finish(),
        }
    }
}

type CacheKey = (HandlerKind, String);

pub struct ResourceRegistry {
    locator: Arc<dyn ResourceLocator>,
    cache: RwLock<HashMap<CacheKey, Handler>>,
}

impl ResourceRegistry {
    pub fn new(locator: Arc<dyn ResourceLocator>) -> Self {
        Self {
            locator,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn locator(&self) -> Arc<dyn ResourceLocator> {
        Arc::clone(&self.locator)
    }

    pub fn command(&self, alias: &str) -> Result<Arc<dyn Command>> {
        if alias.trim().is_empty() {
            return Err(TtmError::argument("The command alias can't be null"));
        }
        match self.resolve(HandlerKind::Command, alias)? {
            Handler::Command(command) => Ok(command),
            other => Err(mismatch(HandlerKind::Command, alias, &other)),
        }
    }

    /// Service behind `alias`, cached under its interface name.
    pub fn service(&self, alias: &str) -> Result<Arc<dyn Service>> {
        if alias.trim().is_empty() {
            return Err(TtmError::argument("The service interface name can't be null"));
        }
        let interface = self
            .locator
            .solve_service_alias(alias)
            .ok_or_else(not_found)?;
        match self.resolve(HandlerKind::Service, &interface)? {
            Handler::Service(service) => Ok(service),
            other => Err(mismatch(HandlerKind::Service, &interface, &other)),
        }
    }

    pub fn entity(&self, alias: &str) -> Result<EntityType> {
        if alias.trim().is_empty() {
            return Err(TtmError::argument("The resource alias can't be null"));
        }
        match self.resolve(HandlerKind::Entity, alias)? {
            Handler::Entity(entity_type) => Ok(entity_type),
            other => Err(mismatch(HandlerKind::Entity, alias, &other)),
        }
    }

    /// Cached handler for `(kind, key)`, locating and validating it on a miss.
    pub fn resolve(&self, kind: HandlerKind, key: &str) -> Result<Handler> {
        if let Some(handler) = self.cache.read()?.get(&(kind, key.to_string())) {
            return Ok(handler.clone());
        }

        let handler = self.locator.locate(kind, key).ok_or_else(not_found)?;
        conform(kind, key, &handler)?;

        let mut cache = self.cache.write()?;
        let cached = cache
            .entry((kind, key.to_string()))
            .or_insert(handler)
            .clone();
        tracing::debug!(%kind, key, "handler cached");
        Ok(cached)
    }

    pub fn cached(&self) -> Result<usize> {
        Ok(self.cache.read()?.len())
    }

    pub fn clear(&self) -> Result<()> {
        self.cache.write()?.clear();
        tracing::debug!("resource cache cleared");
        Ok(())
    }
}

impl fmt::Debug for ResourceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cached = self.cache.read().map(|cache| cache.len()).unwrap_or(0);
        f.debug_struct("ResourceRegistry")
            .field("cached", &cached)
            .finish_non_exhaustive()
    }
}

fn not_found() -> TtmError {
    TtmError::handler_not_found("Requested service/command not found")
}

fn mismatch(expected: HandlerKind, key: &str, found: &Handler) -> TtmError {
    TtmError::configuration(format!(
        "Handler located for {expected} '{key}' is a {}",
        found.kind()
    ))
}

fn conform(kind: HandlerKind, key: &str, handler: &Handler) -> Result<()> {
    if handler.kind() != kind {
        return Err(mismatch(kind, key, handler));
    }
    match handler {
        Handler::Service(service) if !service.implements(key) => Err(TtmError::configuration(
            format!("The service located for '{key}' doesn't implement that interface"),
        )),
        Handler::Entity(entity_type) if !entity_type.has_identity() => {
            Err(TtmError::configuration(format!(
                "Entity type '{}' located for '{key}' doesn't declare an identity",
                entity_type.name()
            )))
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Value;
    use crate::entity::{Entity, EntityId, FieldDescriptor, FieldValue};
    use crate::mapper::Payload;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Ping;

    #[async_trait]
    impl Command for Ping {
        async fn execute(&self, _args: Arguments) -> Result<Payload> {
            Ok(Payload::Json("pong".into()))
        }
    }

    struct Clock;

    #[async_trait]
    impl Service for Clock {
        fn interfaces(&self) -> &[&'static str] {
            &["time.Clock"]
        }

        fn methods(&self) -> &[&'static str] {
            &["now"]
        }

        async fn invoke(&self, _method: &str, _args: Arguments) -> Result<Payload> {
            Ok(Payload::Json(0.into()))
        }
    }

    /// An entity type without identity descriptor.
    #[derive(Debug, Clone, Default)]
    struct Loose {
        note: String,
    }

    impl Entity for Loose {
        fn type_name() -> &'static str {
            "misc.Loose"
        }

        fn descriptors() -> Vec<FieldDescriptor<Self>> {
            vec![FieldDescriptor::of::<String>(
                "note",
                |e| e.note.to_value(),
                |e, v| {
                    e.note = String::from_value(v)?;
                    Ok(())
                },
            )]
        }

        fn identity(&self) -> EntityId {
            EntityId::Composite(vec![Value::Text(self.note.clone())])
        }

        fn assign_identity(&mut self, _id: EntityId) -> Result<()> {
            Ok(())
        }
    }

    /// Counts lookups and hands out whatever it was built with.
    struct Counting {
        calls: AtomicUsize,
        handler: Handler,
    }

    impl ResourceLocator for Counting {
        fn locate(&self, _kind: HandlerKind, _key: &str) -> Option<Handler> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Some(self.handler.clone())
        }
    }

    #[test]
    fn second_lookup_is_served_from_cache() {
        let locator = Arc::new(Counting {
            calls: AtomicUsize::new(0),
            handler: Handler::Command(Arc::new(Ping)),
        });
        let registry = ResourceRegistry::new(locator.clone());

        let first = registry.command("ping").unwrap();
        let second = registry.command("ping").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(locator.calls.load(Ordering::SeqCst), 1);

        registry.clear().unwrap();
        registry.command("ping").unwrap();
        assert_eq!(locator.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn wrong_kind_is_a_configuration_fault_and_not_cached() {
        let registry = ResourceRegistry::new(Arc::new(Counting {
            calls: AtomicUsize::new(0),
            handler: Handler::Command(Arc::new(Ping)),
        }));
        let err = registry.entity("widget").unwrap_err();
        assert!(matches!(err, TtmError::Configuration(_)));
        assert_eq!(registry.cached().unwrap(), 0);
    }

    #[test]
    fn services_resolve_through_their_interface() {
        let locator = StaticLocator::new()
            .service("clock", "time.Clock", Clock)
            .service("calendar", "time.Calendar", Clock);
        let registry = ResourceRegistry::new(Arc::new(locator));

        let service = registry.service("clock").unwrap();
        assert!(service.has_method("now"));

        let err = registry.service("calendar").err().unwrap();
        assert!(matches!(err, TtmError::Configuration(_)));

        let err = registry.service("weather").err().unwrap();
        assert_eq!(err.to_string(), "Requested service/command not found");
    }

    #[test]
    fn entity_types_need_an_identity() {
        let registry = ResourceRegistry::new(Arc::new(StaticLocator::new().entity::<Loose>("loose")));
        let err = registry.entity("loose").unwrap_err();
        assert!(matches!(err, TtmError::Configuration(_)));
        assert!(matches!(
            registry.entity("").unwrap_err(),
            TtmError::Argument(_)
        ));
    }
}

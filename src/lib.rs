// ============================================================================
// ttm: request dispatch and generic persistence core
// ============================================================================

// Lets `#[derive(Entity)]` output (`::ttm::...` paths) resolve inside this crate.
extern crate self as ttm;

pub mod app;
pub mod config;
pub mod core;
pub mod datastore;
pub mod dispatcher;
pub mod entity;
pub mod gateway;
pub mod mapper;
pub mod query;
pub mod registry;
pub mod storage;
pub mod web;

pub use ttm_derive::Entity;

pub use app::Application;
pub use config::{BackendConfig, CoreConfig, DatastoreConfig, MapperConfig};
pub use core::{DataType, Result, TtmError, Value, WireRecord};
pub use datastore::{DatastoreRegistry, NamespaceMatch};
pub use dispatcher::{DispatchPhase, Dispatcher, ResourceOp, Response, Route, RoutingConvention};
pub use entity::{AnyEntity, Entity, EntityId, EntityType};
pub use gateway::{CrudGateway, GatewayKind};
pub use mapper::{MapperKind, Payload, RecordMapper};
pub use registry::{
    Arguments, Command, Handler, HandlerKind, ResourceLocator, ResourceRegistry, Service,
    StaticLocator,
};
pub use storage::{EntityStore, InMemoryStore, StoreFactories, StoreFactory};

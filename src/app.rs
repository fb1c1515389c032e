//! Application root: owns the registries and wires the dispatcher.

use crate::config::CoreConfig;
use crate::core::Result;
use crate::datastore::DatastoreRegistry;
use crate::dispatcher::Dispatcher;
use crate::gateway::CrudGateway;
use crate::mapper::RecordMapper;
use crate::registry::{ResourceLocator, ResourceRegistry};
use crate::storage::StoreFactories;
use std::sync::Arc;

#[derive(Debug)]
pub struct Application {
    config: CoreConfig,
    factories: StoreFactories,
    resources: Arc<ResourceRegistry>,
    datastores: Arc<DatastoreRegistry>,
    dispatcher: Arc<Dispatcher>,
}

impl Application {
    /// Validates `config`, opens its datastores and builds the dispatcher.
    pub fn open(
        config: CoreConfig,
        locator: Arc<dyn ResourceLocator>,
        factories: StoreFactories,
    ) -> Result<Self> {
        config.validate(&factories)?;

        let datastores = Arc::new(DatastoreRegistry::with_matching(config.namespace_match));
        let opened = datastores.register(&config.datastores, &factories)?;
        let resources = Arc::new(ResourceRegistry::new(locator));
        let dispatcher = Arc::new(wire(&config, &resources, &datastores));

        tracing::info!(
            datastores = opened,
            mapper = ?config.mapper.kind,
            gateway = ?config.gateway,
            "application opened"
        );
        Ok(Self {
            config,
            factories,
            resources,
            datastores,
            dispatcher,
        })
    }

    /// Swaps in a new configuration.
    ///
    /// Fresh registries are built and the datastores reopened. Routers built
    /// before the reload keep the previous dispatcher together with its
    /// registries and datastores.
    pub fn reload(&mut self, config: CoreConfig) -> Result<()> {
        config.validate(&self.factories)?;

        let datastores = Arc::new(DatastoreRegistry::with_matching(config.namespace_match));
        let opened = datastores.register(&config.datastores, &self.factories)?;
        let resources = Arc::new(ResourceRegistry::new(self.resources.locator()));
        self.dispatcher = Arc::new(wire(&config, &resources, &datastores));
        self.resources = resources;
        self.datastores = datastores;
        self.config = config;

        tracing::info!(datastores = opened, "application reloaded");
        Ok(())
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        Arc::clone(&self.dispatcher)
    }

    pub fn gateway(&self) -> &CrudGateway {
        self.dispatcher.gateway()
    }

    pub fn datastores(&self) -> &Arc<DatastoreRegistry> {
        &self.datastores
    }

    pub fn resources(&self) -> &Arc<ResourceRegistry> {
        &self.resources
    }

    /// HTTP front for the current dispatcher.
    pub fn router(&self) -> axum::Router {
        crate::web::router(self.dispatcher())
    }
}

fn wire(
    config: &CoreConfig,
    resources: &Arc<ResourceRegistry>,
    datastores: &Arc<DatastoreRegistry>,
) -> Dispatcher {
    let gateway = CrudGateway::new(
        config.gateway,
        Arc::clone(datastores),
        RecordMapper::new(config.mapper.kind),
    );
    Dispatcher::new(
        Arc::clone(resources),
        gateway,
        config.routing.clone(),
        config.expose_internal_errors,
    )
}

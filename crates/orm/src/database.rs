//! Database - connection registry and model registry behind one handle
//!
//! A [`Database`] is produced by an explicit async initialization step that
//! pings every registered connection. After that the connection registry is
//! read-only; models may still be registered lazily on first use.

use crate::backends::DriverHandle;
use crate::config::{DatabaseConfig, DriverRegistry};
use crate::error::{ModelError, ModelResult};
use crate::model::{EventRegistry, Model, ModelDefinition, ModelEvent, ModelInstance, ModelRegistry};
use crate::query::Query;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Zero-argument factory producing a driver handle
pub type ConnectionFactory = Arc<dyn Fn() -> DriverHandle + Send + Sync>;

/// Connection name to driver factory, immutable once built
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    factories: HashMap<String, ConnectionFactory>,
}

impl ConnectionRegistry {
    /// Driver handle for the named connection
    pub fn get(&self, name: &str) -> ModelResult<DriverHandle> {
        self.factories
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| ModelError::UnknownConnection(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("connections", &self.names())
            .finish()
    }
}

/// Collects connections and models before initialization
#[derive(Default)]
pub struct DatabaseBuilder {
    connections: ConnectionRegistry,
    models: Vec<ModelDefinition>,
}

impl DatabaseBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection; a later registration with the same name replaces it
    pub fn connection<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> DriverHandle + Send + Sync + 'static,
    {
        self.connections
            .factories
            .insert(name.into(), Arc::new(factory));
        self
    }

    /// Register a shared driver under `name`
    pub fn driver(self, name: impl Into<String>, driver: DriverHandle) -> Self {
        self.connection(name, move || Arc::clone(&driver))
    }

    /// Register every configured connection, building drivers through `drivers`
    pub fn config(mut self, config: &DatabaseConfig, drivers: &DriverRegistry) -> ModelResult<Self> {
        config.validate()?;

        for (name, connection) in &config.connections {
            let driver = drivers.build(name, connection)?;
            if *name == config.default && name != crate::model::DEFAULT_CONNECTION {
                self = self.driver(crate::model::DEFAULT_CONNECTION, Arc::clone(&driver));
            }
            self = self.driver(name.clone(), driver);
        }

        Ok(self)
    }

    /// Register a model type
    pub fn model<M: Model>(self) -> Self {
        self.define(M::definition())
    }

    /// Register a model definition
    pub fn define(mut self, definition: ModelDefinition) -> Self {
        self.models.push(definition);
        self
    }

    /// Ping every connection and produce a ready handle
    pub async fn connect(self) -> ModelResult<Database> {
        for name in self.connections.names() {
            let driver = self.connections.get(name)?;
            driver.ping().await?;
            tracing::info!("Connection '{}' ready ({} driver)", name, driver.name());
        }

        let models = ModelRegistry::new();
        for definition in self.models {
            models.register(definition);
        }

        tracing::info!(
            "Database ready with {} connections and {} models",
            self.connections.factories.len(),
            models.len()
        );

        Ok(Database {
            inner: Arc::new(DatabaseInner {
                connections: self.connections,
                models,
                events: EventRegistry::new(),
            }),
        })
    }
}

struct DatabaseInner {
    connections: ConnectionRegistry,
    models: ModelRegistry,
    events: EventRegistry,
}

/// Ready database handle, cheap to clone
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

impl Database {
    pub fn builder() -> DatabaseBuilder {
        DatabaseBuilder::new()
    }

    /// Ready handle for a configuration, using only the built-in driver kinds
    pub async fn from_config(config: &DatabaseConfig) -> ModelResult<Self> {
        DatabaseBuilder::new()
            .config(config, &DriverRegistry::new())?
            .connect()
            .await
    }

    pub fn connections(&self) -> &ConnectionRegistry {
        &self.inner.connections
    }

    pub fn models(&self) -> &ModelRegistry {
        &self.inner.models
    }

    pub fn events(&self) -> &EventRegistry {
        &self.inner.events
    }

    /// Call `listener` after every `event` on a row of model `M`
    pub fn on<M, F>(&self, event: ModelEvent, listener: F) -> &Self
    where
        M: Model,
        F: Fn(&ModelInstance) + Send + Sync + 'static,
    {
        self.inner.events.on(M::NAME, event, Arc::new(listener));
        self
    }

    pub(crate) fn emit(&self, event: ModelEvent, instance: &ModelInstance) {
        self.inner.events.emit(event, instance);
    }

    /// Driver handle for a connection name
    pub fn driver(&self, connection: &str) -> ModelResult<DriverHandle> {
        self.inner.connections.get(connection)
    }

    /// Definition of `M`, registering it on first use
    pub fn definition<M: Model>(&self) -> Arc<ModelDefinition> {
        self.inner.models.get_or_register(M::NAME, M::definition)
    }

    /// Query over model `M`
    pub fn query<M: Model>(&self) -> Query {
        Query::new(self.clone(), self.definition::<M>())
    }

    /// Query over a model registered by name
    pub fn table(&self, model: &str) -> ModelResult<Query> {
        Ok(Query::new(self.clone(), self.inner.models.get(model)?))
    }

    /// New, unsaved instance of `M`
    pub fn instance<M: Model>(&self) -> ModelInstance {
        ModelInstance::new(self.clone(), self.definition::<M>())
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("connections", &self.inner.connections)
            .field("models", &self.inner.models.names())
            .field("events", &self.inner.events)
            .finish()
    }
}

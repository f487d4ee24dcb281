//! Database configuration - named connections and driver kinds
//!
//! Connections are described by serde-deserializable values and turned into
//! driver handles through registered driver factories. The `"memory"` kind
//! is always available.

use crate::backends::{memory_driver, DriverHandle};
use crate::error::{ModelError, ModelResult};
use crate::model::DEFAULT_CONNECTION;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::env;
use std::fmt;
use std::sync::Arc;

/// Driver kind every configuration can use without registration
pub const MEMORY_DRIVER: &str = "memory";

/// Builds a driver handle for a connection of a given kind
pub type DriverFactory = Arc<dyn Fn(&ConnectionConfig) -> ModelResult<DriverHandle> + Send + Sync>;

/// One named connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub driver: String,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl ConnectionConfig {
    pub fn new(driver: impl Into<String>) -> Self {
        Self {
            driver: driver.into(),
            host: None,
            port: None,
            database: None,
            user: None,
            password: None,
        }
    }

    /// In-memory connection
    pub fn memory() -> Self {
        Self::new(MEMORY_DRIVER)
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.password = Some(password.into());
        self
    }
}

/// All connections plus the name of the default one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_connection_name")]
    pub default: String,
    #[serde(default)]
    pub connections: BTreeMap<String, ConnectionConfig>,
}

fn default_connection_name() -> String {
    DEFAULT_CONNECTION.to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        let mut connections = BTreeMap::new();
        connections.insert(DEFAULT_CONNECTION.to_string(), ConnectionConfig::memory());
        Self {
            default: DEFAULT_CONNECTION.to_string(),
            connections,
        }
    }
}

impl DatabaseConfig {
    /// Empty configuration; add connections with [`DatabaseConfig::connection`]
    pub fn new() -> Self {
        Self {
            default: DEFAULT_CONNECTION.to_string(),
            connections: BTreeMap::new(),
        }
    }

    pub fn connection(mut self, name: impl Into<String>, config: ConnectionConfig) -> Self {
        self.connections.insert(name.into(), config);
        self
    }

    /// Default connection read from `ODM_*` environment variables.
    ///
    /// `ODM_DRIVER` (default `memory`), `ODM_HOST`, `ODM_PORT`, `ODM_DATABASE`,
    /// `ODM_USER`, `ODM_PASSWORD`, and `ODM_CONNECTION` naming the default.
    pub fn from_env() -> ModelResult<Self> {
        let default = env::var("ODM_CONNECTION").unwrap_or_else(|_| default_connection_name());
        let port = match env::var("ODM_PORT") {
            Ok(raw) => Some(raw.parse::<u16>().map_err(|_| {
                ModelError::Configuration(format!("ODM_PORT must be a port number, got '{}'", raw))
            })?),
            Err(_) => None,
        };

        let connection = ConnectionConfig {
            driver: env::var("ODM_DRIVER").unwrap_or_else(|_| MEMORY_DRIVER.to_string()),
            host: env::var("ODM_HOST").ok(),
            port,
            database: env::var("ODM_DATABASE").ok(),
            user: env::var("ODM_USER").ok(),
            password: env::var("ODM_PASSWORD").ok(),
        };

        let config = Self::new().connection(default.clone(), connection);
        Ok(Self { default, ..config })
    }

    pub fn validate(&self) -> ModelResult<()> {
        if self.default.trim().is_empty() {
            return Err(ModelError::Configuration(
                "Default connection name must not be empty".to_string(),
            ));
        }

        for (name, connection) in &self.connections {
            if name.trim().is_empty() {
                return Err(ModelError::Configuration(
                    "Connection names must not be empty".to_string(),
                ));
            }
            if connection.driver.trim().is_empty() {
                return Err(ModelError::Configuration(format!(
                    "Connection '{}' does not name a driver",
                    name
                )));
            }
        }

        if !self.connections.contains_key(&self.default) {
            return Err(ModelError::Configuration(format!(
                "Default connection '{}' is not configured",
                self.default
            )));
        }

        Ok(())
    }
}

/// Driver kinds by name
#[derive(Clone)]
pub struct DriverRegistry {
    factories: HashMap<String, DriverFactory>,
}

impl DriverRegistry {
    /// Registry holding only the built-in `"memory"` kind
    pub fn new() -> Self {
        let mut factories: HashMap<String, DriverFactory> = HashMap::new();
        factories.insert(MEMORY_DRIVER.to_string(), Arc::new(|_| Ok(memory_driver())));
        Self { factories }
    }

    pub fn register<F>(mut self, kind: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&ConnectionConfig) -> ModelResult<DriverHandle> + Send + Sync + 'static,
    {
        self.factories.insert(kind.into(), Arc::new(factory));
        self
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    /// Build a driver for `config`
    pub fn build(&self, name: &str, config: &ConnectionConfig) -> ModelResult<DriverHandle> {
        let factory = self.factories.get(&config.driver).ok_or_else(|| {
            ModelError::Configuration(format!(
                "Connection '{}' uses unknown driver '{}'",
                name, config.driver
            ))
        })?;
        factory(config)
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<&String> = self.factories.keys().collect();
        kinds.sort();
        f.debug_struct("DriverRegistry").field("kinds", &kinds).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for key in [
            "ODM_CONNECTION",
            "ODM_DRIVER",
            "ODM_HOST",
            "ODM_PORT",
            "ODM_DATABASE",
            "ODM_USER",
            "ODM_PASSWORD",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    fn test_default_config_is_memory() {
        let config = DatabaseConfig::default();
        assert_eq!(config.default, "default");
        assert_eq!(config.connections["default"].driver, "memory");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deserialize() {
        let config: DatabaseConfig = serde_json::from_value(serde_json::json!({
            "default": "main",
            "connections": {
                "main": { "driver": "memory" },
                "archive": { "driver": "mongodb", "host": "localhost", "port": 27017 }
            }
        }))
        .unwrap();

        assert_eq!(config.connections.len(), 2);
        assert_eq!(config.connections["archive"].port, Some(27017));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_names() {
        let config = DatabaseConfig::new().connection("", ConnectionConfig::memory());
        assert!(matches!(config.validate(), Err(ModelError::Configuration(_))));

        let missing_default = DatabaseConfig::new().connection("other", ConnectionConfig::memory());
        assert!(missing_default.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_from_env() {
        clear_env();
        env::set_var("ODM_CONNECTION", "primary");
        env::set_var("ODM_HOST", "db.internal");
        env::set_var("ODM_PORT", "27018");

        let config = DatabaseConfig::from_env().unwrap();
        assert_eq!(config.default, "primary");
        let primary = &config.connections["primary"];
        assert_eq!(primary.driver, "memory");
        assert_eq!(primary.host.as_deref(), Some("db.internal"));
        assert_eq!(primary.port, Some(27018));

        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_bad_port() {
        clear_env();
        env::set_var("ODM_PORT", "not-a-port");
        assert!(DatabaseConfig::from_env().is_err());
        clear_env();
    }

    #[test]
    fn test_driver_registry() {
        let drivers = DriverRegistry::new();
        assert!(drivers.contains("memory"));
        assert!(drivers.build("main", &ConnectionConfig::memory()).is_ok());
        assert!(drivers.build("main", &ConnectionConfig::new("mongodb")).is_err());
    }
}

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::drivers::PostgresDriver;
use crate::error::{ExtractError, Result};
use crate::traits::Driver;

/// Constructs a driver instance on demand.
pub type DriverFactory = Arc<dyn Fn() -> Result<Arc<dyn Driver>> + Send + Sync>;

/// Maps driver identifiers to factories.
///
/// Populated once at startup and handed to the connection manager.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use sqlextract::drivers::{DriverRegistry, InMemoryDriver};
/// use sqlextract::traits::Driver;
///
/// let driver = InMemoryDriver::new();
/// let registry = DriverRegistry::with_defaults()
///     .with_driver("mockdriver", move || Ok(Arc::new(driver.clone()) as Arc<dyn Driver>));
/// assert!(registry.contains("mockdriver"));
/// assert!(registry.contains("postgres"));
/// ```
#[derive(Clone, Default)]
pub struct DriverRegistry {
    factories: HashMap<String, DriverFactory>,
}

impl DriverRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in PostgreSQL driver under its usual identifiers.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for id in ["postgres", "postgresql", "org.postgresql.Driver"] {
            registry.register(id, || Ok(Arc::new(PostgresDriver::new()) as Arc<dyn Driver>));
        }
        registry
    }

    /// Register a factory, replacing any previous one under the same identifier.
    pub fn register<F>(&mut self, id: impl Into<String>, factory: F)
    where
        F: Fn() -> Result<Arc<dyn Driver>> + Send + Sync + 'static,
    {
        self.factories.insert(id.into(), Arc::new(factory));
    }

    pub fn with_driver<F>(mut self, id: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn Driver>> + Send + Sync + 'static,
    {
        self.register(id, factory);
        self
    }

    pub fn contains(&self, id: &str) -> bool {
        self.factories.contains_key(id)
    }

    /// Registered identifiers, sorted.
    pub fn identifiers(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.factories.keys().map(|s| s.as_str()).collect();
        ids.sort_unstable();
        ids
    }

    /// Instantiate the driver registered under `id`.
    pub fn create(&self, id: &str) -> Result<Arc<dyn Driver>> {
        let factory = self.factories.get(id).ok_or_else(|| {
            ExtractError::driver_load(format!("no driver registered for '{}'", id))
        })?;
        factory().map_err(|e| match e {
            ExtractError::DriverLoad(_) => e,
            other => ExtractError::driver_load(format!(
                "driver '{}' could not be instantiated: {}",
                id, other
            )),
        })
    }
}

impl fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverRegistry")
            .field("drivers", &self.identifiers())
            .finish()
    }
}

//! Driver acquisition and connection establishment.
//!
//! [`ConnectionManager::connect`] resolves the driver through the registry,
//! makes its library location available once per process, merges the
//! connection properties and opens the connection with a bounded, fixed
//! interval retry on transient failures.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::cursor::BatchCursor;
use crate::drivers::{DriverLibraryCache, DriverRegistry};
use crate::error::{ExtractError, Result};
use crate::query::QuerySpec;
use crate::schema;
use crate::traits::{Driver, RawConnection};
use crate::types::ResultSchema;

/// Maximum number of connect attempts.
pub const MAX_CONNECT_ATTEMPTS: u32 = 10;

/// Pause between two connect attempts after a transient failure.
pub const CONNECT_RETRY_INTERVAL: Duration = Duration::from_millis(300);

/// String-keyed properties handed to the driver when connecting.
#[derive(Clone, Default, PartialEq)]
pub struct ConnectionProperties {
    entries: BTreeMap<String, String>,
}

impl ConnectionProperties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a property. A later insert of the same key wins.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(|s| s.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for ConnectionProperties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (key, value) in &self.entries {
            if key.eq_ignore_ascii_case("password") {
                map.entry(key, &"***");
            } else {
                map.entry(key, value);
            }
        }
        map.finish()
    }
}

/// Everything needed to open one connection.
#[derive(Clone, PartialEq)]
pub struct ConnectionSpec {
    pub driver: String,
    pub driver_path: Option<PathBuf>,
    pub url: String,
    pub user: Option<String>,
    pub password: Option<String>,
    pub options: BTreeMap<String, String>,
    pub schema: Option<String>,
}

impl ConnectionSpec {
    pub fn new(driver: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            driver: driver.into(),
            driver_path: None,
            url: url.into(),
            user: None,
            password: None,
            options: BTreeMap::new(),
            schema: None,
        }
    }

    pub fn with_driver_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.driver_path = Some(path.into());
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Merge user, password and then the extra options, in that order.
    /// Options override `user`/`password` on collision.
    pub fn properties(&self) -> ConnectionProperties {
        let mut props = ConnectionProperties::new();
        if let Some(user) = &self.user {
            props.insert("user", user.clone());
        }
        if let Some(password) = &self.password {
            props.insert("password", password.clone());
        }
        for (key, value) in &self.options {
            props.insert(key.clone(), value.clone());
        }
        props
    }
}

impl fmt::Debug for ConnectionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSpec")
            .field("driver", &self.driver)
            .field("driver_path", &self.driver_path)
            .field("url", &self.url)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("options", &self.options.keys().collect::<Vec<_>>())
            .field("schema", &self.schema)
            .finish()
    }
}

/// Fixed-interval retry applied to transient connect failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_CONNECT_ATTEMPTS,
            interval: CONNECT_RETRY_INTERVAL,
        }
    }
}

/// Opens managed connections.
#[derive(Debug, Clone)]
pub struct ConnectionManager {
    registry: Arc<DriverRegistry>,
    libraries: Arc<DriverLibraryCache>,
    retry: RetryPolicy,
}

impl ConnectionManager {
    pub fn new(registry: Arc<DriverRegistry>, libraries: Arc<DriverLibraryCache>) -> Self {
        Self {
            registry,
            libraries,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Open a connection described by `spec`.
    pub async fn connect(&self, spec: &ConnectionSpec) -> Result<Connection> {
        if let Some(path) = &spec.driver_path {
            self.libraries.ensure_loaded(path)?;
        }
        let driver = self.registry.create(&spec.driver)?;
        let properties = spec.properties();
        debug!(driver = %spec.driver, properties = ?properties, "connecting");

        let raw = self.open_with_retry(driver.as_ref(), &spec.url, &properties).await?;
        Connection::establish(driver.name(), raw, spec.schema.clone()).await
    }

    async fn open_with_retry(
        &self,
        driver: &dyn Driver,
        url: &str,
        properties: &ConnectionProperties,
    ) -> Result<Box<dyn RawConnection>> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match driver.connect(url, properties).await {
                Ok(raw) => {
                    if attempt > 1 {
                        info!(driver = driver.name(), attempt, "connected after retry");
                    }
                    return Ok(raw);
                }
                Err(e) if e.is_transient() => {
                    if attempt >= max_attempts {
                        return Err(ExtractError::RetriesExhausted {
                            attempts: attempt,
                            source: Box::new(e),
                        });
                    }
                    warn!(
                        driver = driver.name(),
                        attempt,
                        max_attempts,
                        error = %e,
                        "transient connection failure, retrying"
                    );
                    tokio::time::sleep(self.retry.interval).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// An open connection, optionally narrowed to a schema.
///
/// Owns the raw driver connection; [`Connection::close`] releases it exactly
/// once. A connection dropped without `close` is released by the driver's
/// own drop and logs a warning.
pub struct Connection {
    driver: String,
    raw: Option<Box<dyn RawConnection>>,
    schema: Option<String>,
}

impl Connection {
    pub(crate) async fn establish(
        driver: &str,
        mut raw: Box<dyn RawConnection>,
        schema: Option<String>,
    ) -> Result<Self> {
        if let Some(name) = schema.as_deref() {
            if let Err(e) = raw.set_schema(name).await {
                if let Err(close_err) = raw.close().await {
                    warn!(driver, error = %close_err, "failed to close connection after schema error");
                }
                return Err(e);
            }
        }
        Ok(Self {
            driver: driver.to_string(),
            raw: Some(raw),
            schema,
        })
    }

    pub fn driver_name(&self) -> &str {
        &self.driver
    }

    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    pub fn is_closed(&self) -> bool {
        self.raw.is_none()
    }

    /// The single statement to execute for `spec`.
    pub fn resolve_query(&self, spec: &QuerySpec) -> Result<String> {
        spec.resolve()
    }

    /// Result column metadata of `query`; no row is fetched.
    pub async fn introspect(&self, query: &str) -> Result<ResultSchema> {
        schema::introspect(self.raw()?, query).await
    }

    /// Execute `query` behind a cursor returning up to `fetch_size` rows per fetch.
    pub async fn open_cursor(&self, query: &str, fetch_size: usize) -> Result<BatchCursor> {
        if fetch_size == 0 {
            return Err(ExtractError::config("fetch size must be at least 1"));
        }
        let mut cursor = BatchCursor::new(fetch_size);
        cursor.open(self.raw()?, query).await?;
        Ok(cursor)
    }

    /// Close the raw connection. Idempotent.
    pub async fn close(&mut self) -> Result<()> {
        match self.raw.take() {
            Some(mut raw) => {
                debug!(driver = %self.driver, "closing connection");
                raw.close().await
            }
            None => Ok(()),
        }
    }

    fn raw(&self) -> Result<&dyn RawConnection> {
        self.raw
            .as_deref()
            .ok_or_else(|| ExtractError::connection("connection is closed"))
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if self.raw.is_some() {
            warn!(driver = %self.driver, "connection dropped without close");
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("driver", &self.driver)
            .field("schema", &self.schema)
            .field("closed", &self.is_closed())
            .finish()
    }
}

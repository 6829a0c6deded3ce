//! Task configuration.
//!
//! # Example
//!
//! ```json
//! {
//!   "driver_class": "org.postgresql.Driver",
//!   "url": "postgresql://db.internal:5432/shop",
//!   "user": "reader",
//!   "password": "secret",
//!   "schema": "sales",
//!   "options": { "application_name": "nightly-export" },
//!   "table": "orders",
//!   "where": "created_at >= '2024-01-01'",
//!   "order_by": "id",
//!   "fetch_rows": 5000
//! }
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::connection::ConnectionSpec;
use crate::error::{ExtractError, Result};
use crate::getters::ColumnGetterFactory;
use crate::query::QuerySpec;

/// Default number of rows requested per fetch.
pub const DEFAULT_FETCH_ROWS: usize = 10_000;

fn default_fetch_rows() -> usize {
    DEFAULT_FETCH_ROWS
}

/// Configuration of one extraction task.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractConfig {
    /// Driver library location, loaded once per process.
    #[serde(default)]
    pub driver_path: Option<PathBuf>,

    /// Registry identifier of the driver.
    pub driver_class: String,

    pub url: String,

    #[serde(default)]
    pub user: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// Schema/namespace to narrow unqualified names to.
    #[serde(default)]
    pub schema: Option<String>,

    /// Extra driver properties; override `user`/`password` on collision.
    #[serde(default)]
    pub options: BTreeMap<String, String>,

    #[serde(default)]
    pub table: Option<String>,

    #[serde(default)]
    pub query: Option<String>,

    #[serde(default)]
    pub select: Option<String>,

    #[serde(default, rename = "where")]
    pub where_clause: Option<String>,

    #[serde(default)]
    pub order_by: Option<String>,

    /// Rows requested per fetch (default: 10000).
    #[serde(default = "default_fetch_rows")]
    pub fetch_rows: usize,

    /// Offset east of UTC, in seconds, for zoneless dates and timestamps (default: 0).
    #[serde(default)]
    pub default_timezone_offset_secs: i32,
}

impl ExtractConfig {
    pub fn new(driver_class: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            driver_path: None,
            driver_class: driver_class.into(),
            url: url.into(),
            user: None,
            password: None,
            schema: None,
            options: BTreeMap::new(),
            table: None,
            query: None,
            select: None,
            where_clause: None,
            order_by: None,
            fetch_rows: DEFAULT_FETCH_ROWS,
            default_timezone_offset_secs: 0,
        }
    }

    /// Parse and validate a JSON configuration document.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| ExtractError::config(format!("invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_fetch_rows(mut self, fetch_rows: usize) -> Self {
        self.fetch_rows = fetch_rows;
        self
    }

    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Check required fields and value ranges.
    /// The query shape is checked separately by [`QuerySpec::validate`].
    pub fn validate(&self) -> Result<()> {
        if self.driver_class.trim().is_empty() {
            return Err(ExtractError::config("'driver_class' must not be empty"));
        }
        if self.url.trim().is_empty() {
            return Err(ExtractError::config("'url' must not be empty"));
        }
        if self.fetch_rows == 0 {
            return Err(ExtractError::config("'fetch_rows' must be at least 1"));
        }
        self.getter_factory()?;
        Ok(())
    }

    pub fn connection_spec(&self) -> ConnectionSpec {
        ConnectionSpec {
            driver: self.driver_class.clone(),
            driver_path: self.driver_path.clone(),
            url: self.url.clone(),
            user: self.user.clone(),
            password: self.password.clone(),
            options: self.options.clone(),
            schema: self.schema.clone(),
        }
    }

    pub fn query_spec(&self) -> QuerySpec {
        QuerySpec {
            query: self.query.clone(),
            table: self.table.clone(),
            select: self.select.clone(),
            where_clause: self.where_clause.clone(),
            order_by: self.order_by.clone(),
        }
    }

    pub fn getter_factory(&self) -> Result<ColumnGetterFactory> {
        ColumnGetterFactory::from_offset_secs(self.default_timezone_offset_secs)
    }
}

impl fmt::Debug for ExtractConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractConfig")
            .field("driver_path", &self.driver_path)
            .field("driver_class", &self.driver_class)
            .field("url", &self.url)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("schema", &self.schema)
            .field("options", &self.options.keys().collect::<Vec<_>>())
            .field("table", &self.table)
            .field("query", &self.query)
            .field("select", &self.select)
            .field("where", &self.where_clause)
            .field("order_by", &self.order_by)
            .field("fetch_rows", &self.fetch_rows)
            .field(
                "default_timezone_offset_secs",
                &self.default_timezone_offset_secs,
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_json() {
        let config = ExtractConfig::from_json(
            r#"{"driver_class": "postgres", "url": "postgres://localhost/db", "table": "users"}"#,
        )
        .unwrap();
        assert_eq!(config.fetch_rows, DEFAULT_FETCH_ROWS);
        assert!(config.options.is_empty());
        assert_eq!(config.default_timezone_offset_secs, 0);
        assert_eq!(config.query_spec().resolve().unwrap(), "SELECT * FROM users");
    }

    #[test]
    fn test_full_json() {
        let config = ExtractConfig::from_json(
            r#"{
                "driver_path": "/opt/drivers/pg",
                "driver_class": "org.postgresql.Driver",
                "url": "postgresql://db/shop",
                "user": "reader",
                "password": "secret",
                "schema": "sales",
                "options": {"application_name": "export"},
                "table": "orders",
                "select": "id, total",
                "where": "total > 0",
                "order_by": "id",
                "fetch_rows": 250
            }"#,
        )
        .unwrap();

        let spec = config.connection_spec();
        assert_eq!(spec.driver, "org.postgresql.Driver");
        assert_eq!(spec.driver_path, Some(PathBuf::from("/opt/drivers/pg")));
        assert_eq!(spec.schema.as_deref(), Some("sales"));
        assert_eq!(spec.properties().get("application_name"), Some("export"));
        assert_eq!(config.fetch_rows, 250);
        assert_eq!(
            config.query_spec().resolve().unwrap(),
            "SELECT id, total FROM orders WHERE total > 0 ORDER BY id"
        );
    }

    #[test]
    fn test_missing_required_field() {
        let err = ExtractConfig::from_json(r#"{"url": "postgres://localhost/db"}"#).unwrap_err();
        assert!(matches!(err, ExtractError::Config(_)));
    }

    #[test]
    fn test_zero_fetch_rows_rejected() {
        let config = ExtractConfig::new("postgres", "postgres://localhost/db")
            .with_table("users")
            .with_fetch_rows(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_timezone_offset_rejected() {
        let mut config = ExtractConfig::new("postgres", "postgres://localhost/db");
        config.default_timezone_offset_secs = 90_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_debug_redacts_password() {
        let config = ExtractConfig::new("postgres", "postgres://localhost/db")
            .with_credentials("reader", "hunter2");
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("reader"));
    }
}

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use tokio_postgres::error::SqlState;
use tokio_postgres::types::{FromSql, Type};
use tokio_postgres::{Client, Config, NoTls, Row};
use tracing::{debug, error, warn};

use crate::connection::ConnectionProperties;
use crate::error::{ExtractError, Result};
use crate::traits::{Driver, RawConnection, RawCursor, ResultRow};
use crate::types::{NativeColumn, NativeType};

/// Prefix of JDBC-style URLs, stripped before parsing.
const JDBC_PREFIX: &str = "jdbc:";

static NEXT_CURSOR_ID: AtomicU64 = AtomicU64::new(1);

/// PostgreSQL driver implementation using tokio-postgres.
///
/// Accepts `postgres://`, `postgresql://` and `jdbc:postgresql://` URLs as
/// well as key/value connection strings. Rows are streamed through a
/// server-side cursor inside a read-only transaction.
#[derive(Debug, Clone, Default)]
pub struct PostgresDriver;

impl PostgresDriver {
    pub fn new() -> Self {
        Self
    }

    /// Parse `url` and apply the connection properties on top of it.
    pub fn config(url: &str, properties: &ConnectionProperties) -> Result<Config> {
        let url = url.strip_prefix(JDBC_PREFIX).unwrap_or(url);
        let mut config: Config = url
            .parse()
            .map_err(|e| ExtractError::config(format!("invalid PostgreSQL URL: {}", e)))?;

        for (key, value) in properties.iter() {
            match key {
                "user" => {
                    config.user(value);
                }
                "password" => {
                    config.password(value);
                }
                "dbname" => {
                    config.dbname(value);
                }
                "application_name" => {
                    config.application_name(value);
                }
                "options" => {
                    config.options(value);
                }
                "connect_timeout" => {
                    let secs: u64 = value.parse().map_err(|_| {
                        ExtractError::config(format!(
                            "connect_timeout must be a number of seconds, got '{}'",
                            value
                        ))
                    })?;
                    config.connect_timeout(Duration::from_secs(secs));
                }
                other => warn!(property = other, "ignoring unsupported PostgreSQL property"),
            }
        }
        Ok(config)
    }
}

#[async_trait]
impl Driver for PostgresDriver {
    fn name(&self) -> &str {
        "postgres"
    }

    async fn connect(
        &self,
        url: &str,
        properties: &ConnectionProperties,
    ) -> Result<Box<dyn RawConnection>> {
        let config = Self::config(url, properties)?;
        let (client, connection) = config
            .connect(NoTls)
            .await
            .map_err(classify_connect_error)?;

        // Spawn the connection handler
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!(error = %e, "PostgreSQL connection error");
            }
        });

        Ok(Box::new(PostgresConnection {
            client: Some(Arc::new(client)),
        }))
    }
}

fn classify_connect_error(e: tokio_postgres::Error) -> ExtractError {
    if is_transient(&e) {
        ExtractError::transient_with_source("could not reach PostgreSQL server", e)
    } else {
        ExtractError::connection_with_source("PostgreSQL rejected the connection", e)
    }
}

/// Connection exceptions (class 08), servers still starting up, connection
/// slots exhausted and plain I/O failures may succeed on a later attempt.
fn is_transient(e: &tokio_postgres::Error) -> bool {
    if let Some(state) = e.code() {
        return state.code().starts_with("08")
            || *state == SqlState::CANNOT_CONNECT_NOW
            || *state == SqlState::TOO_MANY_CONNECTIONS;
    }
    std::error::Error::source(e).map_or(false, |source| source.is::<std::io::Error>())
}

fn native_type(ty: &Type) -> NativeType {
    match *ty {
        Type::BOOL => NativeType::Boolean,
        Type::INT2 => NativeType::SmallInt,
        Type::INT4 => NativeType::Integer,
        Type::INT8 | Type::OID => NativeType::BigInt,
        Type::FLOAT4 => NativeType::Real,
        Type::FLOAT8 => NativeType::Double,
        Type::NUMERIC => NativeType::Numeric,
        Type::CHAR | Type::BPCHAR => NativeType::Char,
        Type::VARCHAR => NativeType::Varchar,
        Type::TEXT | Type::NAME => NativeType::Text,
        Type::UUID => NativeType::Uuid,
        Type::DATE => NativeType::Date,
        Type::TIME => NativeType::Time,
        Type::TIMESTAMP => NativeType::Timestamp,
        Type::TIMESTAMPTZ => NativeType::TimestampTz,
        Type::JSON | Type::JSONB => NativeType::Json,
        Type::BYTEA => NativeType::Binary,
        _ => NativeType::Other(ty.name().to_string()),
    }
}

struct PostgresConnection {
    client: Option<Arc<Client>>,
}

impl PostgresConnection {
    fn client(&self) -> Result<&Arc<Client>> {
        self.client
            .as_ref()
            .ok_or_else(|| ExtractError::connection("connection is closed"))
    }
}

#[async_trait]
impl RawConnection for PostgresConnection {
    async fn set_schema(&mut self, schema: &str) -> Result<()> {
        let sql = format!("SET search_path TO {}", schema);
        self.client()?
            .batch_execute(&sql)
            .await
            .map_err(|e| ExtractError::Schema {
                message: format!("failed to set schema '{}'", schema),
                source: Some(Box::new(e)),
            })
    }

    async fn describe(&self, sql: &str) -> Result<Vec<NativeColumn>> {
        let statement = self
            .client()?
            .prepare(sql)
            .await
            .map_err(|e| ExtractError::query_with_sql("failed to prepare query", sql, e))?;

        Ok(statement
            .columns()
            .iter()
            .map(|c| {
                NativeColumn::new(c.name(), native_type(c.type_())).with_type_name(c.type_().name())
            })
            .collect())
    }

    async fn open_cursor(&self, sql: &str, fetch_size: usize) -> Result<Box<dyn RawCursor>> {
        let client = Arc::clone(self.client()?);
        let name = format!("sqlextract_cursor_{}", NEXT_CURSOR_ID.fetch_add(1, Ordering::Relaxed));

        client
            .batch_execute("BEGIN READ ONLY")
            .await
            .map_err(|e| ExtractError::query_with_sql("failed to start transaction", sql, e))?;

        let declare = format!("DECLARE {} NO SCROLL CURSOR FOR {}", name, sql);
        if let Err(e) = client.batch_execute(&declare).await {
            if let Err(rollback_err) = client.batch_execute("ROLLBACK").await {
                warn!(error = %rollback_err, "failed to roll back after cursor error");
            }
            return Err(ExtractError::query_with_sql("failed to execute query", sql, e));
        }
        debug!(cursor = %name, fetch_size, "declared cursor");

        Ok(Box::new(PostgresCursor {
            client,
            fetch_sql: format!("FETCH FORWARD {} FROM {}", fetch_size, name),
            name,
        }))
    }

    async fn close(&mut self) -> Result<()> {
        // Dropping the last client handle ends the spawned connection task.
        self.client = None;
        Ok(())
    }
}

struct PostgresCursor {
    client: Arc<Client>,
    name: String,
    fetch_sql: String,
}

#[async_trait]
impl RawCursor for PostgresCursor {
    async fn fetch(&mut self) -> Result<Vec<Box<dyn ResultRow>>> {
        let rows = self
            .client
            .query(self.fetch_sql.as_str(), &[])
            .await
            .map_err(|e| ExtractError::query_with_sql("failed to fetch rows", &self.fetch_sql, e))?;
        Ok(rows
            .into_iter()
            .map(|row| Box::new(PostgresRow { row }) as Box<dyn ResultRow>)
            .collect())
    }

    async fn close(&mut self) -> Result<()> {
        let sql = format!("CLOSE {}; COMMIT", self.name);
        self.client
            .batch_execute(&sql)
            .await
            .map_err(|e| ExtractError::query_with_sql("failed to close cursor", sql.as_str(), e))
    }
}

struct PostgresRow {
    row: Row,
}

impl PostgresRow {
    fn position(&self, index: usize) -> Result<usize> {
        index
            .checked_sub(1)
            .filter(|i| *i < self.row.len())
            .ok_or_else(|| {
                ExtractError::type_conversion(format!(
                    "column index {} out of range for row of {} columns",
                    index,
                    self.row.len()
                ))
            })
    }

    fn column_type(&self, index: usize) -> Result<&Type> {
        let position = self.position(index)?;
        Ok(self.row.columns()[position].type_())
    }

    fn get<'a, T: FromSql<'a>>(&'a self, index: usize) -> Result<Option<T>> {
        let position = self.position(index)?;
        self.row.try_get::<_, Option<T>>(position).map_err(|e| {
            ExtractError::type_conversion(format!("column {}: {}", index, e))
        })
    }

    fn unexpected(&self, index: usize, requested: &str) -> ExtractError {
        let type_name = self
            .column_type(index)
            .map(|t| t.name().to_string())
            .unwrap_or_default();
        ExtractError::type_conversion(format!(
            "column {} of type {} cannot be read as {}",
            index, type_name, requested
        ))
    }
}

impl ResultRow for PostgresRow {
    fn get_bool(&self, index: usize) -> Result<Option<bool>> {
        self.get(index)
    }

    fn get_i64(&self, index: usize) -> Result<Option<i64>> {
        match *self.column_type(index)? {
            Type::INT2 => Ok(self.get::<i16>(index)?.map(i64::from)),
            Type::INT4 => Ok(self.get::<i32>(index)?.map(i64::from)),
            Type::INT8 => self.get::<i64>(index),
            Type::OID => Ok(self.get::<u32>(index)?.map(i64::from)),
            _ => Err(self.unexpected(index, "an integer")),
        }
    }

    fn get_f64(&self, index: usize) -> Result<Option<f64>> {
        match *self.column_type(index)? {
            Type::FLOAT4 => Ok(self.get::<f32>(index)?.map(f64::from)),
            Type::FLOAT8 => self.get::<f64>(index),
            _ => Err(self.unexpected(index, "a floating point number")),
        }
    }

    fn get_decimal(&self, index: usize) -> Result<Option<Decimal>> {
        self.get(index)
    }

    fn get_string(&self, index: usize) -> Result<Option<String>> {
        match *self.column_type(index)? {
            Type::UUID => Ok(self.get::<uuid::Uuid>(index)?.map(|u| u.to_string())),
            Type::CHAR => Ok(self
                .get::<i8>(index)?
                .map(|c| char::from(c as u8).to_string())),
            _ => self.get::<String>(index),
        }
    }

    fn get_date(&self, index: usize) -> Result<Option<NaiveDate>> {
        self.get(index)
    }

    fn get_time(&self, index: usize) -> Result<Option<NaiveTime>> {
        self.get(index)
    }

    fn get_timestamp(&self, index: usize) -> Result<Option<NaiveDateTime>> {
        self.get(index)
    }

    fn get_timestamp_tz(&self, index: usize) -> Result<Option<DateTime<Utc>>> {
        self.get(index)
    }

    fn get_json(&self, index: usize) -> Result<Option<serde_json::Value>> {
        self.get(index)
    }
}

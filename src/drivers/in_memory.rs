use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use tracing::debug;

use crate::connection::ConnectionProperties;
use crate::error::{ExtractError, Result};
use crate::traits::{Driver, RawConnection, RawCursor, ResultRow};
use crate::types::{NativeColumn, NativeType, NativeValue};

/// How a query reached the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Describe,
    Execute { fetch_size: usize },
}

/// A recorded query for verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedQuery {
    pub sql: String,
    pub kind: QueryKind,
}

/// Lifecycle events observed by the driver, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverEvent {
    Connected,
    SchemaSet(String),
    CursorOpened,
    CursorClosed,
    ConnectionClosed,
}

/// Columns and rows returned for one SQL text.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InMemoryResultSet {
    columns: Vec<NativeColumn>,
    rows: Vec<Vec<NativeValue>>,
}

impl InMemoryResultSet {
    pub fn columns(&self) -> &[NativeColumn] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<NativeValue>] {
        &self.rows
    }
}

/// Builder for in-memory result sets.
#[derive(Debug, Default)]
pub struct InMemoryResultSetBuilder {
    columns: Vec<NativeColumn>,
    rows: Vec<Vec<NativeValue>>,
}

impl InMemoryResultSetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn column(mut self, name: &str, native_type: NativeType) -> Self {
        self.columns.push(NativeColumn::new(name, native_type));
        self
    }

    /// Add a NUMERIC-like column with explicit precision and scale.
    pub fn numeric_column(mut self, name: &str, precision: u32, scale: u32) -> Self {
        self.columns
            .push(NativeColumn::new(name, NativeType::Numeric).with_precision(precision, scale));
        self
    }

    pub fn native_column(mut self, column: NativeColumn) -> Self {
        self.columns.push(column);
        self
    }

    pub fn row(mut self, values: Vec<NativeValue>) -> Self {
        self.rows.push(values);
        self
    }

    pub fn build(self) -> InMemoryResultSet {
        InMemoryResultSet {
            columns: self.columns,
            rows: self.rows,
        }
    }
}

#[derive(Default)]
struct State {
    results: Mutex<HashMap<String, InMemoryResultSet>>,
    connect_failures: Mutex<VecDeque<ExtractError>>,
    schema_failure: Mutex<Option<String>>,
    fetch_failure: Mutex<Option<(usize, String)>>,
    recorded_queries: Mutex<Vec<RecordedQuery>>,
    last_properties: Mutex<Option<ConnectionProperties>>,
    events: Mutex<Vec<DriverEvent>>,
    connect_attempts: AtomicUsize,
    fetch_calls: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// An in-memory database driver for testing.
///
/// Serves result sets keyed by exact SQL text, can be scripted to fail at
/// connect, schema or fetch time, and records everything it is asked to do.
/// Clones share state, so a clone can be handed to a registry while the
/// original is kept for assertions.
///
/// # Example
/// ```
/// use sqlextract::drivers::{InMemoryDriver, InMemoryResultSetBuilder};
/// use sqlextract::types::{NativeType, NativeValue};
///
/// let driver = InMemoryDriver::new().with_result(
///     "SELECT * FROM users",
///     InMemoryResultSetBuilder::new()
///         .column("id", NativeType::Integer)
///         .column("name", NativeType::Text)
///         .row(vec![NativeValue::from(1), NativeValue::from("Alice")])
///         .build(),
/// );
/// assert_eq!(driver.connect_attempts(), 0);
/// ```
#[derive(Clone)]
pub struct InMemoryDriver {
    name: String,
    state: Arc<State>,
}

impl InMemoryDriver {
    pub fn new() -> Self {
        Self::named("in-memory")
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(State::default()),
        }
    }

    /// Serve `result` for queries whose text equals `sql`.
    pub fn with_result(self, sql: impl Into<String>, result: InMemoryResultSet) -> Self {
        lock(&self.state.results).insert(sql.into(), result);
        self
    }

    /// Fail the next connect attempts with these errors, one per attempt.
    pub fn with_connect_failures(self, failures: impl IntoIterator<Item = ExtractError>) -> Self {
        lock(&self.state.connect_failures).extend(failures);
        self
    }

    /// Fail every `set_schema` call.
    pub fn with_schema_failure(self, message: impl Into<String>) -> Self {
        *lock(&self.state.schema_failure) = Some(message.into());
        self
    }

    /// Fail the fetch call with the given 0-based index, counted per cursor.
    pub fn with_fetch_failure(self, fetch_index: usize, message: impl Into<String>) -> Self {
        *lock(&self.state.fetch_failure) = Some((fetch_index, message.into()));
        self
    }

    pub fn connect_attempts(&self) -> usize {
        self.state.connect_attempts.load(Ordering::SeqCst)
    }

    /// Properties passed to the most recent connect attempt.
    pub fn last_properties(&self) -> Option<ConnectionProperties> {
        lock(&self.state.last_properties).clone()
    }

    pub fn recorded_queries(&self) -> Vec<RecordedQuery> {
        lock(&self.state.recorded_queries).clone()
    }

    pub fn last_query(&self) -> Option<RecordedQuery> {
        lock(&self.state.recorded_queries).last().cloned()
    }

    pub fn events(&self) -> Vec<DriverEvent> {
        lock(&self.state.events).clone()
    }

    /// Total number of fetch calls across all cursors.
    pub fn fetch_calls(&self) -> usize {
        self.state.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn connections_closed(&self) -> usize {
        self.count_events(|e| *e == DriverEvent::ConnectionClosed)
    }

    pub fn cursors_closed(&self) -> usize {
        self.count_events(|e| *e == DriverEvent::CursorClosed)
    }

    /// Schemas requested through `set_schema`, in order.
    pub fn schemas_set(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                DriverEvent::SchemaSet(schema) => Some(schema),
                _ => None,
            })
            .collect()
    }

    /// Assert that the last query matches the expected SQL and kind.
    pub fn assert_last_query(&self, expected_sql: &str, expected_kind: QueryKind) {
        let last = self.last_query().expect("No queries were recorded");
        assert_eq!(
            last.sql, expected_sql,
            "SQL mismatch.\nExpected: {}\nActual: {}",
            expected_sql, last.sql
        );
        assert_eq!(
            last.kind, expected_kind,
            "Query kind mismatch.\nExpected: {:?}\nActual: {:?}",
            expected_kind, last.kind
        );
    }

    /// Assert that exactly n queries were described or executed.
    pub fn assert_query_count(&self, expected: usize) {
        let actual = lock(&self.state.recorded_queries).len();
        assert_eq!(
            actual, expected,
            "Query count mismatch. Expected: {}, Actual: {}",
            expected, actual
        );
    }

    fn count_events(&self, predicate: impl Fn(&DriverEvent) -> bool) -> usize {
        lock(&self.state.events).iter().filter(|e| predicate(e)).count()
    }
}

impl Default for InMemoryDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Driver for InMemoryDriver {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(
        &self,
        url: &str,
        properties: &ConnectionProperties,
    ) -> Result<Box<dyn RawConnection>> {
        let attempt = self.state.connect_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        *lock(&self.state.last_properties) = Some(properties.clone());
        debug!(driver = %self.name, url, attempt, "in-memory connect");

        if let Some(err) = lock(&self.state.connect_failures).pop_front() {
            return Err(err);
        }
        lock(&self.state.events).push(DriverEvent::Connected);
        Ok(Box::new(InMemoryConnection {
            state: Arc::clone(&self.state),
        }))
    }
}

struct InMemoryConnection {
    state: Arc<State>,
}

impl InMemoryConnection {
    fn record(&self, sql: &str, kind: QueryKind) {
        lock(&self.state.recorded_queries).push(RecordedQuery {
            sql: sql.to_string(),
            kind,
        });
    }

    fn result_for(&self, sql: &str) -> Result<InMemoryResultSet> {
        lock(&self.state.results)
            .get(sql)
            .cloned()
            .ok_or_else(|| ExtractError::Query {
                message: "no result configured for query".to_string(),
                sql: Some(sql.to_string()),
                source: None,
            })
    }
}

#[async_trait]
impl RawConnection for InMemoryConnection {
    async fn set_schema(&mut self, schema: &str) -> Result<()> {
        if let Some(message) = lock(&self.state.schema_failure).clone() {
            return Err(ExtractError::schema(message));
        }
        lock(&self.state.events).push(DriverEvent::SchemaSet(schema.to_string()));
        Ok(())
    }

    async fn describe(&self, sql: &str) -> Result<Vec<NativeColumn>> {
        self.record(sql, QueryKind::Describe);
        Ok(self.result_for(sql)?.columns)
    }

    async fn open_cursor(&self, sql: &str, fetch_size: usize) -> Result<Box<dyn RawCursor>> {
        self.record(sql, QueryKind::Execute { fetch_size });
        let result = self.result_for(sql)?;
        lock(&self.state.events).push(DriverEvent::CursorOpened);
        Ok(Box::new(InMemoryCursor {
            rows: result.rows.into(),
            fetch_size: fetch_size.max(1),
            fetches: 0,
            state: Arc::clone(&self.state),
        }))
    }

    async fn close(&mut self) -> Result<()> {
        lock(&self.state.events).push(DriverEvent::ConnectionClosed);
        Ok(())
    }
}

struct InMemoryCursor {
    rows: VecDeque<Vec<NativeValue>>,
    fetch_size: usize,
    fetches: usize,
    state: Arc<State>,
}

#[async_trait]
impl RawCursor for InMemoryCursor {
    async fn fetch(&mut self) -> Result<Vec<Box<dyn ResultRow>>> {
        let index = self.fetches;
        self.fetches += 1;
        self.state.fetch_calls.fetch_add(1, Ordering::SeqCst);

        if let Some((fail_at, message)) = lock(&self.state.fetch_failure).clone() {
            if fail_at == index {
                return Err(ExtractError::query(message));
            }
        }

        let take = self.fetch_size.min(self.rows.len());
        Ok(self
            .rows
            .drain(..take)
            .map(|values| Box::new(InMemoryRow { values }) as Box<dyn ResultRow>)
            .collect())
    }

    async fn close(&mut self) -> Result<()> {
        lock(&self.state.events).push(DriverEvent::CursorClosed);
        Ok(())
    }
}

/// One row served by [`InMemoryDriver`].
#[derive(Debug, Clone, PartialEq)]
pub struct InMemoryRow {
    values: Vec<NativeValue>,
}

impl InMemoryRow {
    pub fn new(values: Vec<NativeValue>) -> Self {
        Self { values }
    }

    fn cell(&self, index: usize) -> Result<&NativeValue> {
        index
            .checked_sub(1)
            .and_then(|i| self.values.get(i))
            .ok_or_else(|| {
                ExtractError::type_conversion(format!(
                    "column index {} out of range for row of {} columns",
                    index,
                    self.values.len()
                ))
            })
    }

    fn convert<T>(
        &self,
        index: usize,
        expected: &str,
        f: impl FnOnce(&NativeValue) -> Option<T>,
    ) -> Result<Option<T>> {
        let cell = self.cell(index)?;
        if cell.is_null() {
            return Ok(None);
        }
        f(cell).map(Some).ok_or_else(|| {
            ExtractError::type_conversion(format!(
                "column {} holds {:?}, not a {}",
                index, cell, expected
            ))
        })
    }
}

impl ResultRow for InMemoryRow {
    fn get_bool(&self, index: usize) -> Result<Option<bool>> {
        self.convert(index, "boolean", |v| match v {
            NativeValue::Bool(b) => Some(*b),
            _ => None,
        })
    }

    fn get_i64(&self, index: usize) -> Result<Option<i64>> {
        self.convert(index, "integer", |v| match v {
            NativeValue::Int(i) => Some(*i),
            _ => None,
        })
    }

    fn get_f64(&self, index: usize) -> Result<Option<f64>> {
        self.convert(index, "floating point number", |v| match v {
            NativeValue::Float(f) => Some(*f),
            NativeValue::Int(i) => Some(*i as f64),
            _ => None,
        })
    }

    fn get_decimal(&self, index: usize) -> Result<Option<Decimal>> {
        self.convert(index, "decimal", |v| match v {
            NativeValue::Decimal(d) => Some(*d),
            NativeValue::Int(i) => Some(Decimal::from(*i)),
            _ => None,
        })
    }

    fn get_string(&self, index: usize) -> Result<Option<String>> {
        self.convert(index, "string", |v| match v {
            NativeValue::Text(s) => Some(s.clone()),
            NativeValue::Int(i) => Some(i.to_string()),
            NativeValue::Float(f) => Some(f.to_string()),
            NativeValue::Decimal(d) => Some(d.to_string()),
            NativeValue::Bool(b) => Some(b.to_string()),
            _ => None,
        })
    }

    fn get_date(&self, index: usize) -> Result<Option<NaiveDate>> {
        self.convert(index, "date", |v| match v {
            NativeValue::Date(d) => Some(*d),
            _ => None,
        })
    }

    fn get_time(&self, index: usize) -> Result<Option<NaiveTime>> {
        self.convert(index, "time", |v| match v {
            NativeValue::Time(t) => Some(*t),
            _ => None,
        })
    }

    fn get_timestamp(&self, index: usize) -> Result<Option<NaiveDateTime>> {
        self.convert(index, "timestamp", |v| match v {
            NativeValue::Timestamp(ts) => Some(*ts),
            _ => None,
        })
    }

    fn get_timestamp_tz(&self, index: usize) -> Result<Option<DateTime<Utc>>> {
        self.convert(index, "timestamp with time zone", |v| match v {
            NativeValue::TimestampTz(ts) => Some(*ts),
            _ => None,
        })
    }

    fn get_json(&self, index: usize) -> Result<Option<serde_json::Value>> {
        self.convert(index, "json document", |v| match v {
            NativeValue::Json(j) => Some(j.clone()),
            NativeValue::Text(s) => serde_json::from_str(s).ok(),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> InMemoryResultSet {
        InMemoryResultSetBuilder::new()
            .column("id", NativeType::Integer)
            .column("name", NativeType::Text)
            .row(vec![1.into(), "Alice".into()])
            .row(vec![2.into(), NativeValue::Null])
            .row(vec![3.into(), "Carol".into()])
            .build()
    }

    #[tokio::test]
    async fn test_cursor_chunks_rows_by_fetch_size() {
        let driver = InMemoryDriver::new().with_result("SELECT * FROM users", users());
        let mut conn = driver
            .connect("mem://", &ConnectionProperties::new())
            .await
            .unwrap();
        let mut cursor = conn.open_cursor("SELECT * FROM users", 2).await.unwrap();

        assert_eq!(cursor.fetch().await.unwrap().len(), 2);
        assert_eq!(cursor.fetch().await.unwrap().len(), 1);
        assert!(cursor.fetch().await.unwrap().is_empty());
        cursor.close().await.unwrap();
        conn.close().await.unwrap();

        driver.assert_last_query("SELECT * FROM users", QueryKind::Execute { fetch_size: 2 });
        assert_eq!(driver.fetch_calls(), 3);
        assert_eq!(
            driver.events(),
            vec![
                DriverEvent::Connected,
                DriverEvent::CursorOpened,
                DriverEvent::CursorClosed,
                DriverEvent::ConnectionClosed,
            ]
        );
    }

    #[tokio::test]
    async fn test_unknown_query_is_query_error() {
        let driver = InMemoryDriver::new();
        let conn = driver
            .connect("mem://", &ConnectionProperties::new())
            .await
            .unwrap();
        let err = conn.describe("SELECT 1").await.unwrap_err();
        match err {
            ExtractError::Query { sql, .. } => assert_eq!(sql.as_deref(), Some("SELECT 1")),
            other => panic!("Expected Query error, got {:?}", other),
        }
        driver.assert_query_count(1);
    }

    #[tokio::test]
    async fn test_connect_failures_are_consumed_in_order() {
        let driver = InMemoryDriver::new().with_connect_failures(vec![
            ExtractError::transient("refused #1"),
            ExtractError::connection("bad password"),
        ]);
        let props = ConnectionProperties::new();

        let first = driver.connect("mem://", &props).await.err().unwrap();
        assert!(first.is_transient());
        let second = driver.connect("mem://", &props).await.err().unwrap();
        assert!(!second.is_transient());
        assert!(driver.connect("mem://", &props).await.is_ok());
        assert_eq!(driver.connect_attempts(), 3);
    }

    #[test]
    fn test_row_getters_widen_and_convert() {
        let row = InMemoryRow::new(vec![
            NativeValue::Int(7),
            NativeValue::Text("{\"a\":1}".to_string()),
            NativeValue::Null,
        ]);
        assert_eq!(row.get_i64(1).unwrap(), Some(7));
        assert_eq!(row.get_f64(1).unwrap(), Some(7.0));
        assert_eq!(row.get_decimal(1).unwrap(), Some(Decimal::from(7)));
        assert_eq!(row.get_json(2).unwrap(), Some(serde_json::json!({"a": 1})));
        assert_eq!(row.get_bool(3).unwrap(), None);
        assert!(row.get_bool(1).is_err());
        assert!(row.get_i64(0).is_err());
        assert!(row.get_i64(4).is_err());
    }
}

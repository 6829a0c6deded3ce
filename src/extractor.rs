//! Host-facing entry point.
//!
//! An extraction runs in two phases. [`Extractor::transaction`] resolves the
//! query, describes it and publishes the output schema; it returns a
//! [`PreparedTask`] that can be serialized and handed to another worker.
//! [`Extractor::run`] executes the prepared task and streams every row into a
//! [`RecordSink`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::ExtractConfig;
use crate::connection::ConnectionManager;
use crate::drivers::{DriverLibraryCache, DriverRegistry};
use crate::error::Result;
use crate::fetch::FetchLoop;
use crate::schema;
use crate::traits::RecordSink;
use crate::types::{OutputSchema, ResultSchema};

/// Output of the transaction phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreparedTask {
    pub config: ExtractConfig,
    pub query: String,
    pub result_schema: ResultSchema,
    pub output_schema: OutputSchema,
}

/// Completion report of one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskReport {}

pub struct Extractor {
    manager: ConnectionManager,
}

impl Extractor {
    pub fn new(manager: ConnectionManager) -> Self {
        Self { manager }
    }

    /// An extractor with the built-in drivers and a fresh library cache.
    pub fn with_defaults() -> Self {
        Self::new(ConnectionManager::new(
            Arc::new(DriverRegistry::with_defaults()),
            Arc::new(DriverLibraryCache::new()),
        ))
    }

    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    /// Validate `config`, describe its query and publish the output schema.
    ///
    /// No connection is attempted when the configuration is invalid. The
    /// connection is closed before `publish` is called.
    pub async fn transaction<F>(&self, config: &ExtractConfig, publish: F) -> Result<PreparedTask>
    where
        F: FnOnce(&OutputSchema),
    {
        config.validate()?;
        let query = config.query_spec().resolve()?;
        let factory = config.getter_factory()?;

        let mut conn = self.manager.connect(&config.connection_spec()).await?;
        info!(query = %query, "describing query");
        let described = conn.introspect(&query).await;
        let result_schema = release(described, conn.close().await, "connection")?;

        let (output_schema, _) = schema::resolve_output_schema(&result_schema, &factory)?;
        info!(
            columns = output_schema.len(),
            "resolved output schema: {:?}",
            output_schema.names()
        );
        publish(&output_schema);

        Ok(PreparedTask {
            config: config.clone(),
            query,
            result_schema,
            output_schema,
        })
    }

    /// Execute `task` and append one record per row to `sink`.
    ///
    /// The sink is finished only when every row was appended. The cursor is
    /// closed before the connection on every path.
    pub async fn run(&self, task: &PreparedTask, sink: &mut dyn RecordSink) -> Result<TaskReport> {
        let factory = task.config.getter_factory()?;
        let (output_schema, getters) =
            schema::resolve_output_schema(&task.result_schema, &factory)?;
        let mut fetch_loop = FetchLoop::new(getters, &output_schema)?;

        let mut conn = self.manager.connect(&task.config.connection_spec()).await?;
        let outcome = match conn.open_cursor(&task.query, task.config.fetch_rows).await {
            Ok(mut cursor) => {
                info!(query = %task.query, fetch_rows = task.config.fetch_rows, "executing query");
                let fetched = fetch_loop.run(&mut cursor, sink).await;
                release(fetched, cursor.close().await, "cursor")
            }
            Err(e) => Err(e),
        };
        let records = release(outcome, conn.close().await, "connection")?;

        sink.finish()?;
        info!(records, "extraction finished");
        Ok(TaskReport {})
    }
}

/// Combine the outcome of a step with the outcome of closing its resource.
/// The step's own error wins over a close error, which is only logged.
fn release<T>(outcome: Result<T>, closed: Result<()>, what: &str) -> Result<T> {
    match (outcome, closed) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(close_err)) => Err(close_err),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(close_err)) => {
            warn!(error = %close_err, "failed to close {} after error", what);
            Err(e)
        }
    }
}

use async_trait::async_trait;

use crate::connection::ConnectionProperties;
use crate::error::Result;
use crate::traits::ResultRow;
use crate::types::NativeColumn;

/// Trait for database driver implementations.
/// Drivers are responsible for:
/// - Opening raw connections from a URL and merged connection properties
/// - Classifying connect failures as transient (`ExtractError::Transient`) or fatal
/// - Describing queries and executing them behind a batched cursor
#[async_trait]
pub trait Driver: Send + Sync {
    /// Identifier used in logs.
    fn name(&self) -> &str;

    /// Open a single raw connection. One attempt, no retry.
    async fn connect(
        &self,
        url: &str,
        properties: &ConnectionProperties,
    ) -> Result<Box<dyn RawConnection>>;
}

/// A connection opened by a driver.
#[async_trait]
pub trait RawConnection: Send + Sync {
    /// Narrow unqualified names to the given schema/namespace.
    async fn set_schema(&mut self, schema: &str) -> Result<()>;

    /// Column metadata of `sql` without fetching any row.
    async fn describe(&self, sql: &str) -> Result<Vec<NativeColumn>>;

    /// Execute `sql` behind a cursor that returns at most `fetch_size` rows per fetch.
    async fn open_cursor(&self, sql: &str, fetch_size: usize) -> Result<Box<dyn RawCursor>>;

    /// Release the connection. Called at most once.
    async fn close(&mut self) -> Result<()>;
}

/// Driver-side cursor over an executed query.
#[async_trait]
pub trait RawCursor: Send {
    /// Next batch of rows. An empty batch means no rows remain.
    async fn fetch(&mut self) -> Result<Vec<Box<dyn ResultRow>>>;

    /// Release driver-side cursor resources. Called at most once.
    async fn close(&mut self) -> Result<()>;
}

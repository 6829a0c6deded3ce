//! sqlextract - Batched extraction of relational query results into typed records
//!
//! # Example
//! ```ignore
//! use sqlextract::{ExtractConfig, Extractor, JsonLinesSink};
//!
//! let config = ExtractConfig::new("postgres", "postgres://reader@localhost/shop")
//!     .with_table("orders")
//!     .with_fetch_rows(5000);
//!
//! let extractor = Extractor::with_defaults();
//! let task = extractor
//!     .transaction(&config, |schema| println!("columns: {:?}", schema.names()))
//!     .await?;
//!
//! let mut sink = JsonLinesSink::new(std::io::stdout(), &task.output_schema);
//! extractor.run(&task, &mut sink).await?;
//! ```

pub mod builders;
pub mod config;
pub mod connection;
pub mod cursor;
pub mod drivers;
pub mod error;
pub mod extractor;
pub mod fetch;
pub mod getters;
pub mod logging;
pub mod query;
pub mod schema;
pub mod sinks;
pub mod traits;
pub mod types;

// Re-export main types for convenient access
pub use config::ExtractConfig;
pub use connection::{Connection, ConnectionManager, ConnectionProperties, ConnectionSpec, RetryPolicy};
pub use cursor::{BatchCursor, CursorState, RowBatch};
pub use error::{ExtractError, Result};
pub use extractor::{Extractor, PreparedTask, TaskReport};
pub use fetch::{FetchLoop, ProgressReporter};
pub use getters::{ColumnGetter, ColumnGetterFactory};
pub use logging::{init_logging, LogConfig};
pub use query::QuerySpec;
pub use sinks::{JsonLinesSink, VecSink};
pub use traits::{Driver, RawConnection, RawCursor, RecordSink, ResultRow};
pub use types::{NativeColumn, NativeType, NativeValue, OutputSchema, OutputType, Record, ResultSchema, Value};

mod in_memory;
mod library;
mod registry;
mod tokio_postgres;

pub use self::in_memory::{
    DriverEvent, InMemoryDriver, InMemoryResultSet, InMemoryResultSetBuilder, InMemoryRow,
    QueryKind, RecordedQuery,
};
pub use self::library::{DriverLibraryCache, LibraryLoader, PathLoader};
pub use self::registry::{DriverFactory, DriverRegistry};
pub use self::tokio_postgres::PostgresDriver;

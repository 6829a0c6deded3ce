use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error type for sqlextract operations
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("driver load failed: {0}")]
    DriverLoad(String),

    /// Recoverable connect failure. The connection manager retries these.
    #[error("transient connection failure: {message}")]
    Transient {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("connection failed: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("connection failed after {attempts} attempts")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<ExtractError>,
    },

    #[error("schema error: {message}")]
    Schema {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("unsupported type: column '{column}' has native type {type_name}")]
    UnsupportedType { column: String, type_name: String },

    #[error("query failed: {message}")]
    Query {
        message: String,
        sql: Option<String>,
        #[source]
        source: Option<BoxError>,
    },

    #[error("type conversion error: {0}")]
    TypeConversion(String),

    #[error("cursor is closed")]
    CursorClosed,

    #[error("sink error: {message}")]
    Sink {
        message: String,
        #[source]
        source: Option<BoxError>,
    },
}

impl ExtractError {
    /// Whether the failure may succeed if retried unchanged.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn driver_load(message: impl Into<String>) -> Self {
        Self::DriverLoad(message.into())
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
            source: None,
        }
    }

    pub fn transient_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Transient {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            source: None,
        }
    }

    pub fn connection_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
            source: None,
        }
    }

    /// Wrap any failure raised while describing a query.
    pub fn schema_with_source(message: impl Into<String>, source: ExtractError) -> Self {
        Self::Schema {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn query(message: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
            sql: None,
            source: None,
        }
    }

    pub fn query_with_sql(
        message: impl Into<String>,
        sql: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Query {
            message: message.into(),
            sql: Some(sql.into()),
            source: Some(Box::new(source)),
        }
    }

    pub fn type_conversion(message: impl Into<String>) -> Self {
        Self::TypeConversion(message.into())
    }

    pub fn sink(message: impl Into<String>) -> Self {
        Self::Sink {
            message: message.into(),
            source: None,
        }
    }

    pub fn sink_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Sink {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Result type alias for sqlextract operations
pub type Result<T> = std::result::Result<T, ExtractError>;

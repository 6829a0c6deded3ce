use std::fmt;

use serde::{Deserialize, Serialize};

/// Column type as reported by the database driver, before any conversion.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NativeType {
    Boolean,
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    Real,
    Double,
    Numeric,
    Char,
    Varchar,
    Text,
    Uuid,
    Date,
    Time,
    Timestamp,
    TimestampTz,
    Json,
    Binary,
    /// A driver type with no dedicated tag, carrying the driver's type name.
    Other(String),
}

impl fmt::Display for NativeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Boolean => "BOOLEAN",
            Self::TinyInt => "TINYINT",
            Self::SmallInt => "SMALLINT",
            Self::Integer => "INTEGER",
            Self::BigInt => "BIGINT",
            Self::Real => "REAL",
            Self::Double => "DOUBLE",
            Self::Numeric => "NUMERIC",
            Self::Char => "CHAR",
            Self::Varchar => "VARCHAR",
            Self::Text => "TEXT",
            Self::Uuid => "UUID",
            Self::Date => "DATE",
            Self::Time => "TIME",
            Self::Timestamp => "TIMESTAMP",
            Self::TimestampTz => "TIMESTAMPTZ",
            Self::Json => "JSON",
            Self::Binary => "BINARY",
            Self::Other(name) => name,
        };
        f.write_str(name)
    }
}

/// One column of a query result, as described by the driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NativeColumn {
    pub name: String,
    pub native_type: NativeType,
    /// Driver-specific type name, e.g. `int4` or `VARCHAR2`.
    pub type_name: String,
    #[serde(default)]
    pub precision: Option<u32>,
    #[serde(default)]
    pub scale: Option<u32>,
}

impl NativeColumn {
    pub fn new(name: impl Into<String>, native_type: NativeType) -> Self {
        let type_name = native_type.to_string();
        Self {
            name: name.into(),
            native_type,
            type_name,
            precision: None,
            scale: None,
        }
    }

    pub fn with_type_name(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = type_name.into();
        self
    }

    pub fn with_precision(mut self, precision: u32, scale: u32) -> Self {
        self.precision = Some(precision);
        self.scale = Some(scale);
        self
    }
}

/// Ordered column metadata of a resolved query.
/// Position is canonical; names may repeat.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResultSchema {
    columns: Vec<NativeColumn>,
}

impl ResultSchema {
    pub fn new(columns: Vec<NativeColumn>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[NativeColumn] {
        &self.columns
    }

    /// Column at a 0-based position.
    pub fn column(&self, index: usize) -> Option<&NativeColumn> {
        self.columns.get(index)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

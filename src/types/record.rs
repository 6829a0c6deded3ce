use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ExtractError, Result};

/// Driver-independent column type used by the record sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputType {
    Boolean,
    Long,
    Double,
    String,
    Timestamp,
    Json,
}

impl fmt::Display for OutputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Boolean => "boolean",
            Self::Long => "long",
            Self::Double => "double",
            Self::String => "string",
            Self::Timestamp => "timestamp",
            Self::Json => "json",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputColumn {
    pub index: usize,
    pub name: String,
    pub output_type: OutputType,
}

/// Ordered output columns, one per result column.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OutputSchema {
    columns: Vec<OutputColumn>,
}

impl OutputSchema {
    pub fn new(columns: Vec<OutputColumn>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[OutputColumn] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

/// A converted cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Long(i64),
    Double(f64),
    String(String),
    Timestamp(DateTime<Utc>),
    Json(serde_json::Value),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The output type this value belongs to; `None` for NULL.
    pub fn output_type(&self) -> Option<OutputType> {
        match self {
            Value::Null => None,
            Value::Boolean(_) => Some(OutputType::Boolean),
            Value::Long(_) => Some(OutputType::Long),
            Value::Double(_) => Some(OutputType::Double),
            Value::String(_) => Some(OutputType::String),
            Value::Timestamp(_) => Some(OutputType::Timestamp),
            Value::Json(_) => Some(OutputType::Json),
        }
    }

    /// JSON rendering used by line-oriented sinks. Timestamps become RFC 3339 strings.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Boolean(b) => serde_json::Value::Bool(*b),
            Value::Long(n) => serde_json::Value::from(*n),
            Value::Double(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Timestamp(ts) => {
                serde_json::Value::String(ts.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
            Value::Json(v) => v.clone(),
        }
    }
}

/// One row's worth of converted values, in output schema order.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    values: Vec<Value>,
}

impl Record {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Accumulates the values of the record currently being converted.
/// Every slot starts as NULL and is reset after `build`.
pub struct RecordBuilder {
    types: Vec<OutputType>,
    values: Vec<Value>,
}

impl RecordBuilder {
    pub fn new(schema: &OutputSchema) -> Self {
        let types: Vec<OutputType> = schema.columns().iter().map(|c| c.output_type).collect();
        let values = vec![Value::Null; types.len()];
        Self { types, values }
    }

    /// Set the value at a 0-based output position.
    /// Fails if the position is out of range or the value does not match the column type.
    pub fn set(&mut self, index: usize, value: Value) -> Result<()> {
        let expected = *self.types.get(index).ok_or_else(|| {
            ExtractError::type_conversion(format!(
                "output position {} is out of range for {} columns",
                index,
                self.types.len()
            ))
        })?;
        if let Some(actual) = value.output_type() {
            if actual != expected {
                return Err(ExtractError::type_conversion(format!(
                    "cannot store a {} value in {} column at position {}",
                    actual, expected, index
                )));
            }
        }
        self.values[index] = value;
        Ok(())
    }

    pub fn set_null(&mut self, index: usize) -> Result<()> {
        self.set(index, Value::Null)
    }

    /// Reset every slot to NULL, dropping a partially converted record.
    pub fn clear(&mut self) {
        self.values.iter_mut().for_each(|v| *v = Value::Null);
    }

    /// Take the finished record and reset every slot to NULL.
    pub fn build(&mut self) -> Record {
        let width = self.types.len();
        Record::new(std::mem::replace(&mut self.values, vec![Value::Null; width]))
    }
}

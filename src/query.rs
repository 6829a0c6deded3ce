use serde::{Deserialize, Serialize};

use crate::builders::SelectQuery;
use crate::error::{ExtractError, Result};

/// Which statement to run: a literal query, or a table with optional clauses.
///
/// Exactly one shape may be populated. The invariant is checked by
/// [`QuerySpec::validate`] and [`QuerySpec::resolve`], not at construction,
/// because the fields usually come straight from user configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuerySpec {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub select: Option<String>,
    #[serde(default, rename = "where")]
    pub where_clause: Option<String>,
    #[serde(default)]
    pub order_by: Option<String>,
}

impl QuerySpec {
    /// A literal query, executed unchanged.
    pub fn raw(query: impl Into<String>) -> Self {
        Self {
            query: Some(query.into()),
            ..Default::default()
        }
    }

    /// `SELECT * FROM <table>`, refined with the `with_*` methods.
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: Some(table.into()),
            ..Default::default()
        }
    }

    pub fn with_select(mut self, select: impl Into<String>) -> Self {
        self.select = Some(select.into());
        self
    }

    pub fn with_where(mut self, condition: impl Into<String>) -> Self {
        self.where_clause = Some(condition.into());
        self
    }

    pub fn with_order_by(mut self, order_by: impl Into<String>) -> Self {
        self.order_by = Some(order_by.into());
        self
    }

    /// Check the mutual exclusivity of the two shapes.
    pub fn validate(&self) -> Result<()> {
        if self.query.is_some() {
            if self.table.is_some()
                || self.select.is_some()
                || self.where_clause.is_some()
                || self.order_by.is_some()
            {
                return Err(ExtractError::config(
                    "'table', 'select', 'where' and 'order_by' must not be set together with 'query'",
                ));
            }
            Ok(())
        } else if self.table.is_some() {
            Ok(())
        } else {
            Err(ExtractError::config(
                "'table' is required when 'query' is not set",
            ))
        }
    }

    /// The single SQL statement to execute.
    pub fn resolve(&self) -> Result<String> {
        self.validate()?;
        if let Some(query) = &self.query {
            return Ok(query.clone());
        }
        let table = self
            .table
            .as_deref()
            .ok_or_else(|| ExtractError::config("'table' is required when 'query' is not set"))?;

        let mut select = SelectQuery::from(table);
        if let Some(columns) = &self.select {
            select = select.columns(columns.as_str());
        }
        if let Some(condition) = &self.where_clause {
            select = select.where_(condition.as_str());
        }
        if let Some(order_by) = &self.order_by {
            select = select.order_by(order_by.as_str());
        }
        Ok(select.build_sql())
    }
}

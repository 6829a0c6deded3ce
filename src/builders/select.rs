/// Builds a `SELECT` statement over a single table.
///
/// Clauses are inserted verbatim; identifiers and expressions must already be
/// valid for the target dialect.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectQuery {
    table: String,
    columns: Option<String>,
    where_clause: Option<String>,
    order_by: Option<String>,
}

impl SelectQuery {
    /// Start a query reading from `table`. Selects `*` unless `columns` is set.
    pub fn from(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: None,
            where_clause: None,
            order_by: None,
        }
    }

    /// Set the column selection list, e.g. `id, name`.
    pub fn columns(mut self, columns: impl Into<String>) -> Self {
        self.columns = Some(columns.into());
        self
    }

    /// Add a WHERE condition.
    pub fn where_(mut self, condition: impl Into<String>) -> Self {
        self.where_clause = Some(condition.into());
        self
    }

    /// Add an ORDER BY list.
    pub fn order_by(mut self, order_by: impl Into<String>) -> Self {
        self.order_by = Some(order_by.into());
        self
    }

    /// Build the SQL query string.
    pub fn build_sql(&self) -> String {
        let mut sql = String::with_capacity(256);

        // SELECT clause
        sql.push_str("SELECT ");
        sql.push_str(self.columns.as_deref().unwrap_or("*"));

        // FROM clause
        sql.push_str(" FROM ");
        sql.push_str(&self.table);

        // WHERE clause
        if let Some(ref where_clause) = self.where_clause {
            sql.push_str(" WHERE ");
            sql.push_str(where_clause);
        }

        // ORDER BY clause
        if let Some(ref order_by) = self.order_by {
            sql.push_str(" ORDER BY ");
            sql.push_str(order_by);
        }

        sql
    }
}

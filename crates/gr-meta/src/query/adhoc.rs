//! Ad-hoc query execution and table introspection helpers.
//!
//! Returns plain Rust types so callers don't need a direct `duckdb` dependency.

use crate::error::{MetaError, MetaResult};
use crate::row_helpers::execute_and_collect;
use duckdb::Connection;

/// Result of executing an ad-hoc SQL query against the store.
pub struct QueryResult {
    /// Column names from the result set.
    pub columns: Vec<String>,
    /// Rows of string-coerced values.
    pub rows: Vec<Vec<String>>,
}

/// Execute an ad-hoc SQL query and return all results as strings.
pub fn execute_query(conn: &Connection, sql: &str) -> MetaResult<QueryResult> {
    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| MetaError::QueryError(format!("prepare failed: {e}")))?;
    let (columns, rows) = execute_and_collect(&mut stmt)?;
    Ok(QueryResult { columns, rows })
}

/// List all tables and views in the `gr_meta` schema.
pub fn list_tables(conn: &Connection) -> MetaResult<Vec<String>> {
    let result = execute_query(
        conn,
        "SELECT table_name FROM information_schema.tables \
         WHERE table_schema = 'gr_meta' \
         ORDER BY table_name",
    )?;
    Ok(result.rows.into_iter().filter_map(|r| r.into_iter().next()).collect())
}

/// Row count for a table in the `gr_meta` schema.
pub fn table_row_count(conn: &Connection, table_name: &str) -> MetaResult<i64> {
    if table_name.is_empty()
        || !table_name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(MetaError::QueryError(format!(
            "invalid table name '{table_name}': must contain only alphanumeric characters and underscores"
        )));
    }
    conn.query_row(
        &format!("SELECT COUNT(*) FROM gr_meta.{table_name}"),
        [],
        |row| row.get(0),
    )
    .map_err(|e| MetaError::QueryError(format!("count failed for {table_name}: {e}")))
}

#[cfg(test)]
#[path = "adhoc_test.rs"]
mod tests;

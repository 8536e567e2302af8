//! Shared helpers for binding and reading DuckDB values.

use crate::error::{MetaError, MetaResult};
use chrono::{DateTime, NaiveDateTime, Utc};
use std::str::FromStr;

const TS_BIND_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";
const TS_READ_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Format a UTC timestamp for a `CAST(? AS TIMESTAMP)` parameter.
pub(crate) fn ts_param(ts: &DateTime<Utc>) -> String {
    ts.format(TS_BIND_FORMAT).to_string()
}

/// Current time, formatted for binding.
pub(crate) fn now_param() -> String {
    ts_param(&Utc::now())
}

/// Parse a timestamp read back via `CAST(col AS VARCHAR)`.
pub(crate) fn parse_ts(table: &'static str, raw: &str) -> MetaResult<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, TS_READ_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| MetaError::CorruptRow {
            table,
            message: format!("bad timestamp '{raw}': {e}"),
        })
}

pub(crate) fn parse_opt_ts(
    table: &'static str,
    raw: Option<&str>,
) -> MetaResult<Option<DateTime<Utc>>> {
    raw.map(|s| parse_ts(table, s)).transpose()
}

/// Parse a stored enum/newtype column through its `FromStr`.
pub(crate) fn parse_col<T>(table: &'static str, raw: &str) -> MetaResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse().map_err(|e: T::Err| MetaError::CorruptRow {
        table,
        message: e.to_string(),
    })
}

/// Parse an optional JSON text column.
pub(crate) fn parse_json(
    table: &'static str,
    raw: Option<&str>,
) -> MetaResult<Option<serde_json::Value>> {
    raw.map(|s| {
        serde_json::from_str(s).map_err(|e| MetaError::CorruptRow {
            table,
            message: format!("bad JSON: {e}"),
        })
    })
    .transpose()
}

/// Narrow a stored BIGINT counter; negative or oversized values are corrupt.
pub(crate) fn parse_count<T: TryFrom<i64>>(
    table: &'static str,
    column: &str,
    raw: i64,
) -> MetaResult<T> {
    T::try_from(raw).map_err(|_| MetaError::CorruptRow {
        table,
        message: format!("{column} {raw} out of range"),
    })
}

/// Serialize an optional JSON value for a VARCHAR column.
pub(crate) fn json_param(value: Option<&serde_json::Value>) -> Option<String> {
    value.map(|v| v.to_string())
}

/// Convert a counter to the BIGINT column type.
pub(crate) fn count_param(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

/// Read a column value as a String, trying multiple DuckDB types.
///
/// DuckDB integer columns return `None` for `Option<String>`, so we try
/// String -> i64 -> f64 -> bool -> "null".
pub(crate) fn get_column_as_string(row: &duckdb::Row<'_>, idx: usize) -> String {
    if let Ok(Some(s)) = row.get::<_, Option<String>>(idx) {
        return s;
    }
    if let Ok(Some(n)) = row.get::<_, Option<i64>>(idx) {
        return n.to_string();
    }
    if let Ok(Some(f)) = row.get::<_, Option<f64>>(idx) {
        return f.to_string();
    }
    if let Ok(Some(b)) = row.get::<_, Option<bool>>(idx) {
        return b.to_string();
    }
    "null".to_string()
}

/// Execute a prepared statement and collect all results as strings.
///
/// DuckDB panics on `stmt.column_count()` before execution, so all rows are
/// collected via `query_map` first, then column metadata is read.
///
/// Returns `(column_names, rows)`.
pub(crate) fn execute_and_collect(
    stmt: &mut duckdb::Statement,
) -> MetaResult<(Vec<String>, Vec<Vec<String>>)> {
    let raw_rows: Vec<Vec<String>> = stmt
        .query_map([], |row| {
            let col_count = row.as_ref().column_count();
            Ok((0..col_count)
                .map(|i| get_column_as_string(row, i))
                .collect())
        })
        .map_err(|e| MetaError::QueryError(format!("query failed: {e}")))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| MetaError::QueryError(format!("row error: {e}")))?;

    let column_count = stmt.column_count();
    let column_names: Vec<String> = (0..column_count)
        .map(|i| {
            stmt.column_name(i)
                .map_or("?".to_string(), |v| v.to_string())
        })
        .collect();

    Ok((column_names, raw_rows))
}

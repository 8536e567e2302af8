//! Raw tier: source-faithful payloads keyed by `(source, record_key, checksum)`.

use crate::connection::MetaDb;
use crate::error::{MetaError, MetaResult, MetaResultExt};
use crate::row_helpers::{now_param, parse_col, parse_ts};
use crate::runs::require_open;
use chrono::{DateTime, Utc};
use duckdb::{Connection, OptionalExt};
use gr_core::{json_checksum, SourceCode, UpsertAction};
use serde::Serialize;

const TABLE: &str = "raw_records";

/// A stored raw payload
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawRecord {
    pub raw_id: i64,
    pub source: SourceCode,
    pub record_key: String,
    pub checksum: String,
    pub payload: serde_json::Value,
    /// Latest run that delivered this payload
    pub run_id: i64,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

/// Outcome of [`record_raw`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RawOutcome {
    pub raw_id: i64,
    pub action: UpsertAction,
}

/// Store one raw payload for `run_id`.
///
/// Replaying an identical payload returns the existing `raw_id` and moves the
/// row's attribution to `run_id`. A changed payload under the same record key
/// is a new row.
pub fn record_raw(
    db: &MetaDb,
    run_id: i64,
    record_key: &str,
    payload: &serde_json::Value,
) -> MetaResult<RawOutcome> {
    if record_key.trim().is_empty() {
        return Err(MetaError::InvalidInput(
            "raw record key must not be empty".to_string(),
        ));
    }
    let checksum = json_checksum(payload);
    let body = payload.to_string();

    db.with_conflict_retry("record_raw", |db| {
        let inserted = db.transaction(|conn| {
            let source = require_open(conn, run_id)?;
            let now = now_param();
            conn.execute(
                "INSERT INTO gr_meta.raw_records
                     (source_code, record_key, checksum, payload, run_id, first_seen_at, last_seen_at)
                 VALUES (?, ?, ?, ?, ?, CAST(? AS TIMESTAMP), CAST(? AS TIMESTAMP))",
                duckdb::params![source.as_str(), record_key, checksum, body, run_id, now, now],
            )
            .db_context("insert raw_records")?;
            lookup_raw_id(conn, &source, record_key, &checksum)
        });

        match inserted {
            Ok(Some(raw_id)) => {
                return Ok(Some(RawOutcome {
                    raw_id,
                    action: UpsertAction::Inserted,
                }))
            }
            Ok(None) => return Ok(None),
            Err(e) if e.is_duplicate_key() => {}
            Err(e) => return Err(e),
        }

        let touched = db.transaction(|conn| {
            let source = require_open(conn, run_id)?;
            conn.execute(
                "UPDATE gr_meta.raw_records
                 SET run_id = ?, last_seen_at = CAST(? AS TIMESTAMP)
                 WHERE source_code = ? AND record_key = ? AND checksum = ?",
                duckdb::params![run_id, now_param(), source.as_str(), record_key, checksum],
            )
            .db_context("update raw_records")?;
            lookup_raw_id(conn, &source, record_key, &checksum)
        })?;
        Ok(touched.map(|raw_id| {
            log::debug!("Raw record {record_key} unchanged; reattributed to run {run_id}");
            RawOutcome {
                raw_id,
                action: UpsertAction::Unchanged,
            }
        }))
    })
}

fn lookup_raw_id(
    conn: &Connection,
    source: &SourceCode,
    record_key: &str,
    checksum: &str,
) -> MetaResult<Option<i64>> {
    conn.query_row(
        "SELECT raw_id FROM gr_meta.raw_records
         WHERE source_code = ? AND record_key = ? AND checksum = ?",
        duckdb::params![source.as_str(), record_key, checksum],
        |row| row.get(0),
    )
    .optional()
    .db_context("select raw_id")
}

/// Raw record by id.
pub fn get_raw(conn: &Connection, raw_id: i64) -> MetaResult<Option<RawRecord>> {
    let row = conn
        .query_row(
            "SELECT raw_id, source_code, record_key, checksum, payload, run_id,
                    CAST(first_seen_at AS VARCHAR), CAST(last_seen_at AS VARCHAR)
             FROM gr_meta.raw_records WHERE raw_id = ?",
            duckdb::params![raw_id],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, i64>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, String>(7)?,
                ))
            },
        )
        .optional()
        .db_context("get_raw")?;

    let Some((raw_id, source, record_key, checksum, payload, run_id, first, last)) = row else {
        return Ok(None);
    };
    let payload = serde_json::from_str(&payload).map_err(|e| MetaError::CorruptRow {
        table: TABLE,
        message: format!("bad payload for raw_id {raw_id}: {e}"),
    })?;
    Ok(Some(RawRecord {
        raw_id,
        source: parse_col(TABLE, &source)?,
        record_key,
        checksum,
        payload,
        run_id,
        first_seen_at: parse_ts(TABLE, &first)?,
        last_seen_at: parse_ts(TABLE, &last)?,
    }))
}

#[cfg(test)]
#[path = "raw_test.rs"]
mod tests;

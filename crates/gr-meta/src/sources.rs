//! Source catalogue: the external sources collectors may ingest from.

use crate::connection::MetaDb;
use crate::error::{MetaError, MetaResult, MetaResultExt};
use crate::row_helpers::{now_param, parse_col, parse_ts};
use chrono::{DateTime, Utc};
use duckdb::{Connection, OptionalExt};
use gr_core::SourceCode;
use serde::Serialize;

const TABLE: &str = "sources";

/// A registered external source
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Source {
    pub code: SourceCode,
    pub name: String,
    pub description: Option<String>,
    pub registered_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Register `code`, or refresh its descriptive fields if already known.
pub fn register_source(
    db: &MetaDb,
    code: &SourceCode,
    name: &str,
    description: Option<&str>,
) -> MetaResult<()> {
    if name.trim().is_empty() {
        return Err(MetaError::InvalidInput(format!(
            "source '{code}' needs a display name"
        )));
    }

    db.with_conflict_retry("register_source", |db| {
        let now = now_param();
        let inserted = db.conn().execute(
            "INSERT INTO gr_meta.sources (source_code, name, description, registered_at, updated_at)
             VALUES (?, ?, ?, CAST(? AS TIMESTAMP), CAST(? AS TIMESTAMP))",
            duckdb::params![code.as_str(), name, description, now, now],
        )
        .db_context("insert sources");
        match inserted {
            Ok(_) => {
                log::info!("Registered source '{code}'");
                Ok(Some(()))
            }
            Err(e) if e.is_duplicate_key() => {
                let updated = db
                    .conn()
                    .execute(
                        "UPDATE gr_meta.sources
                         SET name = ?, description = ?, updated_at = CAST(? AS TIMESTAMP)
                         WHERE source_code = ?",
                        duckdb::params![name, description, now, code.as_str()],
                    )
                    .db_context("update sources")?;
                log::debug!("Source '{code}' already registered; refreshed description");
                Ok((updated > 0).then_some(()))
            }
            Err(e) => Err(e),
        }
    })
}

/// Whether `code` is registered.
pub fn source_exists(conn: &Connection, code: &SourceCode) -> MetaResult<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM gr_meta.sources WHERE source_code = ?",
            duckdb::params![code.as_str()],
            |row| row.get(0),
        )
        .optional()
        .db_context("select sources")?;
    Ok(found.is_some())
}

/// Fail with [`MetaError::UnknownSource`] unless `code` is registered.
pub fn require_source(conn: &Connection, code: &SourceCode) -> MetaResult<()> {
    if source_exists(conn, code)? {
        Ok(())
    } else {
        log::warn!("Rejected reference to unregistered source '{code}'");
        Err(MetaError::UnknownSource {
            code: code.to_string(),
        })
    }
}

/// All registered sources, ordered by code.
pub fn list_sources(conn: &Connection) -> MetaResult<Vec<Source>> {
    let mut stmt = conn
        .prepare(
            "SELECT source_code, name, description,
                    CAST(registered_at AS VARCHAR), CAST(updated_at AS VARCHAR)
             FROM gr_meta.sources
             ORDER BY source_code",
        )
        .db_context("prepare list_sources")?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })
        .db_context("list_sources")?
        .collect::<Result<Vec<_>, _>>()
        .db_context("read sources")?;

    rows.into_iter()
        .map(|(code, name, description, registered_at, updated_at)| {
            Ok(Source {
                code: parse_col(TABLE, &code)?,
                name,
                description,
                registered_at: parse_ts(TABLE, &registered_at)?,
                updated_at: parse_ts(TABLE, &updated_at)?,
            })
        })
        .collect()
}

#[cfg(test)]
#[path = "sources_test.rs"]
mod tests;

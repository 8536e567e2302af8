//! Entity registry: one row per logical series, keyed by `(source, local_key)`.
//!
//! [`resolve_or_create`] is the only way entities come into existence. It is
//! an insert-if-absent backed by the primary key on `(source_code, local_key)`:
//! a caller that loses the first-use race sees a duplicate-key error, re-reads
//! and returns the winner's id.

use crate::connection::MetaDb;
use crate::error::{MetaError, MetaResult, MetaResultExt};
use crate::row_helpers::{json_param, now_param, parse_col, parse_json, parse_ts};
use crate::sources::require_source;
use chrono::{DateTime, Utc};
use duckdb::{Connection, OptionalExt};
use gr_core::{LocalKey, SourceCode};
use serde::Serialize;

const TABLE: &str = "entities";

/// Descriptive fields of a series. All optional; provided fields overwrite.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SeriesAttributes {
    pub name: Option<String>,
    pub commodity: Option<String>,
    pub unit: Option<String>,
    pub frequency: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

impl SeriesAttributes {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn with_commodity(mut self, commodity: impl Into<String>) -> Self {
        self.commodity = Some(commodity.into());
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_frequency(mut self, frequency: impl Into<String>) -> Self {
        self.frequency = Some(frequency.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.commodity.is_none()
            && self.unit.is_none()
            && self.frequency.is_none()
            && self.metadata.is_none()
    }
}

/// A registered series
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entity {
    pub entity_id: i64,
    pub source: SourceCode,
    pub local_key: LocalKey,
    #[serde(flatten)]
    pub attributes: SeriesAttributes,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Resolve `(source, local_key)` to its entity id, creating the entity on
/// first use.
///
/// Concurrent first-use callers all get the same id and exactly one row is
/// created. On an existing entity, non-empty `attrs` refresh its descriptive
/// fields; identity fields never change.
pub fn resolve_or_create(
    db: &MetaDb,
    source: &SourceCode,
    local_key: &LocalKey,
    attrs: &SeriesAttributes,
) -> MetaResult<i64> {
    require_source(db.conn(), source)?;

    db.with_conflict_retry("resolve_or_create", |db| {
        if let Some(entity_id) = lookup_entity_id(db.conn(), source, local_key)? {
            if !attrs.is_empty() {
                refresh_attributes(db.conn(), entity_id, attrs)?;
            }
            return Ok(Some(entity_id));
        }

        match insert_entity(db.conn(), source, local_key, attrs) {
            Ok(entity_id) => {
                log::debug!("Registered entity {entity_id} for {source}/{local_key}");
                Ok(Some(entity_id))
            }
            Err(e) if e.is_duplicate_key() => {
                log::debug!("Lost first-use race for {source}/{local_key}; re-reading");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    })
}

fn insert_entity(
    conn: &Connection,
    source: &SourceCode,
    local_key: &LocalKey,
    attrs: &SeriesAttributes,
) -> MetaResult<i64> {
    let now = now_param();
    conn.execute(
        "INSERT INTO gr_meta.entities
             (source_code, local_key, name, commodity, unit, frequency, metadata, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, CAST(? AS TIMESTAMP), CAST(? AS TIMESTAMP))",
        duckdb::params![
            source.as_str(),
            local_key.as_str(),
            attrs.name,
            attrs.commodity,
            attrs.unit,
            attrs.frequency,
            json_param(attrs.metadata.as_ref()),
            now,
            now,
        ],
    )
    .db_context("insert entities")?;

    lookup_entity_id(conn, source, local_key)?.ok_or_else(|| {
        MetaError::QueryError(format!("entity {source}/{local_key} missing after insert"))
    })
}

/// Last-writer-wins on the provided descriptive fields only.
fn refresh_attributes(conn: &Connection, entity_id: i64, attrs: &SeriesAttributes) -> MetaResult<()> {
    conn.execute(
        "UPDATE gr_meta.entities
         SET name       = COALESCE(?, name),
             commodity  = COALESCE(?, commodity),
             unit       = COALESCE(?, unit),
             frequency  = COALESCE(?, frequency),
             metadata   = COALESCE(?, metadata),
             updated_at = CAST(? AS TIMESTAMP)
         WHERE entity_id = ?",
        duckdb::params![
            attrs.name,
            attrs.commodity,
            attrs.unit,
            attrs.frequency,
            json_param(attrs.metadata.as_ref()),
            now_param(),
            entity_id,
        ],
    )
    .db_context("update entities")?;
    Ok(())
}

fn lookup_entity_id(
    conn: &Connection,
    source: &SourceCode,
    local_key: &LocalKey,
) -> MetaResult<Option<i64>> {
    conn.query_row(
        "SELECT entity_id FROM gr_meta.entities WHERE source_code = ? AND local_key = ?",
        duckdb::params![source.as_str(), local_key.as_str()],
        |row| row.get(0),
    )
    .optional()
    .db_context("select entity_id")
}

/// Fail with [`MetaError::EntityNotFound`] unless `entity_id` exists.
pub fn require_entity(conn: &Connection, entity_id: i64) -> MetaResult<()> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT entity_id FROM gr_meta.entities WHERE entity_id = ?",
            duckdb::params![entity_id],
            |row| row.get(0),
        )
        .optional()
        .db_context("select entities")?;
    found
        .map(|_| ())
        .ok_or(MetaError::EntityNotFound { entity_id })
}

const ENTITY_COLUMNS: &str = "entity_id, source_code, local_key, name, commodity, unit, frequency, \
     metadata, CAST(created_at AS VARCHAR), CAST(updated_at AS VARCHAR)";

type EntityRow = (
    i64,
    String,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    String,
    String,
);

fn read_entity_row(row: &duckdb::Row<'_>) -> duckdb::Result<EntityRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
    ))
}

fn into_entity(row: EntityRow) -> MetaResult<Entity> {
    let (entity_id, source, local_key, name, commodity, unit, frequency, metadata, created, updated) =
        row;
    Ok(Entity {
        entity_id,
        source: parse_col(TABLE, &source)?,
        local_key: parse_col(TABLE, &local_key)?,
        attributes: SeriesAttributes {
            name,
            commodity,
            unit,
            frequency,
            metadata: parse_json(TABLE, metadata.as_deref())?,
        },
        created_at: parse_ts(TABLE, &created)?,
        updated_at: parse_ts(TABLE, &updated)?,
    })
}

/// Entity by surrogate id.
pub fn get_entity(conn: &Connection, entity_id: i64) -> MetaResult<Option<Entity>> {
    let sql = format!("SELECT {ENTITY_COLUMNS} FROM gr_meta.entities WHERE entity_id = ?");
    conn.query_row(&sql, duckdb::params![entity_id], read_entity_row)
        .optional()
        .db_context("get_entity")?
        .map(into_entity)
        .transpose()
}

/// Entity by natural key, without creating it.
pub fn find_entity(
    conn: &Connection,
    source: &SourceCode,
    local_key: &LocalKey,
) -> MetaResult<Option<Entity>> {
    let sql = format!(
        "SELECT {ENTITY_COLUMNS} FROM gr_meta.entities WHERE source_code = ? AND local_key = ?"
    );
    conn.query_row(
        &sql,
        duckdb::params![source.as_str(), local_key.as_str()],
        read_entity_row,
    )
    .optional()
    .db_context("find_entity")?
    .map(into_entity)
    .transpose()
}

/// All entities of a source, ordered by local key.
pub fn list_entities(conn: &Connection, source: &SourceCode) -> MetaResult<Vec<Entity>> {
    let sql = format!(
        "SELECT {ENTITY_COLUMNS} FROM gr_meta.entities WHERE source_code = ? ORDER BY local_key"
    );
    let mut stmt = conn.prepare(&sql).db_context("prepare list_entities")?;
    let rows = stmt
        .query_map(duckdb::params![source.as_str()], read_entity_row)
        .db_context("list_entities")?
        .collect::<Result<Vec<_>, _>>()
        .db_context("read entities")?;
    rows.into_iter().map(into_entity).collect()
}

#[cfg(test)]
#[path = "registry_test.rs"]
mod tests;

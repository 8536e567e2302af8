//! Fact upsert/revision engine.
//!
//! Observations are keyed by `(entity_id, observed_at, revision)`. The write
//! path is an explicit two-step upsert:
//!
//! 1. In one transaction, check the run is open and INSERT the row.
//! 2. If the natural key is taken, in a new transaction check the run again
//!    and UPDATE only the mutable fields (`value`, `quality_flag`,
//!    `validation_flag`, `run_id`, `raw_id`, `updated_at`) of that row.
//!
//! Both steps run inside [`MetaDb::with_conflict_retry`], so concurrent
//! writers of one key serialize on it and the last commit wins. Duplicate-key
//! and write-write conflicts never reach the caller.

use crate::connection::MetaDb;
use crate::error::{MetaError, MetaResult, MetaResultExt};
use crate::registry::require_entity;
use crate::row_helpers::{now_param, parse_col, parse_ts, ts_param};
use crate::runs::{annotate, require_open};
use chrono::{DateTime, Utc};
use duckdb::{Connection, OptionalExt};
use gr_core::{QualityFlag, RunCounters, UpsertAction, ValidationFlag};
use serde::Serialize;

const TABLE: &str = "observations";

/// One observation as written by a collector
#[derive(Debug, Clone, PartialEq)]
pub struct FactWrite {
    pub entity_id: i64,
    pub observed_at: DateTime<Utc>,
    /// Ignored by [`record_revision`], which assigns the next revision itself
    pub revision: u32,
    pub value: Option<f64>,
    pub quality_flag: QualityFlag,
    pub validation_flag: ValidationFlag,
    pub run_id: i64,
    pub raw_id: Option<i64>,
}

impl FactWrite {
    /// A revision-0 `OK` observation.
    pub fn new(entity_id: i64, observed_at: DateTime<Utc>, value: f64, run_id: i64) -> Self {
        Self {
            entity_id,
            observed_at,
            revision: 0,
            value: Some(value),
            quality_flag: QualityFlag::Ok,
            validation_flag: ValidationFlag::Unchecked,
            run_id,
            raw_id: None,
        }
    }

    pub fn with_revision(mut self, revision: u32) -> Self {
        self.revision = revision;
        self
    }

    pub fn with_quality(mut self, quality_flag: QualityFlag) -> Self {
        self.quality_flag = quality_flag;
        self
    }

    pub fn with_validation(mut self, validation_flag: ValidationFlag) -> Self {
        self.validation_flag = validation_flag;
        self
    }

    pub fn with_raw(mut self, raw_id: i64) -> Self {
        self.raw_id = Some(raw_id);
        self
    }

    /// Label used in logs and run annotations.
    pub fn record_key(&self) -> String {
        format!(
            "entity={} observed_at={} revision={}",
            self.entity_id,
            self.observed_at.to_rfc3339(),
            self.revision
        )
    }

    fn check(&self) -> MetaResult<()> {
        match self.value {
            Some(v) if !v.is_finite() => Err(MetaError::InvalidInput(format!(
                "{}: value must be finite, got {v}",
                self.record_key()
            ))),
            None if self.quality_flag != QualityFlag::Missing => {
                Err(MetaError::InvalidInput(format!(
                    "{}: a missing value requires quality flag MISSING",
                    self.record_key()
                )))
            }
            _ => Ok(()),
        }
    }
}

/// A stored observation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Observation {
    pub fact_id: i64,
    pub entity_id: i64,
    pub observed_at: DateTime<Utc>,
    pub revision: u32,
    pub value: Option<f64>,
    pub quality_flag: QualityFlag,
    pub validation_flag: ValidationFlag,
    pub run_id: i64,
    pub raw_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// What a write did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UpsertOutcome {
    pub fact_id: i64,
    pub revision: u32,
    pub action: UpsertAction,
}

/// A record that could not be written during a batch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordFailure {
    pub record_key: String,
    pub message: String,
}

/// Result of [`upsert_batch`]
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchReport {
    pub counters: RunCounters,
    pub failures: Vec<RecordFailure>,
}

/// Idempotent write of one observation under its natural key.
///
/// Inserts when `(entity_id, observed_at, revision)` is new, otherwise
/// overwrites the mutable fields of that row and keeps its `fact_id`. Other
/// revisions of the same entity/time are never touched.
pub fn upsert(db: &MetaDb, write: &FactWrite) -> MetaResult<UpsertOutcome> {
    write.check()?;

    db.with_conflict_retry("upsert_observation", |db| {
        let inserted = db.transaction(|conn| {
            require_open(conn, write.run_id)?;
            require_entity(conn, write.entity_id)?;
            insert_observation(conn, write, write.revision)
        });
        match inserted {
            Ok(fact_id) => {
                return Ok(Some(UpsertOutcome {
                    fact_id,
                    revision: write.revision,
                    action: UpsertAction::Inserted,
                }))
            }
            Err(e) if e.is_duplicate_key() => {
                log::debug!("{}: natural key exists; updating", write.record_key());
            }
            Err(e) => return Err(e),
        }

        let updated = db.transaction(|conn| {
            require_open(conn, write.run_id)?;
            update_observation(conn, write)
        })?;
        Ok(updated.map(|fact_id| UpsertOutcome {
            fact_id,
            revision: write.revision,
            action: UpsertAction::Updated,
        }))
    })
}

/// Record a value for sources that republish without revision numbers.
///
/// If the current revision already holds this value and quality flag, nothing
/// is written. Otherwise the value is inserted as `current + 1` (revision 0
/// when the key is new). A writer that loses the race for the next revision
/// re-reads and tries again.
pub fn record_revision(db: &MetaDb, write: &FactWrite) -> MetaResult<UpsertOutcome> {
    write.check()?;

    db.with_conflict_retry("record_revision", |db| {
        require_open(db.conn(), write.run_id)?;
        let current = current(db.conn(), write.entity_id, &write.observed_at)?;
        if let Some(cur) = &current {
            if cur.value == write.value && cur.quality_flag == write.quality_flag {
                return Ok(Some(UpsertOutcome {
                    fact_id: cur.fact_id,
                    revision: cur.revision,
                    action: UpsertAction::Unchanged,
                }));
            }
        }
        let next = current.map_or(0, |cur| cur.revision + 1);

        let inserted = db.transaction(|conn| {
            require_open(conn, write.run_id)?;
            require_entity(conn, write.entity_id)?;
            insert_observation(conn, write, next)
        });
        match inserted {
            Ok(fact_id) => {
                if next > 0 {
                    log::info!(
                        "Entity {} at {} revised to revision {next}",
                        write.entity_id,
                        write.observed_at
                    );
                }
                Ok(Some(UpsertOutcome {
                    fact_id,
                    revision: next,
                    action: UpsertAction::Inserted,
                }))
            }
            Err(e) if e.is_duplicate_key() => Ok(None),
            Err(e) => Err(e),
        }
    })
}

/// Apply `writes` for `run_id`, keeping per-record failures local.
///
/// Every write is attributed to `run_id`. A record that fails is annotated on
/// the run and counted; the batch continues. Errors about the run itself
/// (missing, terminal) abort the batch.
pub fn upsert_batch(db: &MetaDb, run_id: i64, writes: &[FactWrite]) -> MetaResult<BatchReport> {
    require_open(db.conn(), run_id)?;

    let mut report = BatchReport::default();
    for write in writes {
        report.counters.fetched += 1;
        let write = FactWrite {
            run_id,
            ..write.clone()
        };
        match upsert(db, &write) {
            Ok(outcome) => match outcome.action {
                UpsertAction::Inserted => report.counters.inserted += 1,
                UpsertAction::Updated | UpsertAction::Unchanged => report.counters.updated += 1,
            },
            Err(e @ (MetaError::RunNotFound { .. } | MetaError::TerminalRunViolation { .. })) => {
                return Err(e);
            }
            Err(e) => {
                let record_key = write.record_key();
                let message = e.to_string();
                log::warn!("Run {run_id}: {record_key} failed: {message}");
                annotate(db.conn(), run_id, Some(&record_key), &message, None)?;
                report.counters.failed += 1;
                report.failures.push(RecordFailure {
                    record_key,
                    message,
                });
            }
        }
    }

    log::debug!(
        "Run {run_id}: batch of {} applied ({} inserted, {} updated, {} failed)",
        writes.len(),
        report.counters.inserted,
        report.counters.updated,
        report.counters.failed
    );
    Ok(report)
}

fn insert_observation(conn: &Connection, write: &FactWrite, revision: u32) -> MetaResult<i64> {
    let now = now_param();
    let observed_at = ts_param(&write.observed_at);
    conn.execute(
        "INSERT INTO gr_meta.observations
             (entity_id, observed_at, revision, value, quality_flag, validation_flag,
              run_id, raw_id, created_at, updated_at)
         VALUES (?, CAST(? AS TIMESTAMP), ?, ?, ?, ?, ?, ?, CAST(? AS TIMESTAMP), CAST(? AS TIMESTAMP))",
        duckdb::params![
            write.entity_id,
            observed_at,
            revision,
            write.value,
            write.quality_flag.as_str(),
            write.validation_flag.as_str(),
            write.run_id,
            write.raw_id,
            now,
            now,
        ],
    )
    .db_context("insert observations")?;

    lookup_fact_id(conn, write.entity_id, &observed_at, revision)?.ok_or_else(|| {
        MetaError::QueryError(format!("{} missing after insert", write.record_key()))
    })
}

/// Step two of the upsert. `None` when the row is not visible in this
/// snapshot yet (its writer has not committed).
fn update_observation(conn: &Connection, write: &FactWrite) -> MetaResult<Option<i64>> {
    let observed_at = ts_param(&write.observed_at);
    let changed = conn
        .execute(
            "UPDATE gr_meta.observations
             SET value = ?, quality_flag = ?, validation_flag = ?, run_id = ?, raw_id = ?,
                 updated_at = CAST(? AS TIMESTAMP)
             WHERE entity_id = ? AND observed_at = CAST(? AS TIMESTAMP) AND revision = ?",
            duckdb::params![
                write.value,
                write.quality_flag.as_str(),
                write.validation_flag.as_str(),
                write.run_id,
                write.raw_id,
                now_param(),
                write.entity_id,
                observed_at,
                write.revision,
            ],
        )
        .db_context("update observations")?;
    if changed == 0 {
        return Ok(None);
    }
    lookup_fact_id(conn, write.entity_id, &observed_at, write.revision)
}

fn lookup_fact_id(
    conn: &Connection,
    entity_id: i64,
    observed_at: &str,
    revision: u32,
) -> MetaResult<Option<i64>> {
    conn.query_row(
        "SELECT fact_id FROM gr_meta.observations
         WHERE entity_id = ? AND observed_at = CAST(? AS TIMESTAMP) AND revision = ?",
        duckdb::params![entity_id, observed_at, revision],
        |row| row.get(0),
    )
    .optional()
    .db_context("select fact_id")
}

pub(crate) const OBSERVATION_COLUMNS: &str = "fact_id, entity_id, CAST(observed_at AS VARCHAR), \
     CAST(revision AS BIGINT), value, quality_flag, validation_flag, run_id, raw_id, \
     CAST(created_at AS VARCHAR), CAST(updated_at AS VARCHAR)";

pub(crate) struct ObservationRow {
    fact_id: i64,
    entity_id: i64,
    observed_at: String,
    revision: i64,
    value: Option<f64>,
    quality_flag: String,
    validation_flag: String,
    run_id: i64,
    raw_id: Option<i64>,
    created_at: String,
    updated_at: String,
}

pub(crate) fn read_observation_row(row: &duckdb::Row<'_>) -> duckdb::Result<ObservationRow> {
    Ok(ObservationRow {
        fact_id: row.get(0)?,
        entity_id: row.get(1)?,
        observed_at: row.get(2)?,
        revision: row.get(3)?,
        value: row.get(4)?,
        quality_flag: row.get(5)?,
        validation_flag: row.get(6)?,
        run_id: row.get(7)?,
        raw_id: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

pub(crate) fn into_observation(row: ObservationRow) -> MetaResult<Observation> {
    Ok(Observation {
        fact_id: row.fact_id,
        entity_id: row.entity_id,
        observed_at: parse_ts(TABLE, &row.observed_at)?,
        revision: u32::try_from(row.revision).map_err(|_| MetaError::CorruptRow {
            table: TABLE,
            message: format!("revision {} out of range", row.revision),
        })?,
        value: row.value,
        quality_flag: parse_col(TABLE, &row.quality_flag)?,
        validation_flag: parse_col(TABLE, &row.validation_flag)?,
        run_id: row.run_id,
        raw_id: row.raw_id,
        created_at: parse_ts(TABLE, &row.created_at)?,
        updated_at: parse_ts(TABLE, &row.updated_at)?,
    })
}

/// Run an observation query and decode every row.
pub(crate) fn query_observations(
    conn: &Connection,
    sql: &str,
    params: &[&dyn duckdb::ToSql],
    what: &str,
) -> MetaResult<Vec<Observation>> {
    let mut stmt = conn.prepare(sql).db_context(what)?;
    let rows = stmt
        .query_map(params, read_observation_row)
        .db_context(what)?
        .collect::<Result<Vec<_>, _>>()
        .db_context(what)?;
    rows.into_iter().map(into_observation).collect()
}

/// The current (highest) revision for an entity/time.
pub fn current(
    conn: &Connection,
    entity_id: i64,
    observed_at: &DateTime<Utc>,
) -> MetaResult<Option<Observation>> {
    let sql = format!(
        "SELECT {OBSERVATION_COLUMNS} FROM gr_meta.observations
         WHERE entity_id = ? AND observed_at = CAST(? AS TIMESTAMP)
         ORDER BY revision DESC
         LIMIT 1"
    );
    let observed_at = ts_param(observed_at);
    Ok(
        query_observations(conn, &sql, duckdb::params![entity_id, observed_at], "current")?
            .into_iter()
            .next(),
    )
}

/// A specific revision for an entity/time.
pub fn at_revision(
    conn: &Connection,
    entity_id: i64,
    observed_at: &DateTime<Utc>,
    revision: u32,
) -> MetaResult<Option<Observation>> {
    let sql = format!(
        "SELECT {OBSERVATION_COLUMNS} FROM gr_meta.observations
         WHERE entity_id = ? AND observed_at = CAST(? AS TIMESTAMP) AND revision = ?"
    );
    let observed_at = ts_param(observed_at);
    Ok(query_observations(
        conn,
        &sql,
        duckdb::params![entity_id, observed_at, revision],
        "at_revision",
    )?
    .into_iter()
    .next())
}

/// The value as first published (revision 0).
pub fn original(
    conn: &Connection,
    entity_id: i64,
    observed_at: &DateTime<Utc>,
) -> MetaResult<Option<Observation>> {
    at_revision(conn, entity_id, observed_at, 0)
}

/// Every revision for an entity/time, oldest first.
pub fn revisions(
    conn: &Connection,
    entity_id: i64,
    observed_at: &DateTime<Utc>,
) -> MetaResult<Vec<Observation>> {
    let sql = format!(
        "SELECT {OBSERVATION_COLUMNS} FROM gr_meta.observations
         WHERE entity_id = ? AND observed_at = CAST(? AS TIMESTAMP)
         ORDER BY revision"
    );
    let observed_at = ts_param(observed_at);
    query_observations(conn, &sql, duckdb::params![entity_id, observed_at], "revisions")
}

/// The current revision at every time of a series, ordered by time.
pub fn series_current(conn: &Connection, entity_id: i64) -> MetaResult<Vec<Observation>> {
    let sql = format!(
        "SELECT {OBSERVATION_COLUMNS} FROM gr_meta.current_observations
         WHERE entity_id = ?
         ORDER BY observed_at"
    );
    query_observations(conn, &sql, duckdb::params![entity_id], "series_current")
}

#[cfg(test)]
#[path = "facts_test.rs"]
mod tests;

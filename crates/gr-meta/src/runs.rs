//! Ingest run tracker.
//!
//! A run is opened `RUNNING` and closed exactly once into a terminal status.
//! Closing (or cancelling) a run that is already terminal is a logged no-op
//! that reports the existing status. Every downstream write checks the run
//! with [`require_open`] inside its own transaction.

use crate::connection::MetaDb;
use crate::error::{MetaError, MetaResult, MetaResultExt};
use crate::row_helpers::{
    count_param, json_param, now_param, parse_col, parse_count, parse_json, parse_opt_ts,
    parse_ts,
};
use crate::sources::require_source;
use chrono::{DateTime, Utc};
use duckdb::{Connection, OptionalExt};
use gr_core::{AgentId, JobKind, RunCounters, RunStatus, SourceCode};
use serde::Serialize;
use uuid::Uuid;

const TABLE: &str = "ingest_runs";

/// A persisted ingest run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestRun {
    pub run_id: i64,
    /// Natural key (UUID v4)
    pub run_key: String,
    pub source: SourceCode,
    pub job_kind: JobKind,
    pub agent_id: AgentId,
    pub params: Option<serde_json::Value>,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub counters: RunCounters,
    pub error: Option<serde_json::Value>,
    pub content_checksum: Option<String>,
}

/// What a collector reports when it closes a run
#[derive(Debug, Clone, PartialEq)]
pub struct RunCompletion {
    pub status: RunStatus,
    pub counters: RunCounters,
    pub error: Option<serde_json::Value>,
    pub content_checksum: Option<String>,
}

impl RunCompletion {
    pub fn new(status: RunStatus, counters: RunCounters) -> Self {
        Self {
            status,
            counters,
            error: None,
            content_checksum: None,
        }
    }

    /// Completion whose status is derived from the counters.
    pub fn from_counters(counters: RunCounters) -> Self {
        Self::new(counters.derive_status(), counters)
    }

    pub fn with_error(mut self, error: serde_json::Value) -> Self {
        self.error = Some(error);
        self
    }

    pub fn with_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.content_checksum = Some(checksum.into());
        self
    }
}

/// Result of a close or cancel call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CloseOutcome {
    /// The run's terminal status after the call
    pub status: RunStatus,
    /// `false` when the run was already terminal and nothing changed
    pub transitioned: bool,
}

/// Per-record annotation attached to a run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunAnnotation {
    pub annotation_id: i64,
    pub run_id: i64,
    pub record_key: Option<String>,
    pub message: String,
    pub detail: Option<serde_json::Value>,
    pub recorded_at: DateTime<Utc>,
}

/// Open a new run in `RUNNING` and return its id.
pub fn open(
    db: &MetaDb,
    source: &SourceCode,
    job_kind: &JobKind,
    agent_id: &AgentId,
    params: Option<&serde_json::Value>,
) -> MetaResult<i64> {
    require_source(db.conn(), source)?;
    let params = json_param(params);

    let run_id = db.with_conflict_retry("open_run", |db| {
        let run_key = Uuid::new_v4().to_string();
        db.conn()
            .execute(
                "INSERT INTO gr_meta.ingest_runs
                     (run_key, source_code, job_kind, agent_id, params, status, started_at)
                 VALUES (?, ?, ?, ?, ?, 'RUNNING', CAST(? AS TIMESTAMP))",
                duckdb::params![
                    run_key,
                    source.as_str(),
                    job_kind.as_str(),
                    agent_id.as_str(),
                    params,
                    now_param(),
                ],
            )
            .db_context("insert ingest_runs")?;

        let run_id: i64 = db
            .conn()
            .query_row(
                "SELECT run_id FROM gr_meta.ingest_runs WHERE run_key = ?",
                duckdb::params![run_key],
                |row| row.get(0),
            )
            .db_context("select run_id")?;
        Ok(Some(run_id))
    })?;

    log::info!("Opened ingest run {run_id} ({source}/{job_kind}) for agent {agent_id}");
    Ok(run_id)
}

/// Perform the run's single terminal transition.
///
/// A run that is already terminal keeps its status and the call reports it
/// with `transitioned: false`. Closing into `RUNNING` is rejected.
/// A status the counters contradict (see [`RunCounters::admits`]) is rejected
/// with `InvalidInput` while the run is still open.
pub fn close(db: &MetaDb, run_id: i64, completion: &RunCompletion) -> MetaResult<CloseOutcome> {
    if !completion.status.is_terminal() {
        return Err(MetaError::InvalidTransition {
            machine: "ingest run",
            from: RunStatus::Running.to_string(),
            to: completion.status.to_string(),
        });
    }

    let error = json_param(completion.error.as_ref());
    db.with_conflict_retry("close_run", |db| {
        let current = run_status(db.conn(), run_id)?;
        if current.is_terminal() {
            log::warn!(
                "Ingest run {run_id} already {current}; ignoring close as {}",
                completion.status
            );
            return Ok(Some(CloseOutcome {
                status: current,
                transitioned: false,
            }));
        }
        let counters = &completion.counters;
        if !counters.admits(completion.status) {
            log::warn!(
                "Ingest run {run_id}: rejecting close as {} with counters {counters:?}",
                completion.status
            );
            return Err(MetaError::InvalidInput(format!(
                "run {run_id} cannot close as {} with {} fetched and {} failed \
                 ({} inserted, {} updated); the counters describe {}",
                completion.status,
                counters.fetched,
                counters.failed,
                counters.inserted,
                counters.updated,
                counters.derive_status()
            )));
        }
        let next = current.transition(completion.status)?;

        let changed = db
            .conn()
            .execute(
                "UPDATE gr_meta.ingest_runs
                 SET status = ?, finished_at = CAST(? AS TIMESTAMP),
                     fetched_count = ?, inserted_count = ?, updated_count = ?, failed_count = ?,
                     error_detail = ?, content_checksum = ?
                 WHERE run_id = ? AND status = 'RUNNING'",
                duckdb::params![
                    next.as_str(),
                    now_param(),
                    count_param(counters.fetched),
                    count_param(counters.inserted),
                    count_param(counters.updated),
                    count_param(counters.failed),
                    error,
                    completion.content_checksum,
                    run_id,
                ],
            )
            .db_context("update ingest_runs")?;
        if changed == 0 {
            return Ok(None);
        }

        log::info!(
            "Closed ingest run {run_id} as {next} (fetched {}, inserted {}, updated {}, failed {})",
            counters.fetched,
            counters.inserted,
            counters.updated,
            counters.failed
        );
        Ok(Some(CloseOutcome {
            status: next,
            transitioned: true,
        }))
    })
}

/// Force a run into `CANCELLED`, keeping the counters it has.
pub fn cancel(db: &MetaDb, run_id: i64, reason: &str) -> MetaResult<CloseOutcome> {
    let counters = get_run(db.conn(), run_id)?
        .map(|run| run.counters)
        .ok_or(MetaError::RunNotFound { run_id })?;
    let completion = RunCompletion::new(RunStatus::Cancelled, counters)
        .with_error(serde_json::json!({ "cancelled": reason }));
    close(db, run_id, &completion)
}

/// Append a per-record annotation. Allowed on terminal runs.
pub fn annotate(
    conn: &Connection,
    run_id: i64,
    record_key: Option<&str>,
    message: &str,
    detail: Option<&serde_json::Value>,
) -> MetaResult<i64> {
    run_status(conn, run_id)?;
    let annotation_id: i64 = conn
        .query_row(
            "INSERT INTO gr_meta.ingest_run_annotations (run_id, record_key, message, detail, recorded_at)
             VALUES (?, ?, ?, ?, CAST(? AS TIMESTAMP))
             RETURNING annotation_id",
            duckdb::params![run_id, record_key, message, json_param(detail), now_param()],
            |row| row.get(0),
        )
        .db_context("insert ingest_run_annotations")?;
    log::debug!("Annotated ingest run {run_id}: {message}");
    Ok(annotation_id)
}

/// Status of a run, or [`MetaError::RunNotFound`].
pub fn run_status(conn: &Connection, run_id: i64) -> MetaResult<RunStatus> {
    let status: Option<String> = conn
        .query_row(
            "SELECT status FROM gr_meta.ingest_runs WHERE run_id = ?",
            duckdb::params![run_id],
            |row| row.get(0),
        )
        .optional()
        .db_context("select ingest_runs.status")?;
    match status {
        Some(s) => parse_col(TABLE, &s),
        None => Err(MetaError::RunNotFound { run_id }),
    }
}

/// Guard for downstream writes: the run must exist and still be `RUNNING`.
///
/// Returns the run's source. Call inside the write's transaction so the
/// check and the write see the same snapshot.
pub fn require_open(conn: &Connection, run_id: i64) -> MetaResult<SourceCode> {
    let row: Option<(String, String)> = conn
        .query_row(
            "SELECT status, source_code FROM gr_meta.ingest_runs WHERE run_id = ?",
            duckdb::params![run_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .db_context("select ingest_runs")?;
    let Some((status, source)) = row else {
        return Err(MetaError::RunNotFound { run_id });
    };
    let status: RunStatus = parse_col(TABLE, &status)?;
    if status.is_terminal() {
        log::warn!("Rejected write against ingest run {run_id}: run is {status}");
        return Err(MetaError::TerminalRunViolation {
            run_id,
            status: status.to_string(),
        });
    }
    parse_col(TABLE, &source)
}

const RUN_COLUMNS: &str = "run_id, run_key, source_code, job_kind, agent_id, params, status, \
     CAST(started_at AS VARCHAR), CAST(finished_at AS VARCHAR), \
     fetched_count, inserted_count, updated_count, failed_count, error_detail, content_checksum";

struct RunRow {
    run_id: i64,
    run_key: String,
    source: String,
    job_kind: String,
    agent_id: String,
    params: Option<String>,
    status: String,
    started_at: String,
    finished_at: Option<String>,
    counts: [i64; 4],
    error: Option<String>,
    content_checksum: Option<String>,
}

fn read_run_row(row: &duckdb::Row<'_>) -> duckdb::Result<RunRow> {
    Ok(RunRow {
        run_id: row.get(0)?,
        run_key: row.get(1)?,
        source: row.get(2)?,
        job_kind: row.get(3)?,
        agent_id: row.get(4)?,
        params: row.get(5)?,
        status: row.get(6)?,
        started_at: row.get(7)?,
        finished_at: row.get(8)?,
        counts: [row.get(9)?, row.get(10)?, row.get(11)?, row.get(12)?],
        error: row.get(13)?,
        content_checksum: row.get(14)?,
    })
}

fn into_run(row: RunRow) -> MetaResult<IngestRun> {
    let [fetched, inserted, updated, failed] = row.counts;
    Ok(IngestRun {
        run_id: row.run_id,
        run_key: row.run_key,
        source: parse_col(TABLE, &row.source)?,
        job_kind: parse_col(TABLE, &row.job_kind)?,
        agent_id: parse_col(TABLE, &row.agent_id)?,
        params: parse_json(TABLE, row.params.as_deref())?,
        status: parse_col(TABLE, &row.status)?,
        started_at: parse_ts(TABLE, &row.started_at)?,
        finished_at: parse_opt_ts(TABLE, row.finished_at.as_deref())?,
        counters: RunCounters {
            fetched: parse_count(TABLE, "fetched_count", fetched)?,
            inserted: parse_count(TABLE, "inserted_count", inserted)?,
            updated: parse_count(TABLE, "updated_count", updated)?,
            failed: parse_count(TABLE, "failed_count", failed)?,
        },
        error: parse_json(TABLE, row.error.as_deref())?,
        content_checksum: row.content_checksum,
    })
}

/// Run by id.
pub fn get_run(conn: &Connection, run_id: i64) -> MetaResult<Option<IngestRun>> {
    let sql = format!("SELECT {RUN_COLUMNS} FROM gr_meta.ingest_runs WHERE run_id = ?");
    conn.query_row(&sql, duckdb::params![run_id], read_run_row)
        .optional()
        .db_context("get_run")?
        .map(into_run)
        .transpose()
}

/// Most recent runs first, optionally for one source.
pub fn list_runs(
    conn: &Connection,
    source: Option<&SourceCode>,
    limit: usize,
) -> MetaResult<Vec<IngestRun>> {
    let sql = format!(
        "SELECT {RUN_COLUMNS} FROM gr_meta.ingest_runs
         WHERE (CAST(? AS VARCHAR) IS NULL OR source_code = ?)
         ORDER BY run_id DESC
         LIMIT {limit}"
    );
    let source = source.map(|s| s.as_str());
    let mut stmt = conn.prepare(&sql).db_context("prepare list_runs")?;
    let rows = stmt
        .query_map(duckdb::params![source, source], read_run_row)
        .db_context("list_runs")?
        .collect::<Result<Vec<_>, _>>()
        .db_context("read ingest_runs")?;
    rows.into_iter().map(into_run).collect()
}

/// Annotations of a run in the order they were recorded.
pub fn run_annotations(conn: &Connection, run_id: i64) -> MetaResult<Vec<RunAnnotation>> {
    let mut stmt = conn
        .prepare(
            "SELECT annotation_id, run_id, record_key, message, detail, CAST(recorded_at AS VARCHAR)
             FROM gr_meta.ingest_run_annotations
             WHERE run_id = ?
             ORDER BY annotation_id",
        )
        .db_context("prepare run_annotations")?;
    let rows = stmt
        .query_map(duckdb::params![run_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, String>(5)?,
            ))
        })
        .db_context("run_annotations")?
        .collect::<Result<Vec<_>, _>>()
        .db_context("read ingest_run_annotations")?;

    rows.into_iter()
        .map(|(annotation_id, run_id, record_key, message, detail, recorded_at)| {
            Ok(RunAnnotation {
                annotation_id,
                run_id,
                record_key,
                message,
                detail: parse_json("ingest_run_annotations", detail.as_deref())?,
                recorded_at: parse_ts("ingest_run_annotations", &recorded_at)?,
            })
        })
        .collect()
}

#[cfg(test)]
#[path = "runs_test.rs"]
mod tests;

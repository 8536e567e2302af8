//! Validation gate store.
//!
//! One row per `(entity_type, entity_id, source)`. Every mutation reads the
//! row, decides the next status against [`GateStatus::can_transition_to`],
//! and writes it back guarded on the status it read, all in one transaction.
//! A first evaluation that races another checker's insert loses on the
//! primary key and is retried as an update.

use crate::connection::MetaDb;
use crate::error::{MetaError, MetaResult, MetaResultExt};
use crate::row_helpers::{now_param, parse_col, parse_count, parse_json, parse_opt_ts, parse_ts};
use crate::runs::get_run;
use crate::sources::require_source;
use chrono::{DateTime, Utc};
use duckdb::{Connection, OptionalExt};
use gr_core::{
    aggregate, AgentId, CheckResult, CheckerId, GateDecision, GateEntityType, GateKey, GateStatus,
    SourceCode,
};
use serde::Serialize;

const TABLE: &str = "validation_status";
const HISTORY_TABLE: &str = "validation_check_history";

/// A persisted gate row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GateRecord {
    pub gate_id: i64,
    pub key: GateKey,
    pub status: GateStatus,
    /// Checker of the latest evaluation or `begin_check`
    pub checker_id: Option<CheckerId>,
    /// Results of the latest evaluation
    pub results: Vec<CheckResult>,
    pub evaluation_count: u32,
    pub review_reason: Option<String>,
    pub approver: Option<AgentId>,
    pub approved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One check outcome from the append-only history
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckHistoryEntry {
    pub evaluation: u32,
    pub checker_id: CheckerId,
    pub result: CheckResult,
    /// Gate status produced by the evaluation this check belonged to
    pub outcome: GateStatus,
    pub evaluated_at: DateTime<Utc>,
}

/// Filter for [`list_statuses`]; unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct GateFilter {
    pub entity_type: Option<GateEntityType>,
    pub source: Option<SourceCode>,
    pub status: Option<GateStatus>,
}

enum Step {
    Write(GateStatus),
    Keep,
}

#[derive(Default)]
struct GateFields<'a> {
    checker_id: Option<&'a CheckerId>,
    evaluation: Option<(&'a [CheckResult], &'a str)>,
    review_reason: Option<&'a str>,
    approver: Option<&'a AgentId>,
}

/// Evaluate `results` for `key` and persist the aggregate status.
///
/// A key held in `REQUIRES_REVIEW` stores the results and history but keeps
/// its status. A `SUPERSEDED` key rejects the evaluation.
pub fn record_check(
    db: &MetaDb,
    key: &GateKey,
    checker: &CheckerId,
    results: &[CheckResult],
) -> MetaResult<GateStatus> {
    if results.is_empty() {
        return Err(MetaError::InvalidInput(format!(
            "{key}: record_check needs at least one check result"
        )));
    }
    validate_key(db.conn(), key)?;

    let computed = aggregate(results);
    let results_json = serde_json::to_string(results)?;
    let fields = GateFields {
        checker_id: Some(checker),
        evaluation: Some((results, &results_json)),
        ..GateFields::default()
    };
    move_gate(db, key, "record_check", true, &fields, |current| {
        if current == GateStatus::RequiresReview {
            log::info!("Gate {key} is held for review; storing results without a status change");
            return Ok(Step::Write(current));
        }
        Ok(Step::Write(current.transition(computed)?))
    })
}

/// Mark `key` as being evaluated by `checker`.
pub fn begin_check(db: &MetaDb, key: &GateKey, checker: &CheckerId) -> MetaResult<GateStatus> {
    validate_key(db.conn(), key)?;
    let fields = GateFields {
        checker_id: Some(checker),
        ..GateFields::default()
    };
    move_gate(db, key, "begin_check", true, &fields, |current| match current {
        GateStatus::RequiresReview | GateStatus::InProgress => Ok(Step::Keep),
        other => Ok(Step::Write(other.transition(GateStatus::InProgress)?)),
    })
}

/// Hold `key` for human review.
pub fn request_review(db: &MetaDb, key: &GateKey, reason: &str) -> MetaResult<GateStatus> {
    validate_key(db.conn(), key)?;
    let fields = GateFields {
        review_reason: Some(reason),
        ..GateFields::default()
    };
    move_gate(db, key, "request_review", true, &fields, |current| match current {
        GateStatus::RequiresReview => Ok(Step::Keep),
        other => Ok(Step::Write(other.transition(GateStatus::RequiresReview)?)),
    })
}

/// Human decision on `key`; the only way out of `REQUIRES_REVIEW`.
pub fn approve(
    db: &MetaDb,
    key: &GateKey,
    approver: &AgentId,
    decision: GateDecision,
) -> MetaResult<GateStatus> {
    let fields = GateFields {
        approver: Some(approver),
        ..GateFields::default()
    };
    move_gate(db, key, "approve", false, &fields, |current| {
        Ok(Step::Write(current.transition(decision.into())?))
    })
}

/// Retire `key`; terminal.
pub fn supersede(db: &MetaDb, key: &GateKey) -> MetaResult<GateStatus> {
    move_gate(db, key, "supersede", false, &GateFields::default(), |current| {
        match current {
            GateStatus::Superseded => Ok(Step::Keep),
            other => Ok(Step::Write(other.transition(GateStatus::Superseded)?)),
        }
    })
}

fn move_gate<F>(
    db: &MetaDb,
    key: &GateKey,
    operation: &str,
    create_if_absent: bool,
    fields: &GateFields<'_>,
    decide: F,
) -> MetaResult<GateStatus>
where
    F: Fn(GateStatus) -> MetaResult<Step>,
{
    db.with_conflict_retry(operation, |db| {
        db.transaction(|conn| {
            let state = load_state(conn, key)?;
            let current = match &state {
                Some((_, status)) => *status,
                None if create_if_absent => GateStatus::Pending,
                None => {
                    return Err(MetaError::GateNotFound {
                        key: key.to_string(),
                    })
                }
            };
            let next = match decide(current)? {
                Step::Keep => return Ok(Some(current)),
                Step::Write(next) => next,
            };

            let now = now_param();
            let gate_id = match state {
                None => insert_gate(conn, key, next, fields, &now)?,
                Some((gate_id, _)) => {
                    if !update_gate(conn, gate_id, current, next, fields, &now)? {
                        return Ok(None);
                    }
                    gate_id
                }
            };

            if let (Some((results, _)), Some(checker)) = (fields.evaluation, fields.checker_id) {
                append_history(conn, gate_id, checker, results, next, &now)?;
            }
            if current != next {
                log::info!("Gate {key}: {current} -> {next} ({operation})");
            }
            Ok(Some(next))
        })
    })
}

fn load_state(conn: &Connection, key: &GateKey) -> MetaResult<Option<(i64, GateStatus)>> {
    let row: Option<(i64, String)> = conn
        .query_row(
            "SELECT gate_id, status FROM gr_meta.validation_status
             WHERE entity_type = ? AND entity_id = ? AND source_code = ?",
            duckdb::params![key.entity_type.as_str(), key.entity_id, key.source.as_str()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .db_context("select validation_status")?;
    row.map(|(gate_id, status)| Ok((gate_id, parse_col(TABLE, &status)?)))
        .transpose()
}

fn insert_gate(
    conn: &Connection,
    key: &GateKey,
    status: GateStatus,
    fields: &GateFields<'_>,
    now: &str,
) -> MetaResult<i64> {
    let approved_at = fields.approver.map(|_| now);
    conn.query_row(
        "INSERT INTO gr_meta.validation_status
             (entity_type, entity_id, source_code, status, checker_id, check_results,
              evaluation_count, review_reason, approver, approved_at, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, CAST(? AS TIMESTAMP), CAST(? AS TIMESTAMP), CAST(? AS TIMESTAMP))
         RETURNING gate_id",
        duckdb::params![
            key.entity_type.as_str(),
            key.entity_id,
            key.source.as_str(),
            status.as_str(),
            fields.checker_id.map(|c| c.as_str()),
            fields.evaluation.map(|(_, json)| json),
            i32::from(fields.evaluation.is_some()),
            fields.review_reason,
            fields.approver.map(|a| a.as_str()),
            approved_at,
            now,
            now,
        ],
        |row| row.get(0),
    )
    .db_context("insert validation_status")
}

/// Returns `false` when the row moved on since it was read.
fn update_gate(
    conn: &Connection,
    gate_id: i64,
    current: GateStatus,
    next: GateStatus,
    fields: &GateFields<'_>,
    now: &str,
) -> MetaResult<bool> {
    let approved_at = fields.approver.map(|_| now);
    let changed = conn
        .execute(
            "UPDATE gr_meta.validation_status
             SET status           = ?,
                 checker_id       = COALESCE(?, checker_id),
                 check_results    = COALESCE(?, check_results),
                 evaluation_count = evaluation_count + ?,
                 review_reason    = COALESCE(?, review_reason),
                 approver         = COALESCE(?, approver),
                 approved_at      = COALESCE(CAST(? AS TIMESTAMP), approved_at),
                 updated_at       = CAST(? AS TIMESTAMP)
             WHERE gate_id = ? AND status = ?",
            duckdb::params![
                next.as_str(),
                fields.checker_id.map(|c| c.as_str()),
                fields.evaluation.map(|(_, json)| json),
                i32::from(fields.evaluation.is_some()),
                fields.review_reason,
                fields.approver.map(|a| a.as_str()),
                approved_at,
                now,
                gate_id,
                current.as_str(),
            ],
        )
        .db_context("update validation_status")?;
    Ok(changed > 0)
}

fn append_history(
    conn: &Connection,
    gate_id: i64,
    checker: &CheckerId,
    results: &[CheckResult],
    outcome: GateStatus,
    now: &str,
) -> MetaResult<()> {
    let evaluation: i32 = conn
        .query_row(
            "SELECT evaluation_count FROM gr_meta.validation_status WHERE gate_id = ?",
            duckdb::params![gate_id],
            |row| row.get(0),
        )
        .db_context("select evaluation_count")?;
    for result in results {
        conn.execute(
            "INSERT INTO gr_meta.validation_check_history
                 (gate_id, evaluation, checker_id, check_name, severity, passed, message, detail,
                  outcome, evaluated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, CAST(? AS TIMESTAMP))",
            duckdb::params![
                gate_id,
                evaluation,
                checker.as_str(),
                result.name,
                result.severity.as_str(),
                result.passed,
                result.message,
                result.detail.as_ref().map(|d| d.to_string()),
                outcome.as_str(),
                now,
            ],
        )
        .db_context("insert validation_check_history")?;
    }
    Ok(())
}

/// Source must be registered; run keys must name an existing run of that source.
fn validate_key(conn: &Connection, key: &GateKey) -> MetaResult<()> {
    require_source(conn, &key.source)?;
    if key.entity_id.trim().is_empty() {
        return Err(MetaError::InvalidInput(format!("{key}: empty entity id")));
    }
    if key.entity_type == GateEntityType::IngestRun {
        let run_id: i64 = key.entity_id.parse().map_err(|_| {
            MetaError::InvalidInput(format!("{key}: ingest_run entity id must be a run id"))
        })?;
        // Views join gate rows to runs on the run id's text form.
        if run_id.to_string() != key.entity_id {
            return Err(MetaError::InvalidInput(format!(
                "{key}: ingest_run entity id must be written as '{run_id}'"
            )));
        }
        let run = get_run(conn, run_id)?.ok_or(MetaError::RunNotFound { run_id })?;
        if run.source != key.source {
            return Err(MetaError::InvalidInput(format!(
                "{key}: run {run_id} belongs to source '{}'",
                run.source
            )));
        }
    }
    Ok(())
}

const GATE_COLUMNS: &str = "gate_id, entity_type, entity_id, source_code, status, checker_id, \
     check_results, evaluation_count, review_reason, approver, CAST(approved_at AS VARCHAR), \
     CAST(created_at AS VARCHAR), CAST(updated_at AS VARCHAR)";

struct GateRow {
    gate_id: i64,
    entity_type: String,
    entity_id: String,
    source: String,
    status: String,
    checker_id: Option<String>,
    check_results: Option<String>,
    evaluation_count: i32,
    review_reason: Option<String>,
    approver: Option<String>,
    approved_at: Option<String>,
    created_at: String,
    updated_at: String,
}

fn read_gate_row(row: &duckdb::Row<'_>) -> duckdb::Result<GateRow> {
    Ok(GateRow {
        gate_id: row.get(0)?,
        entity_type: row.get(1)?,
        entity_id: row.get(2)?,
        source: row.get(3)?,
        status: row.get(4)?,
        checker_id: row.get(5)?,
        check_results: row.get(6)?,
        evaluation_count: row.get(7)?,
        review_reason: row.get(8)?,
        approver: row.get(9)?,
        approved_at: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

fn into_record(row: GateRow) -> MetaResult<GateRecord> {
    let results = match row.check_results.as_deref() {
        Some(json) => serde_json::from_str(json).map_err(|e| MetaError::CorruptRow {
            table: TABLE,
            message: format!("bad check_results for gate {}: {e}", row.gate_id),
        })?,
        None => Vec::new(),
    };
    Ok(GateRecord {
        gate_id: row.gate_id,
        key: GateKey {
            entity_type: parse_col(TABLE, &row.entity_type)?,
            entity_id: row.entity_id,
            source: parse_col(TABLE, &row.source)?,
        },
        status: parse_col(TABLE, &row.status)?,
        checker_id: row
            .checker_id
            .map(|c| parse_col(TABLE, &c))
            .transpose()?,
        results,
        evaluation_count: parse_count(TABLE, "evaluation_count", i64::from(row.evaluation_count))?,
        review_reason: row.review_reason,
        approver: row.approver.map(|a| parse_col(TABLE, &a)).transpose()?,
        approved_at: parse_opt_ts(TABLE, row.approved_at.as_deref())?,
        created_at: parse_ts(TABLE, &row.created_at)?,
        updated_at: parse_ts(TABLE, &row.updated_at)?,
    })
}

/// Gate row for `key`, if any checker has touched it.
pub fn status(conn: &Connection, key: &GateKey) -> MetaResult<Option<GateRecord>> {
    let sql = format!(
        "SELECT {GATE_COLUMNS} FROM gr_meta.validation_status
         WHERE entity_type = ? AND entity_id = ? AND source_code = ?"
    );
    conn.query_row(
        &sql,
        duckdb::params![key.entity_type.as_str(), key.entity_id, key.source.as_str()],
        read_gate_row,
    )
    .optional()
    .db_context("gate status")?
    .map(into_record)
    .transpose()
}

/// Whether data behind `key` may be promoted. A key with no row is not ready.
pub fn is_ready(conn: &Connection, key: &GateKey) -> MetaResult<bool> {
    Ok(status(conn, key)?.is_some_and(|record| record.status.is_ready()))
}

/// Gate rows matching `filter`, most recently updated first.
pub fn list_statuses(conn: &Connection, filter: &GateFilter) -> MetaResult<Vec<GateRecord>> {
    let sql = format!(
        "SELECT {GATE_COLUMNS} FROM gr_meta.validation_status
         WHERE (CAST(? AS VARCHAR) IS NULL OR entity_type = ?)
           AND (CAST(? AS VARCHAR) IS NULL OR source_code = ?)
           AND (CAST(? AS VARCHAR) IS NULL OR status = ?)
         ORDER BY updated_at DESC, gate_id DESC"
    );
    let entity_type = filter.entity_type.map(|t| t.as_str());
    let source = filter.source.as_ref().map(|s| s.as_str());
    let status = filter.status.map(|s| s.as_str());
    let mut stmt = conn.prepare(&sql).db_context("prepare list_statuses")?;
    let rows = stmt
        .query_map(
            duckdb::params![entity_type, entity_type, source, source, status, status],
            read_gate_row,
        )
        .db_context("list_statuses")?
        .collect::<Result<Vec<_>, _>>()
        .db_context("read validation_status")?;
    rows.into_iter().map(into_record).collect()
}

/// Append-only check history for `key`, oldest evaluation first.
pub fn check_history(conn: &Connection, key: &GateKey) -> MetaResult<Vec<CheckHistoryEntry>> {
    let mut stmt = conn
        .prepare(
            "SELECT h.evaluation, h.checker_id, h.check_name, h.severity, h.passed, h.message,
                    h.detail, h.outcome, CAST(h.evaluated_at AS VARCHAR)
             FROM gr_meta.validation_check_history h
             JOIN gr_meta.validation_status v ON v.gate_id = h.gate_id
             WHERE v.entity_type = ? AND v.entity_id = ? AND v.source_code = ?
             ORDER BY h.evaluation, h.history_id",
        )
        .db_context("prepare check_history")?;
    let rows = stmt
        .query_map(
            duckdb::params![key.entity_type.as_str(), key.entity_id, key.source.as_str()],
            |row| {
                Ok((
                    row.get::<_, i32>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, bool>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, Option<String>>(6)?,
                    row.get::<_, String>(7)?,
                    row.get::<_, String>(8)?,
                ))
            },
        )
        .db_context("check_history")?
        .collect::<Result<Vec<_>, _>>()
        .db_context("read validation_check_history")?;

    rows.into_iter()
        .map(
            |(evaluation, checker, name, severity, passed, message, detail, outcome, at)| {
                Ok(CheckHistoryEntry {
                    evaluation: parse_count(HISTORY_TABLE, "evaluation", i64::from(evaluation))?,
                    checker_id: parse_col(HISTORY_TABLE, &checker)?,
                    result: CheckResult {
                        name,
                        severity: parse_col(HISTORY_TABLE, &severity)?,
                        passed,
                        message,
                        detail: parse_json(HISTORY_TABLE, detail.as_deref())?,
                    },
                    outcome: parse_col(HISTORY_TABLE, &outcome)?,
                    evaluated_at: parse_ts(HISTORY_TABLE, &at)?,
                })
            },
        )
        .collect()
}

#[cfg(test)]
#[path = "gate_test.rs"]
mod tests;

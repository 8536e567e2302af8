use super::*;
use crate::test_fixtures::{count, open_db, open_run, wasde};

fn counters(fetched: u64, inserted: u64, updated: u64, failed: u64) -> RunCounters {
    RunCounters {
        fetched,
        inserted,
        updated,
        failed,
    }
}

#[test]
fn open_starts_running() {
    let db = open_db();
    let params = serde_json::json!({"report_month": "2024-09"});
    let run_id = open(
        &db,
        &wasde(),
        &JobKind::new("monthly_report"),
        &AgentId::new("collector-1"),
        Some(&params),
    )
    .unwrap();

    let run = get_run(db.conn(), run_id).unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Running);
    assert!(run.finished_at.is_none());
    assert_eq!(run.params, Some(params));
    assert_eq!(run.counters, RunCounters::default());
    assert!(Uuid::parse_str(&run.run_key).is_ok());
}

#[test]
fn open_rejects_unknown_source() {
    let db = open_db();
    let err = open(
        &db,
        &SourceCode::new("conab"),
        &JobKind::new("daily"),
        &AgentId::new("collector-1"),
        None,
    )
    .unwrap_err();
    assert!(matches!(err, MetaError::UnknownSource { .. }));
}

#[test]
fn close_records_counters_and_finish_time() {
    let db = open_db();
    let run_id = open_run(&db);
    let completion =
        RunCompletion::from_counters(counters(10, 8, 1, 1)).with_checksum("abc123");

    let outcome = close(&db, run_id, &completion).unwrap();
    assert_eq!(outcome.status, RunStatus::Partial);
    assert!(outcome.transitioned);

    let run = get_run(db.conn(), run_id).unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Partial);
    assert_eq!(run.counters, counters(10, 8, 1, 1));
    assert_eq!(run.content_checksum.as_deref(), Some("abc123"));
    assert!(run.finished_at.unwrap() >= run.started_at);
}

#[test]
fn second_close_is_a_noop() {
    let db = open_db();
    let run_id = open_run(&db);
    close(&db, run_id, &RunCompletion::from_counters(counters(5, 5, 0, 0))).unwrap();

    let again = close(
        &db,
        run_id,
        &RunCompletion::new(RunStatus::Failed, counters(5, 0, 0, 5)),
    )
    .unwrap();
    assert_eq!(again.status, RunStatus::Success);
    assert!(!again.transitioned);

    let run = get_run(db.conn(), run_id).unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Success);
    assert_eq!(run.counters.inserted, 5);
}

#[test]
fn close_into_running_rejected() {
    let db = open_db();
    let run_id = open_run(&db);
    let err = close(
        &db,
        run_id,
        &RunCompletion::new(RunStatus::Running, RunCounters::default()),
    )
    .unwrap_err();
    assert!(matches!(err, MetaError::InvalidTransition { .. }));
    assert_eq!(run_status(db.conn(), run_id).unwrap(), RunStatus::Running);
}

#[test]
fn close_unknown_run() {
    let db = open_db();
    let err = close(
        &db,
        999,
        &RunCompletion::new(RunStatus::Success, RunCounters::default()),
    )
    .unwrap_err();
    assert!(matches!(err, MetaError::RunNotFound { run_id: 999 }));
}

#[test]
fn cancel_keeps_counters_and_reason() {
    let db = open_db();
    let run_id = open_run(&db);
    let outcome = cancel(&db, run_id, "operator abort").unwrap();
    assert_eq!(outcome.status, RunStatus::Cancelled);

    let run = get_run(db.conn(), run_id).unwrap().unwrap();
    assert_eq!(
        run.error,
        Some(serde_json::json!({"cancelled": "operator abort"}))
    );
    assert!(!cancel(&db, run_id, "again").unwrap().transitioned);
}

#[test]
fn require_open_guards_terminal_runs() {
    let db = open_db();
    let run_id = open_run(&db);
    assert_eq!(require_open(db.conn(), run_id).unwrap(), wasde());

    close(&db, run_id, &RunCompletion::from_counters(RunCounters::default())).unwrap();
    let err = require_open(db.conn(), run_id).unwrap_err();
    assert!(matches!(err, MetaError::TerminalRunViolation { .. }));
    assert!(matches!(
        require_open(db.conn(), run_id + 1).unwrap_err(),
        MetaError::RunNotFound { .. }
    ));
}

#[test]
fn annotations_allowed_after_close() {
    let db = open_db();
    let run_id = open_run(&db);
    annotate(db.conn(), run_id, Some("row-7"), "unparseable value", None).unwrap();
    close(&db, run_id, &RunCompletion::from_counters(counters(1, 0, 0, 1))).unwrap();
    annotate(
        db.conn(),
        run_id,
        None,
        "post-run note",
        Some(&serde_json::json!({"by": "ops"})),
    )
    .unwrap();

    let notes = run_annotations(db.conn(), run_id).unwrap();
    assert_eq!(notes.len(), 2);
    assert_eq!(notes[0].record_key.as_deref(), Some("row-7"));
    assert_eq!(notes[1].detail, Some(serde_json::json!({"by": "ops"})));
    assert!(annotate(db.conn(), 999, None, "x", None).is_err());
}

#[test]
fn list_runs_filters_and_limits() {
    let db = open_db();
    let fas = SourceCode::new("fas_psd");
    crate::sources::register_source(&db, &fas, "FAS PSD", None).unwrap();
    let first = open_run(&db);
    let second = open_run(&db);
    open(
        &db,
        &fas,
        &JobKind::new("weekly"),
        &AgentId::new("collector-2"),
        None,
    )
    .unwrap();

    let all = list_runs(db.conn(), None, 10).unwrap();
    assert_eq!(all.len(), 3);
    let wasde_runs = list_runs(db.conn(), Some(&wasde()), 10).unwrap();
    let ids: Vec<i64> = wasde_runs.iter().map(|r| r.run_id).collect();
    assert_eq!(ids, vec![second, first]);
    assert_eq!(list_runs(db.conn(), None, 1).unwrap().len(), 1);
    assert_eq!(count(&db, "SELECT COUNT(*) FROM gr_meta.ingest_runs"), 3);
}

#[test]
fn close_rejects_status_the_counters_contradict() {
    let db = open_db();
    let run_id = open_run(&db);
    let err = close(
        &db,
        run_id,
        &RunCompletion::new(RunStatus::Success, counters(10, 7, 0, 3)),
    )
    .unwrap_err();
    assert!(matches!(err, MetaError::InvalidInput(_)));
    assert_eq!(run_status(db.conn(), run_id).unwrap(), RunStatus::Running);

    let err = close(
        &db,
        run_id,
        &RunCompletion::new(RunStatus::Failed, counters(10, 7, 0, 3)),
    )
    .unwrap_err();
    assert!(matches!(err, MetaError::InvalidInput(_)));

    let outcome = close(
        &db,
        run_id,
        &RunCompletion::new(RunStatus::Partial, counters(10, 7, 0, 3)),
    )
    .unwrap();
    assert!(outcome.transitioned);
    assert_eq!(
        get_run(db.conn(), run_id).unwrap().unwrap().status,
        RunStatus::Partial
    );
}

#[test]
fn empty_release_closes_as_success() {
    let db = open_db();
    let run_id = open_run(&db);
    let outcome = close(&db, run_id, &RunCompletion::from_counters(RunCounters::default())).unwrap();
    assert_eq!(outcome.status, RunStatus::Success);
}

#[test]
fn collector_crash_closes_as_failed() {
    let db = open_db();
    let run_id = open_run(&db);
    let completion = RunCompletion::new(RunStatus::Failed, RunCounters::default())
        .with_error(serde_json::json!({"error": "connection reset"}));
    let outcome = close(&db, run_id, &completion).unwrap();
    assert_eq!(outcome.status, RunStatus::Failed);
}

#[test]
fn negative_stored_counter_is_corrupt() {
    let db = open_db();
    let run_id = open_run(&db);
    db.conn()
        .execute(
            "UPDATE gr_meta.ingest_runs SET failed_count = -1 WHERE run_id = ?",
            [run_id],
        )
        .unwrap();
    let err = get_run(db.conn(), run_id).unwrap_err();
    assert!(matches!(err, MetaError::CorruptRow { table: "ingest_runs", .. }));
}

use super::*;
use crate::test_fixtures::{count, open_db, open_run, wasde};
use gr_core::Severity;

fn checker() -> CheckerId {
    CheckerId::new("qa-bot")
}

fn run_key(db: &MetaDb) -> GateKey {
    GateKey::for_run(open_run(db), wasde())
}

#[test]
fn aggregate_status_is_persisted() {
    let db = open_db();
    let cases = [
        (
            vec![
                CheckResult::pass("row_count_nonzero", Severity::Critical),
                CheckResult::pass("no_nulls", Severity::Error),
            ],
            GateStatus::Passed,
        ),
        (
            vec![
                CheckResult::pass("row_count_nonzero", Severity::Critical),
                CheckResult::fail("yoy_change", Severity::Warning, "+40% vs last year"),
            ],
            GateStatus::PassedWithWarnings,
        ),
        (
            vec![
                CheckResult::fail("yoy_change", Severity::Warning, "+40%"),
                CheckResult::fail("row_count_nonzero", Severity::Critical, "0 rows"),
            ],
            GateStatus::Failed,
        ),
        (
            vec![CheckResult::fail("note", Severity::Info, "advisory")],
            GateStatus::Passed,
        ),
    ];
    for (results, expected) in cases {
        let key = run_key(&db);
        assert_eq!(record_check(&db, &key, &checker(), &results).unwrap(), expected);
        let record = status(db.conn(), &key).unwrap().unwrap();
        assert_eq!(record.status, expected);
        assert_eq!(record.results, results);
        assert_eq!(record.evaluation_count, 1);
        assert_eq!(is_ready(db.conn(), &key).unwrap(), expected.is_ready());
    }
}

#[test]
fn reevaluation_updates_in_place() {
    let db = open_db();
    let key = run_key(&db);
    record_check(
        &db,
        &key,
        &checker(),
        &[CheckResult::fail("no_nulls", Severity::Error, "3 nulls")],
    )
    .unwrap();
    let status_after = record_check(
        &db,
        &key,
        &checker(),
        &[CheckResult::pass("no_nulls", Severity::Error)],
    )
    .unwrap();
    assert_eq!(status_after, GateStatus::Passed);

    let record = status(db.conn(), &key).unwrap().unwrap();
    assert_eq!(record.evaluation_count, 2);
    assert_eq!(count(&db, "SELECT COUNT(*) FROM gr_meta.validation_status"), 1);

    let history = check_history(db.conn(), &key).unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].evaluation, 1);
    assert_eq!(history[0].outcome, GateStatus::Failed);
    assert_eq!(history[1].evaluation, 2);
    assert_eq!(history[1].outcome, GateStatus::Passed);
}

#[test]
fn missing_row_is_not_ready() {
    let db = open_db();
    let key = run_key(&db);
    assert!(status(db.conn(), &key).unwrap().is_none());
    assert!(!is_ready(db.conn(), &key).unwrap());
}

#[test]
fn empty_results_rejected() {
    let db = open_db();
    let key = run_key(&db);
    let err = record_check(&db, &key, &checker(), &[]).unwrap_err();
    assert!(matches!(err, MetaError::InvalidInput(_)));
    assert!(status(db.conn(), &key).unwrap().is_none());
}

#[test]
fn run_keys_are_validated() {
    let db = open_db();
    let results = [CheckResult::pass("row_count_nonzero", Severity::Critical)];

    let missing_run = GateKey::for_run(777, wasde());
    assert!(matches!(
        record_check(&db, &missing_run, &checker(), &results).unwrap_err(),
        MetaError::RunNotFound { run_id: 777 }
    ));

    let not_a_number = GateKey::new(GateEntityType::IngestRun, "latest", wasde());
    assert!(matches!(
        record_check(&db, &not_a_number, &checker(), &results).unwrap_err(),
        MetaError::InvalidInput(_)
    ));

    let unknown_source = GateKey::new(GateEntityType::Dataset, "curated.corn", SourceCode::new("x"));
    assert!(matches!(
        record_check(&db, &unknown_source, &checker(), &results).unwrap_err(),
        MetaError::UnknownSource { .. }
    ));
}

#[test]
fn review_hold_survives_evaluations_until_approved() {
    let db = open_db();
    let key = run_key(&db);
    record_check(
        &db,
        &key,
        &checker(),
        &[CheckResult::pass("row_count_nonzero", Severity::Critical)],
    )
    .unwrap();
    assert_eq!(
        request_review(&db, &key, "analyst flagged outlier").unwrap(),
        GateStatus::RequiresReview
    );

    let held = record_check(
        &db,
        &key,
        &checker(),
        &[CheckResult::pass("row_count_nonzero", Severity::Critical)],
    )
    .unwrap();
    assert_eq!(held, GateStatus::RequiresReview);
    assert_eq!(
        begin_check(&db, &key, &checker()).unwrap(),
        GateStatus::RequiresReview
    );
    assert!(!is_ready(db.conn(), &key).unwrap());

    let approver = AgentId::new("analyst-jo");
    assert_eq!(
        approve(&db, &key, &approver, GateDecision::Passed).unwrap(),
        GateStatus::Passed
    );
    let record = status(db.conn(), &key).unwrap().unwrap();
    assert_eq!(record.approver, Some(approver));
    assert!(record.approved_at.is_some());
    assert_eq!(record.review_reason.as_deref(), Some("analyst flagged outlier"));
    assert_eq!(record.evaluation_count, 2);
}

#[test]
fn approve_requires_existing_row() {
    let db = open_db();
    let key = run_key(&db);
    let err = approve(&db, &key, &AgentId::new("analyst-jo"), GateDecision::Failed).unwrap_err();
    assert!(matches!(err, MetaError::GateNotFound { .. }));
}

#[test]
fn begin_check_marks_in_progress() {
    let db = open_db();
    let key = run_key(&db);
    assert_eq!(begin_check(&db, &key, &checker()).unwrap(), GateStatus::InProgress);
    assert_eq!(begin_check(&db, &key, &checker()).unwrap(), GateStatus::InProgress);
    let record = status(db.conn(), &key).unwrap().unwrap();
    assert_eq!(record.checker_id, Some(checker()));
    assert_eq!(record.evaluation_count, 0);
}

#[test]
fn superseded_is_terminal() {
    let db = open_db();
    let key = run_key(&db);
    record_check(
        &db,
        &key,
        &checker(),
        &[CheckResult::pass("row_count_nonzero", Severity::Critical)],
    )
    .unwrap();
    assert_eq!(supersede(&db, &key).unwrap(), GateStatus::Superseded);
    assert_eq!(supersede(&db, &key).unwrap(), GateStatus::Superseded);

    let err = record_check(
        &db,
        &key,
        &checker(),
        &[CheckResult::pass("row_count_nonzero", Severity::Critical)],
    )
    .unwrap_err();
    assert!(matches!(err, MetaError::InvalidTransition { .. }));
    assert!(matches!(
        approve(&db, &key, &AgentId::new("analyst-jo"), GateDecision::Passed).unwrap_err(),
        MetaError::InvalidTransition { .. }
    ));
}

#[test]
fn list_statuses_filters() {
    let db = open_db();
    let passed = run_key(&db);
    let failed = run_key(&db);
    record_check(
        &db,
        &passed,
        &checker(),
        &[CheckResult::pass("row_count_nonzero", Severity::Critical)],
    )
    .unwrap();
    record_check(
        &db,
        &failed,
        &checker(),
        &[CheckResult::fail("row_count_nonzero", Severity::Critical, "0 rows")],
    )
    .unwrap();
    let dataset = GateKey::new(GateEntityType::Dataset, "curated.corn_balance", wasde());
    begin_check(&db, &dataset, &checker()).unwrap();

    assert_eq!(list_statuses(db.conn(), &GateFilter::default()).unwrap().len(), 3);
    let only_failed = list_statuses(
        db.conn(),
        &GateFilter {
            status: Some(GateStatus::Failed),
            ..GateFilter::default()
        },
    )
    .unwrap();
    assert_eq!(only_failed.len(), 1);
    assert_eq!(only_failed[0].key, failed);

    let runs = list_statuses(
        db.conn(),
        &GateFilter {
            entity_type: Some(GateEntityType::IngestRun),
            source: Some(wasde()),
            ..GateFilter::default()
        },
    )
    .unwrap();
    assert_eq!(runs.len(), 2);
}

#[test]
fn padded_run_ids_are_rejected() {
    let db = open_db();
    let run_id = open_run(&db);
    let results = [CheckResult::pass("row_count_nonzero", Severity::Critical)];

    for spelled in [format!("0{run_id}"), format!("+{run_id}")] {
        let key = GateKey::new(GateEntityType::IngestRun, spelled, wasde());
        assert!(matches!(
            record_check(&db, &key, &checker(), &results).unwrap_err(),
            MetaError::InvalidInput(_)
        ));
        assert!(matches!(
            request_review(&db, &key, "spike").unwrap_err(),
            MetaError::InvalidInput(_)
        ));
        assert!(status(db.conn(), &key).unwrap().is_none());
    }
    assert_eq!(count(&db, "SELECT COUNT(*) FROM gr_meta.validation_status"), 0);

    let canonical = GateKey::for_run(run_id, wasde());
    assert_eq!(
        record_check(&db, &canonical, &checker(), &results).unwrap(),
        GateStatus::Passed
    );
    assert!(is_ready(db.conn(), &canonical).unwrap());
}

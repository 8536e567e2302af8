use super::*;
use crate::runs::{close, RunCompletion};
use crate::test_fixtures::{corn_entity, count, my_2024, open_db, open_run};
use chrono::Duration;

#[test]
fn first_write_inserts_revision_zero() {
    let db = open_db();
    let run_id = open_run(&db);
    let entity = corn_entity(&db);

    let outcome = upsert(&db, &FactWrite::new(entity, my_2024(), 14900.0, run_id)).unwrap();
    assert_eq!(outcome.action, UpsertAction::Inserted);
    assert_eq!(outcome.revision, 0);

    let obs = current(db.conn(), entity, &my_2024()).unwrap().unwrap();
    assert_eq!(obs.value, Some(14900.0));
    assert_eq!(obs.observed_at, my_2024());
    assert_eq!(obs.quality_flag, QualityFlag::Ok);
    assert_eq!(obs.run_id, run_id);
}

#[test]
fn repeated_upsert_keeps_one_row() {
    let db = open_db();
    let run_id = open_run(&db);
    let entity = corn_entity(&db);
    let write = FactWrite::new(entity, my_2024(), 14900.0, run_id);

    let first = upsert(&db, &write).unwrap();
    let second = upsert(&db, &write).unwrap();
    assert_eq!(second.action, UpsertAction::Updated);
    assert_eq!(second.fact_id, first.fact_id);
    assert_eq!(count(&db, "SELECT COUNT(*) FROM gr_meta.observations"), 1);
}

#[test]
fn update_overwrites_mutable_fields_and_attribution() {
    let db = open_db();
    let entity = corn_entity(&db);
    let first_run = open_run(&db);
    upsert(&db, &FactWrite::new(entity, my_2024(), 14900.0, first_run)).unwrap();

    let second_run = open_run(&db);
    upsert(
        &db,
        &FactWrite::new(entity, my_2024(), 14950.0, second_run)
            .with_quality(QualityFlag::Provisional)
            .with_validation(ValidationFlag::Valid),
    )
    .unwrap();

    let obs = original(db.conn(), entity, &my_2024()).unwrap().unwrap();
    assert_eq!(obs.value, Some(14950.0));
    assert_eq!(obs.quality_flag, QualityFlag::Provisional);
    assert_eq!(obs.validation_flag, ValidationFlag::Valid);
    assert_eq!(obs.run_id, second_run);
    assert!(obs.updated_at >= obs.created_at);
}

#[test]
fn revisions_are_isolated() {
    let db = open_db();
    let run_id = open_run(&db);
    let entity = corn_entity(&db);
    upsert(&db, &FactWrite::new(entity, my_2024(), 14900.0, run_id)).unwrap();
    upsert(
        &db,
        &FactWrite::new(entity, my_2024(), 15100.0, run_id).with_revision(1),
    )
    .unwrap();
    // Rewriting revision 1 leaves revision 0 alone.
    upsert(
        &db,
        &FactWrite::new(entity, my_2024(), 15150.0, run_id).with_revision(1),
    )
    .unwrap();

    let all = revisions(db.conn(), entity, &my_2024()).unwrap();
    let values: Vec<(u32, Option<f64>)> = all.iter().map(|o| (o.revision, o.value)).collect();
    assert_eq!(values, vec![(0, Some(14900.0)), (1, Some(15150.0))]);
    assert_eq!(
        current(db.conn(), entity, &my_2024()).unwrap().unwrap().revision,
        1
    );
    assert_eq!(
        at_revision(db.conn(), entity, &my_2024(), 0)
            .unwrap()
            .unwrap()
            .value,
        Some(14900.0)
    );
}

#[test]
fn terminal_run_rejects_writes() {
    let db = open_db();
    let run_id = open_run(&db);
    let entity = corn_entity(&db);
    close(
        &db,
        run_id,
        &RunCompletion::from_counters(RunCounters::default()),
    )
    .unwrap();

    let err = upsert(&db, &FactWrite::new(entity, my_2024(), 14900.0, run_id)).unwrap_err();
    assert!(matches!(err, MetaError::TerminalRunViolation { .. }));
    assert_eq!(count(&db, "SELECT COUNT(*) FROM gr_meta.observations"), 0);
}

#[test]
fn unknown_entity_rejected() {
    let db = open_db();
    let run_id = open_run(&db);
    let err = upsert(&db, &FactWrite::new(42, my_2024(), 1.0, run_id)).unwrap_err();
    assert!(matches!(err, MetaError::EntityNotFound { entity_id: 42 }));
}

#[test]
fn invalid_values_rejected() {
    let db = open_db();
    let run_id = open_run(&db);
    let entity = corn_entity(&db);

    let nan = FactWrite::new(entity, my_2024(), f64::NAN, run_id);
    assert!(matches!(upsert(&db, &nan).unwrap_err(), MetaError::InvalidInput(_)));

    let mut missing = FactWrite::new(entity, my_2024(), 0.0, run_id);
    missing.value = None;
    assert!(matches!(
        upsert(&db, &missing).unwrap_err(),
        MetaError::InvalidInput(_)
    ));

    let outcome = upsert(&db, &missing.with_quality(QualityFlag::Missing)).unwrap();
    assert_eq!(outcome.action, UpsertAction::Inserted);
    let obs = current(db.conn(), entity, &my_2024()).unwrap().unwrap();
    assert_eq!(obs.value, None);
}

#[test]
fn record_revision_appends_only_on_change() {
    let db = open_db();
    let run_id = open_run(&db);
    let entity = corn_entity(&db);

    let first = record_revision(&db, &FactWrite::new(entity, my_2024(), 14900.0, run_id)).unwrap();
    assert_eq!((first.revision, first.action), (0, UpsertAction::Inserted));

    let same = record_revision(&db, &FactWrite::new(entity, my_2024(), 14900.0, run_id)).unwrap();
    assert_eq!((same.revision, same.action), (0, UpsertAction::Unchanged));
    assert_eq!(same.fact_id, first.fact_id);

    let revised =
        record_revision(&db, &FactWrite::new(entity, my_2024(), 15100.0, run_id)).unwrap();
    assert_eq!((revised.revision, revised.action), (1, UpsertAction::Inserted));
    assert_eq!(count(&db, "SELECT COUNT(*) FROM gr_meta.observations"), 2);
}

#[test]
fn batch_counts_and_annotates_failures() {
    let db = open_db();
    let run_id = open_run(&db);
    let entity = corn_entity(&db);
    let next_month = my_2024() + Duration::days(30);

    upsert(&db, &FactWrite::new(entity, my_2024(), 14800.0, run_id)).unwrap();
    let writes = vec![
        FactWrite::new(entity, my_2024(), 14900.0, run_id),
        FactWrite::new(entity, next_month, 15000.0, run_id),
        FactWrite::new(entity + 50, my_2024(), 1.0, run_id),
    ];
    let report = upsert_batch(&db, run_id, &writes).unwrap();

    assert_eq!(
        report.counters,
        RunCounters {
            fetched: 3,
            inserted: 1,
            updated: 1,
            failed: 1,
        }
    );
    assert_eq!(report.failures.len(), 1);
    assert_eq!(
        count(
            &db,
            &format!("SELECT COUNT(*) FROM gr_meta.ingest_run_annotations WHERE run_id = {run_id}")
        ),
        1
    );
}

#[test]
fn batch_forces_run_attribution() {
    let db = open_db();
    let run_id = open_run(&db);
    let other_run = open_run(&db);
    let entity = corn_entity(&db);

    upsert_batch(
        &db,
        run_id,
        &[FactWrite::new(entity, my_2024(), 14900.0, other_run)],
    )
    .unwrap();
    let obs = current(db.conn(), entity, &my_2024()).unwrap().unwrap();
    assert_eq!(obs.run_id, run_id);
}

#[test]
fn batch_on_terminal_run_aborts() {
    let db = open_db();
    let run_id = open_run(&db);
    let entity = corn_entity(&db);
    close(
        &db,
        run_id,
        &RunCompletion::from_counters(RunCounters::default()),
    )
    .unwrap();
    let err = upsert_batch(
        &db,
        run_id,
        &[FactWrite::new(entity, my_2024(), 14900.0, run_id)],
    )
    .unwrap_err();
    assert!(matches!(err, MetaError::TerminalRunViolation { .. }));
}

#[test]
fn series_current_picks_latest_revision_per_time() {
    let db = open_db();
    let run_id = open_run(&db);
    let entity = corn_entity(&db);
    let next_month = my_2024() + Duration::days(30);

    upsert(&db, &FactWrite::new(entity, my_2024(), 14900.0, run_id)).unwrap();
    upsert(
        &db,
        &FactWrite::new(entity, my_2024(), 15100.0, run_id).with_revision(2),
    )
    .unwrap();
    upsert(&db, &FactWrite::new(entity, next_month, 15200.0, run_id)).unwrap();

    let series = series_current(db.conn(), entity).unwrap();
    let points: Vec<(u32, Option<f64>)> = series.iter().map(|o| (o.revision, o.value)).collect();
    assert_eq!(points, vec![(2, Some(15100.0)), (0, Some(15200.0))]);
}

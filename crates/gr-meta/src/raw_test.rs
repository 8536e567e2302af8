use super::*;
use crate::runs::{close, RunCompletion};
use crate::test_fixtures::{count, open_db, open_run, wasde};
use gr_core::RunCounters;

fn payload() -> serde_json::Value {
    serde_json::json!({"commodity": "corn", "attribute": "production", "value": "14,900"})
}

#[test]
fn first_delivery_inserts() {
    let db = open_db();
    let run_id = open_run(&db);
    let outcome = record_raw(&db, run_id, "corn/production/2024-25", &payload()).unwrap();
    assert_eq!(outcome.action, UpsertAction::Inserted);

    let raw = get_raw(db.conn(), outcome.raw_id).unwrap().unwrap();
    assert_eq!(raw.source, wasde());
    assert_eq!(raw.payload, payload());
    assert_eq!(raw.checksum, json_checksum(&payload()));
    assert_eq!(raw.run_id, run_id);
}

#[test]
fn replay_is_unchanged_and_reattributed() {
    let db = open_db();
    let first_run = open_run(&db);
    let first = record_raw(&db, first_run, "corn/production/2024-25", &payload()).unwrap();

    let second_run = open_run(&db);
    let second = record_raw(&db, second_run, "corn/production/2024-25", &payload()).unwrap();
    assert_eq!(second.action, UpsertAction::Unchanged);
    assert_eq!(second.raw_id, first.raw_id);

    let raw = get_raw(db.conn(), first.raw_id).unwrap().unwrap();
    assert_eq!(raw.run_id, second_run);
    assert!(raw.last_seen_at >= raw.first_seen_at);
    assert_eq!(count(&db, "SELECT COUNT(*) FROM gr_meta.raw_records"), 1);
}

#[test]
fn changed_payload_is_new_row() {
    let db = open_db();
    let run_id = open_run(&db);
    record_raw(&db, run_id, "corn/production/2024-25", &payload()).unwrap();
    let revised = serde_json::json!({"commodity": "corn", "attribute": "production", "value": "15,100"});
    let outcome = record_raw(&db, run_id, "corn/production/2024-25", &revised).unwrap();
    assert_eq!(outcome.action, UpsertAction::Inserted);
    assert_eq!(count(&db, "SELECT COUNT(*) FROM gr_meta.raw_records"), 2);
}

#[test]
fn terminal_run_rejected() {
    let db = open_db();
    let run_id = open_run(&db);
    close(&db, run_id, &RunCompletion::from_counters(RunCounters::default())).unwrap();
    let err = record_raw(&db, run_id, "k", &payload()).unwrap_err();
    assert!(matches!(err, MetaError::TerminalRunViolation { .. }));
    assert_eq!(count(&db, "SELECT COUNT(*) FROM gr_meta.raw_records"), 0);
}

#[test]
fn empty_key_rejected() {
    let db = open_db();
    let run_id = open_run(&db);
    assert!(matches!(
        record_raw(&db, run_id, " ", &payload()).unwrap_err(),
        MetaError::InvalidInput(_)
    ));
}

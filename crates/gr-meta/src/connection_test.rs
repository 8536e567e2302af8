//! Tests for MetaDb connection, migration, DDL, constraints and retries.

use crate::error::MetaError;
use crate::test_fixtures::count;
use crate::MetaDb;
use gr_core::config::{LineageConfig, StoreConfig};
use std::cell::Cell;

fn exec(db: &MetaDb, sql: &str) {
    db.conn().execute(sql, []).unwrap();
}

fn expect_err(db: &MetaDb, sql: &str) {
    assert!(
        db.conn().execute(sql, []).is_err(),
        "Expected error for: {sql}"
    );
}

// ── Connection & migration ─────────────────────────────────────────────

#[test]
fn open_memory_succeeds() {
    let db = MetaDb::open_memory().unwrap();
    assert!(count(&db, "SELECT COUNT(*) FROM gr_meta.schema_version") >= 1);
}

#[test]
fn open_file_creates_database_and_parent_dir() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("target").join("granary.duckdb");
    assert!(!path.exists());
    let _db = MetaDb::open(&path).unwrap();
    assert!(path.exists());
}

#[test]
fn open_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("granary.duckdb");
    {
        let _db1 = MetaDb::open(&path).unwrap();
    }
    let db2 = MetaDb::open(&path).unwrap();
    let migration_count = crate::ddl::MIGRATIONS.len() as i64;
    assert_eq!(
        count(&db2, "SELECT COUNT(*) FROM gr_meta.schema_version"),
        migration_count,
        "schema_version should have one row per migration"
    );
}

#[test]
fn schema_version_recorded() {
    let db = MetaDb::open_memory().unwrap();
    let version = crate::migration::current_version(db.conn()).unwrap();
    let expected = crate::ddl::MIGRATIONS.last().unwrap().version;
    assert_eq!(version, expected);
}

#[test]
fn all_tables_and_views_exist() {
    let db = MetaDb::open_memory().unwrap();
    let expected = [
        "schema_version",
        "sources",
        "entities",
        "ingest_runs",
        "ingest_run_annotations",
        "raw_records",
        "observations",
        "validation_status",
        "validation_check_history",
        "lineage_nodes",
        "lineage_edges",
        "current_observations",
        "promotable_observations",
        "v_ingest_runs",
    ];
    for table in &expected {
        let sql = format!(
            "SELECT COUNT(*) FROM information_schema.tables \
             WHERE table_schema = 'gr_meta' AND table_name = '{table}'"
        );
        assert_eq!(count(&db, &sql), 1, "gr_meta.{table} should exist");
    }
}

// ── Transaction helper ─────────────────────────────────────────────────

#[test]
fn transaction_commits_on_success() {
    let db = MetaDb::open_memory().unwrap();
    db.transaction(|conn| {
        conn.execute(
            "INSERT INTO gr_meta.sources (source_code, name, registered_at, updated_at) \
             VALUES ('tx_ok', 'ok', now()::TIMESTAMP, now()::TIMESTAMP)",
            [],
        )?;
        Ok(())
    })
    .unwrap();
    assert_eq!(
        count(&db, "SELECT COUNT(*) FROM gr_meta.sources WHERE source_code = 'tx_ok'"),
        1
    );
}

#[test]
fn transaction_rolls_back_on_error() {
    let db = MetaDb::open_memory().unwrap();
    let result: crate::MetaResult<()> = db.transaction(|conn| {
        conn.execute(
            "INSERT INTO gr_meta.sources (source_code, name, registered_at, updated_at) \
             VALUES ('tx_fail', 'fail', now()::TIMESTAMP, now()::TIMESTAMP)",
            [],
        )?;
        Err(MetaError::QueryError("intentional failure".into()))
    });
    assert!(result.is_err());
    assert_eq!(
        count(&db, "SELECT COUNT(*) FROM gr_meta.sources WHERE source_code = 'tx_fail'"),
        0,
        "Row should have been rolled back"
    );
}

// ── Natural keys & CHECK constraints ───────────────────────────────────

#[test]
fn entity_natural_key_enforced() {
    let db = MetaDb::open_memory().unwrap();
    let insert = "INSERT INTO gr_meta.entities (source_code, local_key, created_at, updated_at) \
                  VALUES ('wasde', 'corn', now()::TIMESTAMP, now()::TIMESTAMP)";
    exec(&db, insert);
    let err = db.conn().execute(insert, []).unwrap_err();
    assert!(MetaError::from(err).is_duplicate_key());
}

#[test]
fn observation_natural_key_enforced() {
    let db = MetaDb::open_memory().unwrap();
    let insert = "INSERT INTO gr_meta.observations \
                  (entity_id, observed_at, revision, value, run_id, created_at, updated_at) \
                  VALUES (1, TIMESTAMP '2024-09-01 00:00:00', 0, 14900, 1, now()::TIMESTAMP, now()::TIMESTAMP)";
    exec(&db, insert);
    expect_err(&db, insert);
    exec(
        &db,
        "INSERT INTO gr_meta.observations \
         (entity_id, observed_at, revision, value, run_id, created_at, updated_at) \
         VALUES (1, TIMESTAMP '2024-09-01 00:00:00', 1, 15100, 1, now()::TIMESTAMP, now()::TIMESTAMP)",
    );
}

#[test]
fn check_run_status_values() {
    let db = MetaDb::open_memory().unwrap();
    expect_err(
        &db,
        "INSERT INTO gr_meta.ingest_runs (run_key, source_code, job_kind, agent_id, status, started_at) \
         VALUES ('k1', 'wasde', 'monthly', 'a', 'DONE', now()::TIMESTAMP)",
    );
}

#[test]
fn check_running_runs_have_no_finish_time() {
    let db = MetaDb::open_memory().unwrap();
    expect_err(
        &db,
        "INSERT INTO gr_meta.ingest_runs \
         (run_key, source_code, job_kind, agent_id, status, started_at, finished_at) \
         VALUES ('k2', 'wasde', 'monthly', 'a', 'RUNNING', now()::TIMESTAMP, now()::TIMESTAMP)",
    );
    expect_err(
        &db,
        "INSERT INTO gr_meta.ingest_runs (run_key, source_code, job_kind, agent_id, status, started_at) \
         VALUES ('k3', 'wasde', 'monthly', 'a', 'SUCCESS', now()::TIMESTAMP)",
    );
}

#[test]
fn check_negative_revision_rejected() {
    let db = MetaDb::open_memory().unwrap();
    expect_err(
        &db,
        "INSERT INTO gr_meta.observations \
         (entity_id, observed_at, revision, value, run_id, created_at, updated_at) \
         VALUES (1, TIMESTAMP '2024-09-01 00:00:00', -1, 1, 1, now()::TIMESTAMP, now()::TIMESTAMP)",
    );
}

#[test]
fn check_gate_status_and_relationship_values() {
    let db = MetaDb::open_memory().unwrap();
    expect_err(
        &db,
        "INSERT INTO gr_meta.validation_status \
         (entity_type, entity_id, source_code, status, created_at, updated_at) \
         VALUES ('ingest_run', '1', 'wasde', 'APPROVED', now()::TIMESTAMP, now()::TIMESTAMP)",
    );
    expect_err(
        &db,
        "INSERT INTO gr_meta.lineage_edges (source_node_id, target_node_id, relationship, recorded_at) \
         VALUES (1, 2, 'FEEDS', now()::TIMESTAMP)",
    );
}

// ── Settings & retry loop ──────────────────────────────────────────────

#[test]
fn with_settings_and_clone_carry_config() {
    let store = StoreConfig {
        max_conflict_retries: 3,
        retry_backoff_ms: 0,
    };
    let lineage = LineageConfig {
        default_max_depth: 4,
        max_depth_limit: 6,
    };
    let db = MetaDb::open_memory().unwrap().with_settings(store, lineage);
    let clone = db.try_clone().unwrap();
    assert_eq!(clone.store_config().max_conflict_retries, 3);
    assert_eq!(clone.lineage_config().default_max_depth, 4);
}

#[test]
fn cloned_handle_sees_same_database() {
    let db = MetaDb::open_memory().unwrap();
    exec(
        &db,
        "INSERT INTO gr_meta.sources (source_code, name, registered_at, updated_at) \
         VALUES ('shared', 's', now()::TIMESTAMP, now()::TIMESTAMP)",
    );
    let clone = db.try_clone().unwrap();
    assert_eq!(count(&clone, "SELECT COUNT(*) FROM gr_meta.sources"), 1);
}

#[test]
fn retry_loop_returns_settled_value() {
    let db = MetaDb::open_memory().unwrap().with_settings(
        StoreConfig {
            max_conflict_retries: 5,
            retry_backoff_ms: 0,
        },
        LineageConfig::default(),
    );
    let attempts = Cell::new(0);
    let value = db
        .with_conflict_retry("test", |_| {
            attempts.set(attempts.get() + 1);
            Ok((attempts.get() == 3).then_some("settled"))
        })
        .unwrap();
    assert_eq!(value, "settled");
    assert_eq!(attempts.get(), 3);
}

#[test]
fn retry_loop_gives_up() {
    let db = MetaDb::open_memory().unwrap().with_settings(
        StoreConfig {
            max_conflict_retries: 2,
            retry_backoff_ms: 0,
        },
        LineageConfig::default(),
    );
    let err = db
        .with_conflict_retry::<(), _>("never_settles", |_| Ok(None))
        .unwrap_err();
    assert!(matches!(
        err,
        MetaError::ConflictRetriesExhausted { attempts: 2, .. }
    ));
}

#[test]
fn retry_loop_passes_hard_errors_through() {
    let db = MetaDb::open_memory().unwrap();
    let attempts = Cell::new(0);
    let err = db
        .with_conflict_retry::<(), _>("hard", |_| {
            attempts.set(attempts.get() + 1);
            Err(MetaError::InvalidInput("nope".into()))
        })
        .unwrap_err();
    assert!(matches!(err, MetaError::InvalidInput(_)));
    assert_eq!(attempts.get(), 1);
}

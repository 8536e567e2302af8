//! Schema migration runner for the store.
//!
//! Tracks applied migration versions in `gr_meta.schema_version` and runs any
//! unapplied migrations on each open.

use crate::ddl::MIGRATIONS;
use crate::error::{MetaError, MetaResult};
use duckdb::Connection;

/// Ensure the `gr_meta` schema and `schema_version` table exist.
fn ensure_version_table(conn: &Connection) -> MetaResult<()> {
    conn.execute_batch(
        "CREATE SCHEMA IF NOT EXISTS gr_meta;
         CREATE TABLE IF NOT EXISTS gr_meta.schema_version (
             version    INTEGER NOT NULL,
             applied_at TIMESTAMP NOT NULL DEFAULT now()
         );",
    )
    .map_err(|e| {
        MetaError::MigrationError(format!("failed to create schema_version table: {e}"))
    })?;
    Ok(())
}

/// Highest applied migration version, or 0 if none.
pub fn current_version(conn: &Connection) -> MetaResult<i32> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM gr_meta.schema_version",
        [],
        |row| row.get(0),
    )
    .map_err(|e| MetaError::MigrationError(format!("failed to read schema version: {e}")))
}

/// Run all unapplied migrations against `conn`.
///
/// Each migration and its `schema_version` row are applied in one
/// transaction, so a failed migration leaves no partial schema behind.
pub fn run_migrations(conn: &Connection) -> MetaResult<()> {
    ensure_version_table(conn)?;
    let current = current_version(conn)?;

    for migration in MIGRATIONS {
        if migration.version <= current {
            continue;
        }
        log::debug!("Applying store migration v{:03}", migration.version);

        let script = format!(
            "BEGIN TRANSACTION;\n{}\nINSERT INTO gr_meta.schema_version (version) VALUES ({});\nCOMMIT;",
            migration.sql, migration.version
        );
        if let Err(e) = conn.execute_batch(&script) {
            let _ = conn.execute_batch("ROLLBACK");
            return Err(MetaError::MigrationError(format!(
                "migration v{:03} failed: {e}",
                migration.version
            )));
        }
    }
    Ok(())
}

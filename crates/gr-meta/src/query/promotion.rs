//! Read path for curated-tier refresh: current observations behind a
//! cleared gate, and nothing else.

use crate::error::MetaResult;
use crate::facts::{query_observations, Observation, OBSERVATION_COLUMNS};
use duckdb::Connection;

/// Current observations of `entity_id` whose producing run's gate is
/// `PASSED` or `PASSED_WITH_WARNINGS`, ordered by time.
pub fn promotable_observations(conn: &Connection, entity_id: i64) -> MetaResult<Vec<Observation>> {
    let sql = format!(
        "SELECT {OBSERVATION_COLUMNS} FROM gr_meta.promotable_observations
         WHERE entity_id = ?
         ORDER BY observed_at"
    );
    query_observations(conn, &sql, duckdb::params![entity_id], "promotable_observations")
}

/// Current observations produced by `run_id`, if that run's gate is cleared.
pub fn promotable_for_run(conn: &Connection, run_id: i64) -> MetaResult<Vec<Observation>> {
    let sql = format!(
        "SELECT {OBSERVATION_COLUMNS} FROM gr_meta.promotable_observations
         WHERE run_id = ?
         ORDER BY entity_id, observed_at"
    );
    query_observations(conn, &sql, duckdb::params![run_id], "promotable_for_run")
}

#[cfg(test)]
#[path = "promotion_test.rs"]
mod tests;

//! Store connection wrapper.
//!
//! [`MetaDb`] owns a DuckDB [`Connection`] and provides helpers for opening,
//! migrating, and transacting against the store, plus the bounded retry loop
//! every contended write path runs inside.

use crate::error::{MetaError, MetaResult};
use crate::migration::run_migrations;
use duckdb::Connection;
use gr_core::config::{LineageConfig, StoreConfig};
use std::path::Path;
use std::time::Duration;

/// Wrapper around a DuckDB connection to the Granary store.
///
/// One `MetaDb` is one connection. Concurrent collectors each hold their own
/// handle, obtained with [`MetaDb::try_clone`], against the same database.
pub struct MetaDb {
    conn: Connection,
    store: StoreConfig,
    lineage: LineageConfig,
}

impl MetaDb {
    /// Open (or create) the store at `path` and run pending migrations.
    pub fn open(path: &Path) -> MetaResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                MetaError::ConnectionError(format!("{e}: {}", parent.display()))
            })?;
        }
        let conn = Connection::open(path)
            .map_err(|e| MetaError::ConnectionError(format!("{e}: {}", path.display())))?;
        run_migrations(&conn)?;
        Ok(Self::wrap(conn))
    }

    /// Create an in-memory store with all migrations applied.
    pub fn open_memory() -> MetaResult<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| MetaError::ConnectionError(e.to_string()))?;
        run_migrations(&conn)?;
        Ok(Self::wrap(conn))
    }

    fn wrap(conn: Connection) -> Self {
        Self {
            conn,
            store: StoreConfig::default(),
            lineage: LineageConfig::default(),
        }
    }

    /// Replace the write-path and lineage settings.
    pub fn with_settings(mut self, store: StoreConfig, lineage: LineageConfig) -> Self {
        self.store = store;
        self.lineage = lineage;
        self
    }

    /// A second connection to the same database, carrying the same settings.
    ///
    /// Handles are `Send`; give one to each worker thread.
    pub fn try_clone(&self) -> MetaResult<Self> {
        let conn = self
            .conn
            .try_clone()
            .map_err(|e| MetaError::ConnectionError(format!("clone failed: {e}")))?;
        Ok(Self {
            conn,
            store: self.store,
            lineage: self.lineage,
        })
    }

    /// Borrow the underlying DuckDB connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn store_config(&self) -> &StoreConfig {
        &self.store
    }

    pub fn lineage_config(&self) -> &LineageConfig {
        &self.lineage
    }

    /// Execute `body` within a `BEGIN` / `COMMIT` transaction, rolling back on
    /// error.
    ///
    /// A failed COMMIT surfaces as [`MetaError::Commit`] so the caller can
    /// tell a lost write-write race from a hard failure.
    pub fn transaction<F, T>(&self, body: F) -> MetaResult<T>
    where
        F: FnOnce(&Connection) -> MetaResult<T>,
    {
        self.conn
            .execute_batch("BEGIN TRANSACTION")
            .map_err(|e| MetaError::TransactionError(format!("BEGIN failed: {e}")))?;

        let result = body(&self.conn);

        match &result {
            Ok(_) => {
                if let Err(commit_err) = self.conn.execute_batch("COMMIT") {
                    let _ = self.conn.execute_batch("ROLLBACK");
                    return Err(MetaError::Commit(commit_err));
                }
            }
            Err(_) => {
                let _ = self.conn.execute_batch("ROLLBACK");
            }
        }
        result
    }

    /// Run `attempt` until it settles.
    ///
    /// `attempt` returns `Ok(Some(value))` when done and `Ok(None)` when it
    /// observed a concurrent writer and must re-read. Duplicate-key and
    /// transaction-conflict errors are retried the same way. Any other error
    /// is returned as is. After `max_conflict_retries` unsettled attempts the
    /// call fails with [`MetaError::ConflictRetriesExhausted`].
    pub(crate) fn with_conflict_retry<T, F>(&self, operation: &str, mut attempt: F) -> MetaResult<T>
    where
        F: FnMut(&MetaDb) -> MetaResult<Option<T>>,
    {
        let max = self.store.max_conflict_retries.max(1);
        for n in 1..=max {
            match attempt(self) {
                Ok(Some(value)) => return Ok(value),
                Ok(None) => {
                    log::debug!("{operation}: concurrent writer observed (attempt {n}/{max})");
                }
                Err(e) if e.is_retryable() => {
                    log::debug!("{operation}: retrying after conflict (attempt {n}/{max}): {e}");
                }
                Err(e) => return Err(e),
            }
            if n < max {
                std::thread::sleep(Duration::from_millis(
                    self.store.retry_backoff_ms.saturating_mul(u64::from(n)),
                ));
            }
        }
        log::warn!("{operation}: giving up after {max} attempts");
        Err(MetaError::ConflictRetriesExhausted {
            operation: operation.to_string(),
            attempts: max,
        })
    }
}

#[cfg(test)]
#[path = "connection_test.rs"]
mod tests;

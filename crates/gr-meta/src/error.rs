//! Error types for the Granary store.

use gr_core::CoreError;
use thiserror::Error;

/// Store errors.
#[derive(Error, Debug)]
pub enum MetaError {
    /// Failed to open or create the database (M001).
    #[error("[M001] Database connection failed: {0}")]
    ConnectionError(String),

    /// Schema migration failed (M002).
    #[error("[M002] Database migration failed: {0}")]
    MigrationError(String),

    /// Ad-hoc SQL execution error (M003).
    #[error("[M003] Query failed: {0}")]
    QueryError(String),

    /// BEGIN failed (M004).
    #[error("[M004] Transaction failed: {0}")]
    TransactionError(String),

    /// COMMIT failed; the driver error is kept so conflicts can be classified (M005).
    #[error("[M005] Commit failed: {0}")]
    Commit(#[source] duckdb::Error),

    /// Driver error with an operation label (M006).
    #[error("[M006] {context}: {source}")]
    Driver {
        context: String,
        #[source]
        source: duckdb::Error,
    },

    /// DuckDB driver error with preserved source chain (M007).
    #[error("[M007] DuckDB error: {0}")]
    DuckDb(#[source] duckdb::Error),

    /// Domain-level error from gr-core (M008).
    #[error("[M008] {0}")]
    Core(CoreError),

    /// A stored value could not be decoded (M009).
    #[error("[M009] Corrupt row in {table}: {message}")]
    CorruptRow { table: &'static str, message: String },

    /// The source code is not registered (M010).
    #[error("[M010] Unknown source '{code}'")]
    UnknownSource { code: String },

    /// No entity with this id (M011).
    #[error("[M011] Entity {entity_id} not found")]
    EntityNotFound { entity_id: i64 },

    /// No ingest run with this id (M012).
    #[error("[M012] Ingest run {run_id} not found")]
    RunNotFound { run_id: i64 },

    /// A write referenced a run that is no longer RUNNING (M013).
    #[error("[M013] Ingest run {run_id} is {status}; writes are rejected")]
    TerminalRunViolation { run_id: i64, status: String },

    /// A state machine transition not in the transition table (M014).
    #[error("[M014] Illegal {machine} transition: {from} -> {to}")]
    InvalidTransition {
        machine: &'static str,
        from: String,
        to: String,
    },

    /// No gate row under this key (M015).
    #[error("[M015] No validation status for {key}")]
    GateNotFound { key: String },

    /// Caller supplied an unusable argument (M016).
    #[error("[M016] Invalid input: {0}")]
    InvalidInput(String),

    /// A contended natural key did not settle within the retry budget (M017).
    #[error("[M017] {operation} did not settle after {attempts} attempts")]
    ConflictRetriesExhausted { operation: String, attempts: u32 },
}

/// Result type alias for [`MetaError`].
pub type MetaResult<T> = Result<T, MetaError>;

impl From<duckdb::Error> for MetaError {
    fn from(err: duckdb::Error) -> Self {
        MetaError::DuckDb(err)
    }
}

impl From<CoreError> for MetaError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::IllegalTransition { machine, from, to } => {
                MetaError::InvalidTransition { machine, from, to }
            }
            other => MetaError::Core(other),
        }
    }
}

impl From<serde_json::Error> for MetaError {
    fn from(err: serde_json::Error) -> Self {
        MetaError::Core(CoreError::Json(err))
    }
}

/// How a driver failure should be handled by the write paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DriverErrorKind {
    /// A unique or primary key already holds this natural key.
    DuplicateKey,
    /// Write-write or transaction conflict with a concurrent writer.
    TransientConflict,
    Other,
}

/// Classify a DuckDB error from its message text.
///
/// `duckdb::Error` does not expose structured constraint variants, so the
/// message is the only signal. Duplicate-key checks run first because DuckDB
/// reports some constraint violations with "conflict" in the text.
pub(crate) fn classify(err: &duckdb::Error) -> DriverErrorKind {
    let msg = err.to_string().to_ascii_lowercase();
    if msg.contains("duplicate key")
        || (msg.contains("constraint") && msg.contains("violat") && msg.contains("unique"))
        || msg.contains("primary key constraint")
    {
        DriverErrorKind::DuplicateKey
    } else if msg.contains("conflict") || msg.contains("transactioncontext") {
        DriverErrorKind::TransientConflict
    } else {
        DriverErrorKind::Other
    }
}

impl MetaError {
    fn driver_kind(&self) -> DriverErrorKind {
        match self {
            MetaError::DuckDb(e) | MetaError::Commit(e) | MetaError::Driver { source: e, .. } => {
                classify(e)
            }
            _ => DriverErrorKind::Other,
        }
    }

    /// The write collided with an existing natural key.
    pub fn is_duplicate_key(&self) -> bool {
        self.driver_kind() == DriverErrorKind::DuplicateKey
    }

    /// The write lost a race with a concurrent transaction and may be retried.
    pub fn is_transient_conflict(&self) -> bool {
        self.driver_kind() == DriverErrorKind::TransientConflict
    }

    /// Either of the above: resolved internally, never surfaced.
    pub fn is_retryable(&self) -> bool {
        self.driver_kind() != DriverErrorKind::Other
    }
}

/// Attach an operation label to raw driver results.
pub trait MetaResultExt<T> {
    fn db_context(self, what: &str) -> MetaResult<T>;
}

impl<T> MetaResultExt<T> for Result<T, duckdb::Error> {
    fn db_context(self, what: &str) -> MetaResult<T> {
        self.map_err(|source| MetaError::Driver {
            context: what.to_string(),
            source,
        })
    }
}

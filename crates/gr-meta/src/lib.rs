//! DuckDB-backed store for Granary.
//!
//! Hosts the five engine components against one `gr_meta` schema:
//!
//! - [`registry`]: series identity, created exactly once per `(source, local_key)`
//! - [`runs`]: ingest run lifecycle and the open-run guard for writes
//! - [`facts`]: idempotent observation upserts and revisions (plus [`raw`])
//! - [`gate`]: validation status per gate key
//! - [`lineage`]: provenance edges and bounded traversal
//!
//! Every operation is a short transaction on its own connection; concurrent
//! processes coordinate only through natural-key constraints.

pub mod connection;
pub mod ddl;
pub mod error;
pub mod facts;
pub mod gate;
pub mod lineage;
pub mod migration;
pub mod query;
pub mod raw;
pub mod registry;
pub(crate) mod row_helpers;
pub mod runs;
pub mod sources;

pub use connection::MetaDb;
pub use error::{MetaError, MetaResult};
pub use facts::{BatchReport, FactWrite, Observation, UpsertOutcome};
pub use gate::{GateFilter, GateRecord};
pub use registry::{Entity, SeriesAttributes};
pub use runs::{CloseOutcome, IngestRun, RunCompletion};

#[cfg(test)]
pub(crate) mod test_fixtures;

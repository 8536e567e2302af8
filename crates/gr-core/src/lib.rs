//! gr-core - Core library for Granary
//!
//! Storage-independent domain types shared by the store and the CLI:
//! identifiers, the ingest-run and validation-gate state machines, check
//! aggregation, observation flags, the lineage graph, and configuration.

pub mod checksum;
pub mod config;
pub mod error;
pub mod gate;
pub mod lineage;
pub mod names;
mod newtype_string;
pub mod observation;
pub mod run_state;

pub use checksum::{compute_checksum, json_checksum};
pub use config::Config;
pub use error::{CoreError, CoreResult};
pub use gate::{aggregate, CheckResult, GateDecision, GateEntityType, GateKey, GateStatus, Severity};
pub use lineage::{
    LineageEdge, LineageGraph, LineageNode, Relationship, TraceDirection, TracedNode,
};
pub use names::{AgentId, CheckerId, JobKind, LocalKey, SourceCode};
pub use observation::{QualityFlag, UpsertAction, ValidationFlag};
pub use run_state::{RunCounters, RunStatus};

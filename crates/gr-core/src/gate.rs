//! Validation gate domain: statuses, check outcomes and aggregation.
//!
//! A gate row is keyed by `(entity_type, entity_id, source)`. Checkers feed
//! individual [`CheckResult`]s; [`aggregate`] folds them into a single
//! [`GateStatus`]. Downstream promotion treats anything other than
//! `PASSED` / `PASSED_WITH_WARNINGS` as not ready.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{CoreError, CoreResult};
use crate::names::SourceCode;

/// Status of a validation gate row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GateStatus {
    Pending,
    InProgress,
    Passed,
    Failed,
    PassedWithWarnings,
    /// Manual hold; only [`GateDecision`] via approval clears it
    RequiresReview,
    /// Replaced by a newer evaluation target; terminal
    Superseded,
}

impl GateStatus {
    pub const ALL: [GateStatus; 7] = [
        GateStatus::Pending,
        GateStatus::InProgress,
        GateStatus::Passed,
        GateStatus::Failed,
        GateStatus::PassedWithWarnings,
        GateStatus::RequiresReview,
        GateStatus::Superseded,
    ];

    /// Persisted string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            GateStatus::Pending => "PENDING",
            GateStatus::InProgress => "IN_PROGRESS",
            GateStatus::Passed => "PASSED",
            GateStatus::Failed => "FAILED",
            GateStatus::PassedWithWarnings => "PASSED_WITH_WARNINGS",
            GateStatus::RequiresReview => "REQUIRES_REVIEW",
            GateStatus::Superseded => "SUPERSEDED",
        }
    }

    /// Whether data behind this status may be promoted to the curated tier.
    pub fn is_ready(&self) -> bool {
        matches!(self, GateStatus::Passed | GateStatus::PassedWithWarnings)
    }

    /// The gate transition table.
    ///
    /// Same-status transitions are allowed for evaluated states so that a
    /// re-evaluation with an unchanged outcome updates the row in place.
    /// `REQUIRES_REVIEW -> PASSED | FAILED` is listed here but reachable only
    /// through approval; callers enforce that distinction.
    pub fn can_transition_to(&self, next: GateStatus) -> bool {
        use GateStatus::*;
        match self {
            Pending => !matches!(next, Pending),
            InProgress => !matches!(next, Pending),
            Passed | Failed | PassedWithWarnings => !matches!(next, Pending),
            RequiresReview => matches!(next, Passed | Failed | Superseded),
            Superseded => false,
        }
    }

    /// Validate a transition against the table.
    pub fn transition(self, next: GateStatus) -> CoreResult<GateStatus> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(CoreError::IllegalTransition {
                machine: "validation gate",
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }
}

impl std::fmt::Display for GateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GateStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        GateStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| CoreError::UnknownVariant {
                kind: "gate status",
                value: s.to_string(),
            })
    }
}

/// Outcome a human reviewer may assign to a held gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GateDecision {
    Passed,
    Failed,
}

impl From<GateDecision> for GateStatus {
    fn from(decision: GateDecision) -> Self {
        match decision {
            GateDecision::Passed => GateStatus::Passed,
            GateDecision::Failed => GateStatus::Failed,
        }
    }
}

/// Severity of an individual check
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
        }
    }

    /// Whether a failure at this severity blocks promotion.
    pub fn is_blocking(&self) -> bool {
        matches!(self, Severity::Error | Severity::Critical)
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "info" => Ok(Severity::Info),
            "warning" | "warn" => Ok(Severity::Warning),
            "error" => Ok(Severity::Error),
            "critical" => Ok(Severity::Critical),
            _ => Err(CoreError::UnknownVariant {
                kind: "severity",
                value: s.to_string(),
            }),
        }
    }
}

/// One check outcome reported by a checker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    /// Check name (e.g. `row_count_nonzero`)
    pub name: String,
    pub severity: Severity,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Free-form structured context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
}

impl CheckResult {
    /// A passing check.
    pub fn pass(name: impl Into<String>, severity: Severity) -> Self {
        Self {
            name: name.into(),
            severity,
            passed: true,
            message: None,
            detail: None,
        }
    }

    /// A failing check with a message.
    pub fn fail(name: impl Into<String>, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            severity,
            passed: false,
            message: Some(message.into()),
            detail: None,
        }
    }
}

/// Fold check outcomes into a gate status.
///
/// - any failing `error`/`critical` check: `FAILED`
/// - otherwise any failing `warning` check: `PASSED_WITH_WARNINGS`
/// - otherwise: `PASSED` (failing `info` checks are advisory)
pub fn aggregate(results: &[CheckResult]) -> GateStatus {
    let mut warned = false;
    for result in results.iter().filter(|r| !r.passed) {
        if result.severity.is_blocking() {
            return GateStatus::Failed;
        }
        if result.severity == Severity::Warning {
            warned = true;
        }
    }
    if warned {
        GateStatus::PassedWithWarnings
    } else {
        GateStatus::Passed
    }
}

/// What a gate row is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateEntityType {
    /// One ingest run, keyed by its `run_id`
    IngestRun,
    /// A logical release of a source (e.g. one monthly report)
    Release,
    /// One series, keyed by its `entity_id`
    Series,
    /// A named table or view
    Dataset,
}

impl GateEntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GateEntityType::IngestRun => "ingest_run",
            GateEntityType::Release => "release",
            GateEntityType::Series => "series",
            GateEntityType::Dataset => "dataset",
        }
    }
}

impl std::fmt::Display for GateEntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GateEntityType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ingest_run" | "run" => Ok(GateEntityType::IngestRun),
            "release" => Ok(GateEntityType::Release),
            "series" => Ok(GateEntityType::Series),
            "dataset" => Ok(GateEntityType::Dataset),
            _ => Err(CoreError::UnknownVariant {
                kind: "gate entity type",
                value: s.to_string(),
            }),
        }
    }
}

/// Natural key of a gate row
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GateKey {
    pub entity_type: GateEntityType,
    pub entity_id: String,
    pub source: SourceCode,
}

impl GateKey {
    pub fn new(entity_type: GateEntityType, entity_id: impl Into<String>, source: SourceCode) -> Self {
        Self {
            entity_type,
            entity_id: entity_id.into(),
            source,
        }
    }

    /// Gate key for an ingest run.
    pub fn for_run(run_id: i64, source: SourceCode) -> Self {
        Self::new(GateEntityType::IngestRun, run_id.to_string(), source)
    }
}

impl std::fmt::Display for GateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}@{}", self.entity_type, self.entity_id, self.source)
    }
}

#[cfg(test)]
#[path = "gate_test.rs"]
mod tests;

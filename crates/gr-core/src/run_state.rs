//! Ingest run state machine and counters.
//!
//! A run is created `RUNNING` and makes exactly one transition into a
//! terminal status. The transition table is closed: anything not listed in
//! [`RunStatus::can_transition_to`] is rejected.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{CoreError, CoreResult};

/// Status of an ingest run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    /// Run is open and accepting writes
    Running,
    /// Every fetched record was processed
    Success,
    /// Some, but not all, records failed
    Partial,
    /// The run produced no usable output
    Failed,
    /// The run was terminated externally
    Cancelled,
}

impl RunStatus {
    /// All statuses, in declaration order.
    pub const ALL: [RunStatus; 5] = [
        RunStatus::Running,
        RunStatus::Success,
        RunStatus::Partial,
        RunStatus::Failed,
        RunStatus::Cancelled,
    ];

    /// Persisted string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "RUNNING",
            RunStatus::Success => "SUCCESS",
            RunStatus::Partial => "PARTIAL",
            RunStatus::Failed => "FAILED",
            RunStatus::Cancelled => "CANCELLED",
        }
    }

    /// Whether the run has reached a terminal status.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }

    /// The run transition table.
    pub fn can_transition_to(&self, next: RunStatus) -> bool {
        matches!(
            (self, next),
            (
                RunStatus::Running,
                RunStatus::Success | RunStatus::Partial | RunStatus::Failed | RunStatus::Cancelled
            )
        )
    }

    /// Validate a transition against the table.
    pub fn transition(self, next: RunStatus) -> CoreResult<RunStatus> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(CoreError::IllegalTransition {
                machine: "ingest run",
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RunStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| CoreError::UnknownVariant {
                kind: "run status",
                value: s.to_string(),
            })
    }
}

/// Record counters reported when a run is closed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounters {
    /// Records fetched from the source
    pub fetched: u64,
    /// Observations inserted
    pub inserted: u64,
    /// Observations overwritten in place
    pub updated: u64,
    /// Records that could not be processed
    pub failed: u64,
}

impl RunCounters {
    /// Derive the terminal status these counters describe.
    ///
    /// - no failures: `SUCCESS`
    /// - `0 < failed < fetched`: `PARTIAL`
    /// - everything failed: `FAILED`
    ///
    /// A run that fetched nothing and failed nothing is an empty release and
    /// derives `SUCCESS`.
    pub fn derive_status(&self) -> RunStatus {
        if self.failed == 0 {
            RunStatus::Success
        } else if self.failed < self.fetched {
            RunStatus::Partial
        } else {
            RunStatus::Failed
        }
    }

    /// Whether a collector may close with `status` given these counters.
    ///
    /// - `SUCCESS`: no failures
    /// - `PARTIAL`: `0 < failed < fetched`
    /// - `FAILED`: everything failed, or nothing usable was written
    /// - `CANCELLED`: always
    pub fn admits(&self, status: RunStatus) -> bool {
        match status {
            RunStatus::Running => false,
            RunStatus::Success => self.failed == 0,
            RunStatus::Partial => self.failed > 0 && self.failed < self.fetched,
            RunStatus::Failed => {
                (self.failed > 0 && self.failed >= self.fetched)
                    || self.inserted + self.updated == 0
            }
            RunStatus::Cancelled => true,
        }
    }

    /// Add another set of counters to this one.
    pub fn absorb(&mut self, other: RunCounters) {
        self.fetched += other.fetched;
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.failed += other.failed;
    }
}

#[cfg(test)]
#[path = "run_state_test.rs"]
mod tests;

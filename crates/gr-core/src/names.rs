//! Strongly-typed identifiers shared by collectors, checkers and the store.

use crate::newtype_string::define_newtype_string;

define_newtype_string! {
    /// Code of a registered external data source (e.g. `wasde`, `usda_fas`).
    pub struct SourceCode => "source code";
}

define_newtype_string! {
    /// Source-local key of a series, unique within its source.
    pub struct LocalKey => "local key";
}

define_newtype_string! {
    /// Identity of the collector or checker process performing a write.
    pub struct AgentId => "agent id";
}

define_newtype_string! {
    /// Kind of collection job (e.g. `monthly_report`, `backfill`).
    pub struct JobKind => "job kind";
}

define_newtype_string! {
    /// Identity of a checker evaluating a gate key.
    pub struct CheckerId => "checker id";
}

#[cfg(test)]
#[path = "names_test.rs"]
mod tests;

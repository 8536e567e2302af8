//! CLI argument definitions using clap derive API

use clap::{Args, Parser, Subcommand, ValueEnum};
use gr_core::{
    GateDecision, GateEntityType, GateKey, GateStatus, LineageNode, Relationship, RunStatus,
    SourceCode,
};

/// Granary - ingestion lifecycle and lineage for agricultural data
#[derive(Parser, Debug)]
#[command(name = "gr")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Global options
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Global arguments available to all commands
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to the project directory holding granary.yml
    #[arg(short = 'p', long, global = true, default_value = ".")]
    pub project_dir: String,

    /// Override config file path
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Override the store path from the config
    #[arg(long, global = true, env = "GRANARY_DATABASE")]
    pub database: Option<String>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the store and register configured sources
    Init(InitArgs),

    /// Manage the source catalogue
    Source(SourceArgs),

    /// Inspect registered series and their observations
    Series(SeriesArgs),

    /// Open, close and inspect ingest runs
    Run(RunArgs),

    /// Record checks and manage validation gates
    Gate(GateArgs),

    /// Record and trace lineage edges
    Lineage(LineageArgs),

    /// Query the store directly
    Meta(MetaArgs),
}

/// Arguments for the init command
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Write a starter granary.yml with this name when none exists
    #[arg(long)]
    pub name: Option<String>,
}

// ── source ─────────────────────────────────────────────────────────────

/// Arguments for the source command
#[derive(Args, Debug)]
pub struct SourceArgs {
    #[command(subcommand)]
    pub command: SourceCommands,
}

/// Source subcommands
#[derive(Subcommand, Debug)]
pub enum SourceCommands {
    /// List registered sources
    List(ListArgs),

    /// Register a source, or refresh its description
    Add(SourceAddArgs),
}

/// Arguments shared by read-only listing commands
#[derive(Args, Debug)]
pub struct ListArgs {
    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

/// Arguments for `source add`
#[derive(Args, Debug)]
pub struct SourceAddArgs {
    /// Source code (e.g. wasde)
    pub code: SourceCode,

    /// Display name
    #[arg(long)]
    pub name: String,

    /// Free-form description
    #[arg(long)]
    pub description: Option<String>,
}

// ── series ─────────────────────────────────────────────────────────────

/// Arguments for the series command
#[derive(Args, Debug)]
pub struct SeriesArgs {
    #[command(subcommand)]
    pub command: SeriesCommands,
}

/// Series subcommands
#[derive(Subcommand, Debug)]
pub enum SeriesCommands {
    /// List the series of a source
    List(SeriesListArgs),

    /// Show a series and its current observations
    Show(SeriesShowArgs),

    /// Show every revision of one observation
    History(SeriesHistoryArgs),
}

/// Arguments for `series list`
#[derive(Args, Debug)]
pub struct SeriesListArgs {
    pub source: SourceCode,

    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

/// Arguments for `series show`
#[derive(Args, Debug)]
pub struct SeriesShowArgs {
    pub source: SourceCode,

    /// Source-local series key
    pub local_key: String,

    /// Only observations behind a cleared gate
    #[arg(long)]
    pub promotable: bool,

    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

/// Arguments for `series history`
#[derive(Args, Debug)]
pub struct SeriesHistoryArgs {
    pub source: SourceCode,

    /// Source-local series key
    pub local_key: String,

    /// Observation time (RFC 3339, or YYYY-MM-DD for midnight UTC)
    pub observed_at: String,

    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

// ── run ────────────────────────────────────────────────────────────────

/// Arguments for the run command
#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(subcommand)]
    pub command: RunCommands,
}

/// Run subcommands
#[derive(Subcommand, Debug)]
pub enum RunCommands {
    /// Open a run and print its id
    Open(RunOpenArgs),

    /// Close a run into a terminal status
    Close(RunCloseArgs),

    /// Cancel a run
    Cancel(RunCancelArgs),

    /// Show one run with its annotations
    Show(RunShowArgs),

    /// List recent runs
    List(RunListArgs),
}

/// Arguments for `run open`
#[derive(Args, Debug)]
pub struct RunOpenArgs {
    pub source: SourceCode,

    /// Job kind (e.g. monthly_report)
    #[arg(long, default_value = "manual")]
    pub job: String,

    /// Collector identity
    #[arg(long, env = "GRANARY_AGENT")]
    pub agent: String,

    /// Run parameters as a JSON object
    #[arg(long)]
    pub params: Option<String>,
}

/// Arguments for `run close`
#[derive(Args, Debug)]
pub struct RunCloseArgs {
    pub run_id: i64,

    /// Terminal status; derived from the counters when omitted
    #[arg(long)]
    pub status: Option<RunStatus>,

    #[arg(long, default_value_t = 0)]
    pub fetched: u64,

    #[arg(long, default_value_t = 0)]
    pub inserted: u64,

    #[arg(long, default_value_t = 0)]
    pub updated: u64,

    #[arg(long, default_value_t = 0)]
    pub failed: u64,

    /// Error detail as JSON
    #[arg(long)]
    pub error: Option<String>,

    /// Checksum of the fetched content
    #[arg(long)]
    pub checksum: Option<String>,
}

/// Arguments for `run cancel`
#[derive(Args, Debug)]
pub struct RunCancelArgs {
    pub run_id: i64,

    #[arg(long, default_value = "cancelled by operator")]
    pub reason: String,
}

/// Arguments for `run show`
#[derive(Args, Debug)]
pub struct RunShowArgs {
    pub run_id: i64,

    /// Print JSON instead of text
    #[arg(long)]
    pub json: bool,
}

/// Arguments for `run list`
#[derive(Args, Debug)]
pub struct RunListArgs {
    /// Only runs of this source
    #[arg(long)]
    pub source: Option<SourceCode>,

    #[arg(long, default_value_t = 20)]
    pub limit: usize,

    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

// ── gate ───────────────────────────────────────────────────────────────

/// Arguments for the gate command
#[derive(Args, Debug)]
pub struct GateArgs {
    #[command(subcommand)]
    pub command: GateCommands,
}

/// Gate subcommands
#[derive(Subcommand, Debug)]
pub enum GateCommands {
    /// Record check results and print the aggregate status
    Check(GateCheckArgs),

    /// Mark a gate key as being evaluated
    Begin(GateBeginArgs),

    /// Hold a gate key for human review
    Review(GateReviewArgs),

    /// Decide a held gate key
    Approve(GateApproveArgs),

    /// Retire a gate key
    Supersede(GateKeyArgs),

    /// Show a gate key
    Status(GateStatusArgs),

    /// List gate keys
    List(GateListArgs),

    /// Show the check history of a gate key
    History(GateHistoryArgs),
}

/// Identifies one gate row
#[derive(Args, Debug, Clone)]
pub struct GateKeyArgs {
    /// Entity id (the run id for ingest_run keys)
    pub entity_id: String,

    /// Source code of the gate key
    #[arg(long)]
    pub source: SourceCode,

    /// What the key is about
    #[arg(long, default_value = "ingest_run")]
    pub entity_type: GateEntityType,
}

impl GateKeyArgs {
    pub fn key(&self) -> GateKey {
        GateKey::new(self.entity_type, self.entity_id.clone(), self.source.clone())
    }
}

/// Arguments for `gate check`
#[derive(Args, Debug)]
pub struct GateCheckArgs {
    #[command(flatten)]
    pub key: GateKeyArgs,

    /// Checker identity
    #[arg(long, env = "GRANARY_CHECKER")]
    pub checker: String,

    /// JSON file holding an array of check results (`-` reads stdin)
    #[arg(long)]
    pub results: String,
}

/// Arguments for `gate begin`
#[derive(Args, Debug)]
pub struct GateBeginArgs {
    #[command(flatten)]
    pub key: GateKeyArgs,

    /// Checker identity
    #[arg(long, env = "GRANARY_CHECKER")]
    pub checker: String,
}

/// Arguments for `gate review`
#[derive(Args, Debug)]
pub struct GateReviewArgs {
    #[command(flatten)]
    pub key: GateKeyArgs,

    /// Why the key is held
    #[arg(long)]
    pub reason: String,
}

/// Arguments for `gate approve`
#[derive(Args, Debug)]
pub struct GateApproveArgs {
    #[command(flatten)]
    pub key: GateKeyArgs,

    /// Reviewer identity
    #[arg(long)]
    pub approver: String,

    /// Decision
    #[arg(long, value_enum)]
    pub decision: DecisionArg,
}

/// Reviewer decisions
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionArg {
    Passed,
    Failed,
}

impl From<DecisionArg> for GateDecision {
    fn from(arg: DecisionArg) -> Self {
        match arg {
            DecisionArg::Passed => GateDecision::Passed,
            DecisionArg::Failed => GateDecision::Failed,
        }
    }
}

/// Arguments for `gate status`
#[derive(Args, Debug)]
pub struct GateStatusArgs {
    #[command(flatten)]
    pub key: GateKeyArgs,

    /// Exit with code 1 unless the key is ready for promotion
    #[arg(long)]
    pub require_ready: bool,

    /// Print JSON instead of text
    #[arg(long)]
    pub json: bool,
}

/// Arguments for `gate list`
#[derive(Args, Debug)]
pub struct GateListArgs {
    #[arg(long)]
    pub entity_type: Option<GateEntityType>,

    #[arg(long)]
    pub source: Option<SourceCode>,

    #[arg(long)]
    pub status: Option<GateStatus>,

    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

/// Arguments for `gate history`
#[derive(Args, Debug)]
pub struct GateHistoryArgs {
    #[command(flatten)]
    pub key: GateKeyArgs,

    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

// ── lineage ────────────────────────────────────────────────────────────

/// Arguments for the lineage command
#[derive(Args, Debug)]
pub struct LineageArgs {
    #[command(subcommand)]
    pub command: LineageCommands,
}

/// Lineage subcommands
#[derive(Subcommand, Debug)]
pub enum LineageCommands {
    /// Record an edge `source -> target`
    Record(LineageRecordArgs),

    /// Nodes feeding a node
    Upstream(LineageTraceArgs),

    /// Nodes fed by a node
    Downstream(LineageTraceArgs),

    /// List recorded edges
    Edges(LineageEdgesArgs),
}

/// Arguments for `lineage record`
#[derive(Args, Debug)]
pub struct LineageRecordArgs {
    /// Source node (`schema.name` or `schema.name.column`)
    pub source: LineageNode,

    /// Target node (`schema.name` or `schema.name.column`)
    pub target: LineageNode,

    /// Edge type
    #[arg(long, default_value = "TRANSFORMS")]
    pub relationship: Relationship,

    /// Run that produced the edge
    #[arg(long)]
    pub run_id: Option<i64>,
}

/// Arguments for `lineage upstream` / `lineage downstream`
#[derive(Args, Debug)]
pub struct LineageTraceArgs {
    /// Start node (`schema.name` or `schema.name.column`)
    pub node: LineageNode,

    /// Maximum hops; capped by `lineage.max_depth_limit`
    #[arg(long)]
    pub depth: Option<usize>,

    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

/// Arguments for `lineage edges`
#[derive(Args, Debug)]
pub struct LineageEdgesArgs {
    /// Only edges touching this node
    #[arg(long)]
    pub node: Option<LineageNode>,

    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

// ── meta ───────────────────────────────────────────────────────────────

/// Arguments for the meta command
#[derive(Args, Debug)]
pub struct MetaArgs {
    #[command(subcommand)]
    pub command: MetaCommands,
}

/// Meta subcommands
#[derive(Subcommand, Debug)]
pub enum MetaCommands {
    /// Run an ad-hoc SQL query
    Query(MetaQueryArgs),

    /// List store tables with row counts
    Tables,
}

/// Arguments for `meta query`
#[derive(Args, Debug)]
pub struct MetaQueryArgs {
    /// SQL to execute
    pub sql: String,

    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

#[cfg(test)]
#[path = "cli_test.rs"]
mod tests;

//! Run command implementation - ingest run lifecycle from the shell

use anyhow::{Context, Result};
use gr_core::{AgentId, JobKind, RunCounters};
use gr_meta::runs::{self, RunAnnotation};
use gr_meta::{CloseOutcome, IngestRun, RunCompletion};
use serde::Serialize;

use crate::cli::{
    GlobalArgs, RunArgs, RunCancelArgs, RunCloseArgs, RunCommands, RunListArgs, RunOpenArgs,
    RunShowArgs,
};
use crate::commands::common::{self, format_opt, format_ts};
use crate::context::RuntimeContext;

/// Execute the run command
pub(crate) async fn execute(args: &RunArgs, global: &GlobalArgs) -> Result<()> {
    let ctx = RuntimeContext::new(global)?;
    match &args.command {
        RunCommands::Open(open_args) => execute_open(&ctx, open_args),
        RunCommands::Close(close_args) => execute_close(&ctx, close_args),
        RunCommands::Cancel(cancel_args) => execute_cancel(&ctx, cancel_args),
        RunCommands::Show(show_args) => execute_show(&ctx, show_args),
        RunCommands::List(list_args) => execute_list(&ctx, list_args),
    }
}

fn execute_open(ctx: &RuntimeContext, args: &RunOpenArgs) -> Result<()> {
    let job = JobKind::parse(args.job.as_str()).context("Invalid --job")?;
    let agent = AgentId::parse(args.agent.as_str()).context("Invalid --agent")?;
    let params = common::parse_json_arg("params", args.params.as_deref())?;

    let run_id = runs::open(&ctx.db, &args.source, &job, &agent, params.as_ref())
        .with_context(|| format!("Failed to open run for source '{}'", args.source))?;
    // Bare id on stdout so scripts can capture it.
    println!("{run_id}");
    Ok(())
}

fn execute_close(ctx: &RuntimeContext, args: &RunCloseArgs) -> Result<()> {
    let counters = RunCounters {
        fetched: args.fetched,
        inserted: args.inserted,
        updated: args.updated,
        failed: args.failed,
    };
    let mut completion = match args.status {
        Some(status) => RunCompletion::new(status, counters),
        None => RunCompletion::from_counters(counters),
    };
    if let Some(error) = common::parse_json_arg("error", args.error.as_deref())? {
        completion = completion.with_error(error);
    }
    if let Some(checksum) = &args.checksum {
        completion = completion.with_checksum(checksum.as_str());
    }

    let outcome = runs::close(&ctx.db, args.run_id, &completion)
        .with_context(|| format!("Failed to close run {}", args.run_id))?;
    report_close(args.run_id, outcome);
    Ok(())
}

fn execute_cancel(ctx: &RuntimeContext, args: &RunCancelArgs) -> Result<()> {
    let outcome = runs::cancel(&ctx.db, args.run_id, &args.reason)
        .with_context(|| format!("Failed to cancel run {}", args.run_id))?;
    report_close(args.run_id, outcome);
    Ok(())
}

fn report_close(run_id: i64, outcome: CloseOutcome) {
    if outcome.transitioned {
        println!("Run {run_id} closed as {}", outcome.status);
    } else {
        println!("Run {run_id} was already {}; nothing changed", outcome.status);
    }
}

#[derive(Serialize)]
struct RunDetail<'a> {
    #[serde(flatten)]
    run: &'a IngestRun,
    annotations: &'a [RunAnnotation],
}

fn execute_show(ctx: &RuntimeContext, args: &RunShowArgs) -> Result<()> {
    let run = runs::get_run(ctx.db.conn(), args.run_id)
        .context("Failed to read run")?
        .with_context(|| format!("Run {} not found", args.run_id))?;
    let annotations =
        runs::run_annotations(ctx.db.conn(), args.run_id).context("Failed to read annotations")?;

    if args.json {
        return common::print_json(&RunDetail {
            run: &run,
            annotations: &annotations,
        });
    }

    println!("Run {} ({})", run.run_id, run.run_key);
    println!("  source:    {}", run.source);
    println!("  job:       {}", run.job_kind);
    println!("  agent:     {}", run.agent_id);
    println!("  status:    {}", run.status);
    println!("  started:   {}", format_ts(&run.started_at));
    println!("  finished:  {}", format_opt(run.finished_at.as_ref().map(format_ts)));
    println!(
        "  counters:  fetched {}, inserted {}, updated {}, failed {}",
        run.counters.fetched, run.counters.inserted, run.counters.updated, run.counters.failed
    );
    if let Some(error) = &run.error {
        println!("  error:     {error}");
    }
    if let Some(checksum) = &run.content_checksum {
        println!("  checksum:  {checksum}");
    }
    if !annotations.is_empty() {
        println!("\nAnnotations ({}):", annotations.len());
        for note in &annotations {
            println!(
                "  [{}] {}: {}",
                format_ts(&note.recorded_at),
                note.record_key.as_deref().unwrap_or("(run)"),
                note.message
            );
        }
    }
    Ok(())
}

fn execute_list(ctx: &RuntimeContext, args: &RunListArgs) -> Result<()> {
    let runs = runs::list_runs(ctx.db.conn(), args.source.as_ref(), args.limit)
        .context("Failed to list runs")?;
    if args.json {
        return common::print_json(&runs);
    }

    let rows: Vec<Vec<String>> = runs
        .iter()
        .map(|r| {
            vec![
                r.run_id.to_string(),
                r.source.to_string(),
                r.job_kind.to_string(),
                r.agent_id.to_string(),
                r.status.to_string(),
                format_ts(&r.started_at),
                format!(
                    "{}/{}/{}/{}",
                    r.counters.fetched, r.counters.inserted, r.counters.updated, r.counters.failed
                ),
            ]
        })
        .collect();
    common::print_table(
        &["RUN", "SOURCE", "JOB", "AGENT", "STATUS", "STARTED", "F/I/U/X"],
        &rows,
    );
    Ok(())
}

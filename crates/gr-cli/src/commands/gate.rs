//! Gate command implementation - validation gate from the shell

use anyhow::{Context, Result};
use gr_core::{AgentId, CheckResult, CheckerId, GateStatus};
use gr_meta::gate::{self, CheckHistoryEntry};
use gr_meta::{GateFilter, GateRecord};

use crate::cli::{
    GateApproveArgs, GateArgs, GateBeginArgs, GateCheckArgs, GateCommands, GateHistoryArgs,
    GateKeyArgs, GateListArgs, GateReviewArgs, GateStatusArgs, GlobalArgs,
};
use crate::commands::common::{self, format_opt, format_ts, ExitCode};
use crate::context::RuntimeContext;

/// Execute the gate command
pub(crate) async fn execute(args: &GateArgs, global: &GlobalArgs) -> Result<()> {
    let ctx = RuntimeContext::new(global)?;
    match &args.command {
        GateCommands::Check(check_args) => execute_check(&ctx, check_args),
        GateCommands::Begin(begin_args) => execute_begin(&ctx, begin_args),
        GateCommands::Review(review_args) => execute_review(&ctx, review_args),
        GateCommands::Approve(approve_args) => execute_approve(&ctx, approve_args),
        GateCommands::Supersede(key_args) => execute_supersede(&ctx, key_args),
        GateCommands::Status(status_args) => execute_status(&ctx, status_args),
        GateCommands::List(list_args) => execute_list(&ctx, list_args),
        GateCommands::History(history_args) => execute_history(&ctx, history_args),
    }
}

fn checker(raw: &str) -> Result<CheckerId> {
    CheckerId::parse(raw).context("Invalid --checker")
}

fn report(key_args: &GateKeyArgs, status: GateStatus) {
    println!("{}: {status}", key_args.key());
}

fn execute_check(ctx: &RuntimeContext, args: &GateCheckArgs) -> Result<()> {
    let checker = checker(&args.checker)?;
    let raw = common::read_input(&args.results)?;
    let results: Vec<CheckResult> =
        serde_json::from_str(&raw).context("Check results must be a JSON array of results")?;

    let key = args.key.key();
    let status = gate::record_check(&ctx.db, &key, &checker, &results)
        .with_context(|| format!("Failed to record checks for {key}"))?;

    let failed = results.iter().filter(|r| !r.passed).count();
    log::info!("{} checks for {key}, {failed} failed", results.len());
    report(&args.key, status);
    Ok(())
}

fn execute_begin(ctx: &RuntimeContext, args: &GateBeginArgs) -> Result<()> {
    let checker = checker(&args.checker)?;
    let status = gate::begin_check(&ctx.db, &args.key.key(), &checker)
        .context("Failed to begin evaluation")?;
    report(&args.key, status);
    Ok(())
}

fn execute_review(ctx: &RuntimeContext, args: &GateReviewArgs) -> Result<()> {
    let status = gate::request_review(&ctx.db, &args.key.key(), &args.reason)
        .context("Failed to hold gate for review")?;
    report(&args.key, status);
    Ok(())
}

fn execute_approve(ctx: &RuntimeContext, args: &GateApproveArgs) -> Result<()> {
    let approver = AgentId::parse(args.approver.as_str()).context("Invalid --approver")?;
    let status = gate::approve(&ctx.db, &args.key.key(), &approver, args.decision.into())
        .context("Failed to record review decision")?;
    report(&args.key, status);
    Ok(())
}

fn execute_supersede(ctx: &RuntimeContext, args: &GateKeyArgs) -> Result<()> {
    let status = gate::supersede(&ctx.db, &args.key()).context("Failed to supersede gate")?;
    report(args, status);
    Ok(())
}

fn execute_status(ctx: &RuntimeContext, args: &GateStatusArgs) -> Result<()> {
    let key = args.key.key();
    let record = gate::status(ctx.db.conn(), &key).context("Failed to read gate status")?;
    let ready = record.as_ref().is_some_and(|r| r.status.is_ready());

    if args.json {
        common::print_json(&record)?;
    } else {
        match &record {
            Some(record) => print_record(record),
            None => println!("{key}: no gate row (not ready)"),
        }
    }

    if args.require_ready && !ready {
        return Err(ExitCode(1).into());
    }
    Ok(())
}

fn print_record(record: &GateRecord) {
    println!("{}: {}", record.key, record.status);
    println!("  checker:      {}", format_opt(record.checker_id.as_ref()));
    println!("  evaluations:  {}", record.evaluation_count);
    println!("  updated:      {}", format_ts(&record.updated_at));
    if let Some(reason) = &record.review_reason {
        println!("  review:       {reason}");
    }
    if let Some(approver) = &record.approver {
        println!(
            "  approved by:  {approver} at {}",
            format_opt(record.approved_at.as_ref().map(format_ts))
        );
    }
    for result in &record.results {
        let mark = if result.passed { "ok" } else { "FAIL" };
        println!(
            "  [{mark}] {} ({}){}",
            result.name,
            result.severity,
            result
                .message
                .as_deref()
                .map(|m| format!(": {m}"))
                .unwrap_or_default()
        );
    }
}

fn execute_list(ctx: &RuntimeContext, args: &GateListArgs) -> Result<()> {
    let filter = GateFilter {
        entity_type: args.entity_type,
        source: args.source.clone(),
        status: args.status,
    };
    let records = gate::list_statuses(ctx.db.conn(), &filter).context("Failed to list gates")?;
    if args.json {
        return common::print_json(&records);
    }

    let rows: Vec<Vec<String>> = records
        .iter()
        .map(|r| {
            vec![
                r.key.entity_type.to_string(),
                r.key.entity_id.clone(),
                r.key.source.to_string(),
                r.status.to_string(),
                r.evaluation_count.to_string(),
                format_ts(&r.updated_at),
            ]
        })
        .collect();
    common::print_table(
        &["TYPE", "ENTITY", "SOURCE", "STATUS", "EVALS", "UPDATED"],
        &rows,
    );
    Ok(())
}

fn execute_history(ctx: &RuntimeContext, args: &GateHistoryArgs) -> Result<()> {
    let entries: Vec<CheckHistoryEntry> = gate::check_history(ctx.db.conn(), &args.key.key())
        .context("Failed to read check history")?;
    if args.json {
        return common::print_json(&entries);
    }

    let rows: Vec<Vec<String>> = entries
        .iter()
        .map(|e| {
            vec![
                e.evaluation.to_string(),
                e.checker_id.to_string(),
                e.result.name.clone(),
                e.result.severity.to_string(),
                if e.result.passed { "pass" } else { "fail" }.to_string(),
                e.outcome.to_string(),
                format_ts(&e.evaluated_at),
            ]
        })
        .collect();
    common::print_table(
        &["EVAL", "CHECKER", "CHECK", "SEVERITY", "RESULT", "OUTCOME", "AT"],
        &rows,
    );
    Ok(())
}

//! Lineage command implementation

use anyhow::{Context, Result};
use gr_core::{LineageEdge, TracedNode};
use gr_meta::lineage;

use crate::cli::{GlobalArgs, LineageArgs, LineageCommands, LineageEdgesArgs, LineageRecordArgs, LineageTraceArgs};
use crate::commands::common::{self, format_opt};
use crate::context::RuntimeContext;

/// Execute the lineage command
pub(crate) async fn execute(args: &LineageArgs, global: &GlobalArgs) -> Result<()> {
    let ctx = RuntimeContext::new(global)?;
    match &args.command {
        LineageCommands::Record(record_args) => execute_record(&ctx, record_args),
        LineageCommands::Upstream(trace_args) => {
            let nodes = lineage::trace_upstream(&ctx.db, &trace_args.node, trace_args.depth)
                .context("Failed to trace upstream lineage")?;
            print_trace(trace_args, &nodes)
        }
        LineageCommands::Downstream(trace_args) => {
            let nodes = lineage::trace_downstream(&ctx.db, &trace_args.node, trace_args.depth)
                .context("Failed to trace downstream lineage")?;
            print_trace(trace_args, &nodes)
        }
        LineageCommands::Edges(edges_args) => execute_edges(&ctx, edges_args),
    }
}

fn execute_record(ctx: &RuntimeContext, args: &LineageRecordArgs) -> Result<()> {
    let created = lineage::record_edge(
        &ctx.db,
        &args.source,
        &args.target,
        args.relationship,
        args.run_id,
    )
    .with_context(|| format!("Failed to record {} -> {}", args.source, args.target))?;

    let verb = if created { "Recorded" } else { "Already recorded" };
    println!(
        "{verb}: {} -[{}]-> {}",
        args.source, args.relationship, args.target
    );
    Ok(())
}

fn print_trace(args: &LineageTraceArgs, nodes: &[TracedNode]) -> Result<()> {
    if args.json {
        return common::print_json(nodes);
    }
    let rows: Vec<Vec<String>> = nodes
        .iter()
        .map(|t| vec![t.node.to_string(), t.depth.to_string()])
        .collect();
    common::print_table(&["NODE", "DEPTH"], &rows);
    Ok(())
}

fn execute_edges(ctx: &RuntimeContext, args: &LineageEdgesArgs) -> Result<()> {
    let edges: Vec<LineageEdge> = match &args.node {
        Some(node) => lineage::edges_for(ctx.db.conn(), node),
        None => lineage::list_edges(ctx.db.conn()),
    }
    .context("Failed to list lineage edges")?;

    if args.json {
        return common::print_json(&edges);
    }
    let rows: Vec<Vec<String>> = edges
        .iter()
        .map(|e| {
            vec![
                e.source.to_string(),
                e.relationship.to_string(),
                e.target.to_string(),
                format_opt(e.run_id),
            ]
        })
        .collect();
    common::print_table(&["SOURCE", "RELATIONSHIP", "TARGET", "RUN"], &rows);
    Ok(())
}

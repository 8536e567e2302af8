//! Source command implementation

use anyhow::{Context, Result};

use crate::cli::{GlobalArgs, ListArgs, SourceAddArgs, SourceArgs, SourceCommands};
use crate::commands::common::{self, format_opt, format_ts};
use crate::context::RuntimeContext;

/// Execute the source command
pub(crate) async fn execute(args: &SourceArgs, global: &GlobalArgs) -> Result<()> {
    let ctx = RuntimeContext::new(global)?;
    match &args.command {
        SourceCommands::List(list_args) => execute_list(&ctx, list_args),
        SourceCommands::Add(add_args) => execute_add(&ctx, add_args),
    }
}

fn execute_list(ctx: &RuntimeContext, args: &ListArgs) -> Result<()> {
    let sources =
        gr_meta::sources::list_sources(ctx.db.conn()).context("Failed to list sources")?;
    if args.json {
        return common::print_json(&sources);
    }

    let rows: Vec<Vec<String>> = sources
        .iter()
        .map(|s| {
            vec![
                s.code.to_string(),
                s.name.clone(),
                format_opt(s.description.as_deref()),
                format_ts(&s.registered_at),
            ]
        })
        .collect();
    common::print_table(&["CODE", "NAME", "DESCRIPTION", "REGISTERED"], &rows);
    Ok(())
}

fn execute_add(ctx: &RuntimeContext, args: &SourceAddArgs) -> Result<()> {
    gr_meta::sources::register_source(
        &ctx.db,
        &args.code,
        &args.name,
        args.description.as_deref(),
    )
    .with_context(|| format!("Failed to register source '{}'", args.code))?;
    println!("Registered source '{}'", args.code);
    Ok(())
}

//! Series command implementation - read-only views over the registry and facts

use anyhow::{Context, Result};
use gr_core::{LocalKey, SourceCode};
use gr_meta::{Entity, MetaDb, Observation};
use serde::Serialize;

use crate::cli::{GlobalArgs, SeriesArgs, SeriesCommands, SeriesHistoryArgs, SeriesListArgs, SeriesShowArgs};
use crate::commands::common::{self, format_opt, format_ts};
use crate::context::RuntimeContext;

/// Execute the series command
pub(crate) async fn execute(args: &SeriesArgs, global: &GlobalArgs) -> Result<()> {
    let ctx = RuntimeContext::new(global)?;
    match &args.command {
        SeriesCommands::List(list_args) => execute_list(&ctx, list_args),
        SeriesCommands::Show(show_args) => execute_show(&ctx, show_args),
        SeriesCommands::History(history_args) => execute_history(&ctx, history_args),
    }
}

#[derive(Serialize)]
struct SeriesView<'a> {
    #[serde(flatten)]
    entity: &'a Entity,
    observations: &'a [Observation],
}

fn find(db: &MetaDb, source: &SourceCode, local_key: &str) -> Result<Entity> {
    let key = LocalKey::parse(local_key).context("Invalid local key")?;
    gr_meta::registry::find_entity(db.conn(), source, &key)
        .context("Failed to look up series")?
        .with_context(|| format!("No series {source}/{local_key}"))
}

fn execute_list(ctx: &RuntimeContext, args: &SeriesListArgs) -> Result<()> {
    let entities = gr_meta::registry::list_entities(ctx.db.conn(), &args.source)
        .context("Failed to list series")?;
    if args.json {
        return common::print_json(&entities);
    }

    let rows: Vec<Vec<String>> = entities
        .iter()
        .map(|e| {
            vec![
                e.entity_id.to_string(),
                e.local_key.to_string(),
                format_opt(e.attributes.name.as_deref()),
                format_opt(e.attributes.commodity.as_deref()),
                format_opt(e.attributes.unit.as_deref()),
            ]
        })
        .collect();
    common::print_table(&["ID", "LOCAL KEY", "NAME", "COMMODITY", "UNIT"], &rows);
    Ok(())
}

fn execute_show(ctx: &RuntimeContext, args: &SeriesShowArgs) -> Result<()> {
    let entity = find(&ctx.db, &args.source, &args.local_key)?;
    let observations = if args.promotable {
        gr_meta::query::promotable_observations(ctx.db.conn(), entity.entity_id)
    } else {
        gr_meta::facts::series_current(ctx.db.conn(), entity.entity_id)
    }
    .context("Failed to read observations")?;

    if args.json {
        return common::print_json(&SeriesView {
            entity: &entity,
            observations: &observations,
        });
    }

    println!(
        "Series {} ({}/{}) {}",
        entity.entity_id,
        entity.source,
        entity.local_key,
        format_opt(entity.attributes.name.as_deref())
    );
    print_observations(&observations);
    Ok(())
}

fn execute_history(ctx: &RuntimeContext, args: &SeriesHistoryArgs) -> Result<()> {
    let entity = find(&ctx.db, &args.source, &args.local_key)?;
    let observed_at = common::parse_observed_at(&args.observed_at)?;
    let revisions = gr_meta::facts::revisions(ctx.db.conn(), entity.entity_id, &observed_at)
        .context("Failed to read revisions")?;
    if args.json {
        return common::print_json(&revisions);
    }
    print_observations(&revisions);
    Ok(())
}

fn print_observations(observations: &[Observation]) {
    let rows: Vec<Vec<String>> = observations
        .iter()
        .map(|o| {
            vec![
                format_ts(&o.observed_at),
                o.revision.to_string(),
                format_opt(o.value),
                o.quality_flag.as_str().to_string(),
                o.validation_flag.as_str().to_string(),
                o.run_id.to_string(),
            ]
        })
        .collect();
    common::print_table(
        &["OBSERVED AT", "REV", "VALUE", "QUALITY", "VALIDATION", "RUN"],
        &rows,
    );
}

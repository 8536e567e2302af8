//! Meta command implementation - direct reads against the store.

use crate::cli::{GlobalArgs, MetaArgs, MetaCommands, MetaQueryArgs};
use crate::commands::common;
use crate::context::RuntimeContext;
use anyhow::{Context, Result};

/// Execute the meta command.
pub(crate) async fn execute(args: &MetaArgs, global: &GlobalArgs) -> Result<()> {
    let ctx = RuntimeContext::new(global)?;
    match &args.command {
        MetaCommands::Query(query_args) => execute_query(&ctx, query_args),
        MetaCommands::Tables => execute_tables(&ctx),
    }
}

fn execute_query(ctx: &RuntimeContext, args: &MetaQueryArgs) -> Result<()> {
    let result = gr_meta::query::execute_query(ctx.db.conn(), &args.sql)
        .context("Failed to execute query")?;

    if args.json {
        return common::print_json(&rows_as_objects(&result.columns, &result.rows));
    }
    let headers: Vec<&str> = result.columns.iter().map(String::as_str).collect();
    common::print_table(&headers, &result.rows);
    Ok(())
}

fn rows_as_objects(columns: &[String], rows: &[Vec<String>]) -> Vec<serde_json::Value> {
    rows.iter()
        .map(|row| {
            let map: serde_json::Map<String, serde_json::Value> = columns
                .iter()
                .zip(row.iter())
                .map(|(col, val)| {
                    let json_val = if val == "null" {
                        serde_json::Value::Null
                    } else {
                        serde_json::Value::String(val.clone())
                    };
                    (col.clone(), json_val)
                })
                .collect();
            serde_json::Value::Object(map)
        })
        .collect()
}

fn execute_tables(ctx: &RuntimeContext) -> Result<()> {
    let conn = ctx.db.conn();
    let tables = gr_meta::query::list_tables(conn).context("Failed to list store tables")?;

    println!("Store tables ({}):\n", tables.len());
    for table in &tables {
        match gr_meta::query::table_row_count(conn, table) {
            Ok(count) => println!("  {:<32} {:>8} rows", table, count),
            Err(e) => {
                log::warn!("Failed to count rows in {table}: {e}");
                println!("  {:<32} {:>8}", table, "?");
            }
        }
    }
    Ok(())
}

//! Init command implementation - creates the store and registers sources

use anyhow::{Context, Result};
use std::path::Path;

use crate::cli::{GlobalArgs, InitArgs};
use crate::context::RuntimeContext;

/// Execute the init command
pub(crate) async fn execute(args: &InitArgs, global: &GlobalArgs) -> Result<()> {
    let project_dir = Path::new(&global.project_dir);
    let has_config = global.config.is_some()
        || project_dir.join("granary.yml").exists()
        || project_dir.join("granary.yaml").exists();

    if !has_config {
        let Some(name) = &args.name else {
            anyhow::bail!(
                "No granary.yml in {}. Pass --name to create one.",
                project_dir.display()
            );
        };
        write_starter_config(project_dir, name)?;
        println!("Created {}", project_dir.join("granary.yml").display());
    }

    let ctx = RuntimeContext::new(global)?;
    for source in &ctx.config.sources {
        gr_meta::sources::register_source(
            &ctx.db,
            &source.code,
            &source.name,
            source.description.as_deref(),
        )
        .with_context(|| format!("Failed to register source '{}'", source.code))?;
    }

    let version = gr_meta::migration::current_version(ctx.db.conn())
        .context("Failed to read store schema version")?;
    println!(
        "Store ready for '{}' (schema v{version}, {} sources registered)",
        ctx.config.name,
        ctx.config.sources.len()
    );
    Ok(())
}

fn write_starter_config(dir: &Path, name: &str) -> Result<()> {
    if name.trim().is_empty() || name.contains('"') || name.contains('\n') {
        anyhow::bail!("Invalid deployment name '{name}'");
    }
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory: {}", dir.display()))?;

    let content = format!(
        r#"name: "{name}"

database:
  path: target/granary.duckdb

sources:
  - code: wasde
    name: World Agricultural Supply and Demand Estimates
    description: USDA monthly supply/demand report

lineage:
  default_max_depth: 10
  max_depth_limit: 50

store:
  max_conflict_retries: 8
  retry_backoff_ms: 5
"#
    );
    let path = dir.join("granary.yml");
    std::fs::write(&path, content)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

//! Runtime context for CLI commands

use anyhow::{Context, Result};
use gr_core::Config;
use gr_meta::MetaDb;
use std::path::{Path, PathBuf};

use crate::cli::GlobalArgs;

/// Loaded configuration plus an open store
pub(crate) struct RuntimeContext {
    pub config: Config,
    pub db: MetaDb,
}

impl RuntimeContext {
    /// Load the configuration named by the global arguments and open its store.
    pub fn new(args: &GlobalArgs) -> Result<Self> {
        let config = load_config(args)?;
        let db = open_store(args, &config)?;
        Ok(Self { config, db })
    }
}

/// Load config from `--config` or from the project directory.
pub(crate) fn load_config(args: &GlobalArgs) -> Result<Config> {
    match &args.config {
        Some(path) => Config::load(Path::new(path)).context("Failed to load configuration file"),
        None => Config::load_from_dir(Path::new(&args.project_dir))
            .context("Failed to load project configuration"),
    }
}

/// Store location: `--database` wins over the config. `None` is in-memory.
pub(crate) fn store_path(args: &GlobalArgs, config: &Config) -> Option<PathBuf> {
    let root = Path::new(&args.project_dir);
    match args.database.as_deref() {
        Some(":memory:") => None,
        Some(path) => Some(root.join(path)),
        None => config.database_path(root),
    }
}

fn open_store(args: &GlobalArgs, config: &Config) -> Result<MetaDb> {
    let db = match store_path(args, config) {
        Some(path) => MetaDb::open(&path)
            .with_context(|| format!("Failed to open store at {}", path.display()))?,
        None => {
            log::warn!("Using an in-memory store; nothing will persist after this command");
            MetaDb::open_memory().context("Failed to open in-memory store")?
        }
    };
    Ok(db.with_settings(config.store, config.lineage))
}

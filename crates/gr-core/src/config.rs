//! Configuration types and parsing for granary.yml

use crate::error::{CoreError, CoreResult};
use crate::lineage::DEFAULT_MAX_DEPTH;
use crate::names::SourceCode;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Main project configuration from granary.yml
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Deployment name
    pub name: String,

    /// Store location
    #[serde(default)]
    pub database: DatabaseConfig,

    /// External sources registered on `gr init`
    #[serde(default)]
    pub sources: Vec<SourceConfig>,

    /// Lineage traversal limits
    #[serde(default)]
    pub lineage: LineageConfig,

    /// Write-path tuning
    #[serde(default)]
    pub store: StoreConfig,
}

/// Database location
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    /// DuckDB file path, relative to the project directory, or `:memory:`
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    "target/granary.duckdb".to_string()
}

/// A known external source
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    pub code: SourceCode,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Lineage traversal limits
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LineageConfig {
    /// Depth used when a trace does not specify one
    #[serde(default = "default_max_depth")]
    pub default_max_depth: usize,

    /// Hard cap applied to every requested depth
    #[serde(default = "default_depth_limit")]
    pub max_depth_limit: usize,
}

impl Default for LineageConfig {
    fn default() -> Self {
        Self {
            default_max_depth: default_max_depth(),
            max_depth_limit: default_depth_limit(),
        }
    }
}

fn default_max_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

fn default_depth_limit() -> usize {
    50
}

/// Write-path tuning for conflict resolution
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Attempts before a contended natural key gives up
    #[serde(default = "default_conflict_retries")]
    pub max_conflict_retries: u32,

    /// Base sleep between attempts, multiplied by the attempt number
    #[serde(default = "default_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_conflict_retries: default_conflict_retries(),
            retry_backoff_ms: default_backoff_ms(),
        }
    }
}

fn default_conflict_retries() -> u32 {
    8
}

fn default_backoff_ms() -> u64 {
    5
}

impl Config {
    /// Load configuration from a file path
    pub fn load(path: &Path) -> CoreResult<Self> {
        if !path.exists() {
            return Err(CoreError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| CoreError::IoWithPath {
            path: path.display().to_string(),
            source: e,
        })?;
        let config: Config = serde_yaml::from_str(&content)?;
        config.validate()?;
        log::debug!(
            "Loaded config '{}' from {} ({} sources)",
            config.name,
            path.display(),
            config.sources.len()
        );
        Ok(config)
    }

    /// Load configuration from a project directory
    /// Looks for granary.yml or granary.yaml
    pub fn load_from_dir(dir: &Path) -> CoreResult<Self> {
        let yml_path = dir.join("granary.yml");
        let yaml_path = dir.join("granary.yaml");

        if yml_path.exists() {
            Self::load(&yml_path)
        } else if yaml_path.exists() {
            Self::load(&yaml_path)
        } else {
            Err(CoreError::ConfigNotFound {
                path: yml_path.display().to_string(),
            })
        }
    }

    /// Resolve the database path against the project directory.
    ///
    /// Returns `None` for an in-memory database.
    pub fn database_path(&self, root: &Path) -> Option<PathBuf> {
        if self.database.path == ":memory:" {
            None
        } else {
            Some(root.join(&self.database.path))
        }
    }

    fn validate(&self) -> CoreResult<()> {
        if self.name.trim().is_empty() {
            return Err(CoreError::ConfigInvalid {
                message: "name cannot be empty".to_string(),
            });
        }

        let mut seen = HashSet::new();
        for source in &self.sources {
            if !seen.insert(source.code.as_str()) {
                return Err(CoreError::ConfigInvalid {
                    message: format!("duplicate source code '{}'", source.code),
                });
            }
        }

        let lineage = &self.lineage;
        if lineage.default_max_depth == 0 || lineage.default_max_depth > lineage.max_depth_limit {
            return Err(CoreError::ConfigInvalid {
                message: format!(
                    "lineage.default_max_depth must be between 1 and max_depth_limit ({}), got {}",
                    lineage.max_depth_limit, lineage.default_max_depth
                ),
            });
        }

        if self.store.max_conflict_retries == 0 {
            return Err(CoreError::ConfigInvalid {
                message: "store.max_conflict_retries must be at least 1".to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;

//! src/config.rs
//! ============================================================================
//! # Config: tree configuration loader and saver
//!
//! Loads and saves settings as TOML from the platform config directory using
//! the [`directories`](https://docs.rs/directories) crate.
//!
//! ## Sections
//! - `fetch`: poll interval and progress labelling for data-source fetches
//! - `defaults`: node options applied when a node type gives no opinion
//! - `node_types`: per-type overrides, fixed when a node is built
//! - `logging`: level, directory and file prefix for the tracing layers
//!
//! ## Example
//! ```rust,ignore
//! let config = Config::load().await?;
//! config.save().await?;
//! ```

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use ahash::RandomState;
use compact_str::CompactString;
use directories::ProjectDirs;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::fs as TokioFs;
use tracing::info;

use crate::{error::CoreResult, model::node::NodeOptions, util::path::fold_case};

/// Fetch behaviour shared by every node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// How long to wait for a fetch before progress starts, and the tick
    /// between progress updates afterwards.
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,

    /// Identifier attached to every progress record.
    pub progress_activity_id: u32,

    /// Activity label of progress records.
    pub progress_activity: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            progress_activity_id: 1,
            progress_activity: "Retrieving data".to_string(),
        }
    }
}

/// Tracing output settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default `EnvFilter` directive when `RUST_LOG` is unset.
    pub level: String,

    /// Directory for rolling log files. `None` logs next to the binary.
    pub directory: Option<PathBuf>,

    pub file_prefix: String,

    /// Mirror events to stderr.
    pub stderr: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
            file_prefix: "lazytree.log".to_string(),
            stderr: true,
        }
    }
}

/// Main configuration struct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub fetch: FetchConfig,

    pub defaults: NodeOptions,

    /// Keyed by node type name, matched case-insensitively.
    pub node_types: IndexMap<String, NodeOptions>,

    pub logging: LoggingConfig,
}

impl Config {
    /// Parses a TOML document; missing sections fall back to defaults.
    pub fn from_toml_str(text: &str) -> CoreResult<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn to_toml_string(&self) -> CoreResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Loads config from the platform config dir, or writes and returns the
    /// defaults when no file exists yet.
    pub async fn load() -> anyhow::Result<Self> {
        let path: PathBuf = Self::config_path()?;

        if path.exists() {
            Self::load_from(&path).await
        } else {
            info!(
                "No config file found at {}, using default configuration. Creating it now.",
                path.display()
            );

            let default_config = Self::default();
            default_config.save_to(&path).await?;

            Ok(default_config)
        }
    }

    pub async fn load_from(path: &Path) -> anyhow::Result<Self> {
        info!("Loading config from {}", path.display());

        let text: String = TokioFs::read_to_string(path).await?;
        Ok(Self::from_toml_str(&text)?)
    }

    /// Saves config to the platform config dir.
    pub async fn save(&self) -> anyhow::Result<()> {
        self.save_to(&Self::config_path()?).await
    }

    pub async fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        info!("Saving config to {}", path.display());

        if let Some(parent) = path.parent() {
            TokioFs::create_dir_all(parent).await?;
        }

        TokioFs::write(path, self.to_toml_string()?).await?;

        Ok(())
    }

    /// Returns the canonical config file path using `directories::ProjectDirs`.
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("org", "lazytree", "LazyTree")
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory."))?;
        Ok(proj_dirs.config_dir().to_path_buf())
    }

    /// Node option table derived from `defaults` and `node_types`.
    #[must_use]
    pub fn node_type_table(&self) -> NodeTypeTable {
        let mut table = NodeTypeTable::new(self.defaults);

        for (type_name, options) in &self.node_types {
            table.register(type_name, *options);
        }

        table
    }
}

/// Resolves the options a node type is built with.
///
/// Precedence: a registered override, then the type's own capability, then
/// the configured defaults.
#[derive(Debug, Clone, Default)]
pub struct NodeTypeTable {
    defaults: NodeOptions,
    overrides: HashMap<CompactString, NodeOptions, RandomState>,
}

impl NodeTypeTable {
    #[must_use]
    pub fn new(defaults: NodeOptions) -> Self {
        Self {
            defaults,
            overrides: HashMap::default(),
        }
    }

    /// Registers options for `type_name`, replacing any earlier entry.
    pub fn register(&mut self, type_name: &str, options: NodeOptions) -> &mut Self {
        self.overrides.insert(fold_case(type_name), options);
        self
    }

    #[must_use]
    pub fn resolve(&self, type_name: &str, declared: Option<NodeOptions>) -> NodeOptions {
        self.overrides
            .get(&fold_case(type_name))
            .copied()
            .or(declared)
            .unwrap_or(self.defaults)
    }
}

//! Minimal configuration loading for the persistence adapters.
//!
//! Adapters never read configuration on their own. A caller loads a
//! [`PersistConfig`] once and hands the relevant section to each adapter
//! constructor:
//!
//! ```rust,no_run
//! use persistconf::PersistConfig;
//!
//! let config = PersistConfig::load().expect("Failed to load config");
//!
//! println!("cache ttl: {:?}", config.dht.cache_ttl());
//! println!("tree root: {}", config.tree.root_dir.display());
//! ```
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins):
//! 1. `/etc/persist/config.toml` (system)
//! 2. `~/.config/persist/config.toml` (user)
//! 3. `./persist.toml` (local override)
//! 4. Environment variables (`PERSIST_*`)
//!
//! # Example Config
//!
//! ```toml
//! [dht]
//! cache_ttl_ms = 2000
//! domain_protection = true
//! operation_timeout_ms = 5000
//!
//! [tree]
//! root_dir = "~/sync/root"
//!
//! [telemetry]
//! log_level = "debug"
//! ```

pub mod infra;
pub mod loader;

pub use infra::{DhtConfig, TelemetryConfig, TreeConfig};
pub use loader::{discover_config_files_with_override, ConfigLayer, ConfigSources};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Complete persistence configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PersistConfig {
    /// DHT adapter settings.
    #[serde(default)]
    pub dht: DhtConfig,

    /// Local tree adapter settings.
    #[serde(default)]
    pub tree: TreeConfig,

    /// Logging settings for embedding binaries.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl PersistConfig {
    /// Load configuration from all sources.
    ///
    /// Load order (later wins):
    /// 1. Compiled defaults
    /// 2. `/etc/persist/config.toml`
    /// 3. `~/.config/persist/config.toml`
    /// 4. `./persist.toml`
    /// 5. Environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(None)?;
        Ok(config)
    }

    /// Load configuration from a specific file path, then apply env overrides.
    ///
    /// If `config_path` is provided, it takes precedence over the local
    /// `./persist.toml` override. System and user configs still load first.
    pub fn load_from(config_path: Option<&std::path::Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    /// Load configuration from optional path and return information about sources.
    pub fn load_with_sources_from(
        config_path: Option<&std::path::Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut config = PersistConfig::default();

        for path in loader::discover_config_files_with_override(config_path) {
            let layer = loader::load_from_file(&path)?;
            config = loader::merge_configs(config, layer);
            sources.files.push(path);
        }

        loader::apply_env_overrides(&mut config, &mut sources);

        Ok((config, sources))
    }

    /// Serialize config to TOML string.
    pub fn to_toml(&self) -> String {
        let mut output = String::new();

        output.push_str("# Persistence Configuration\n\n");

        output.push_str("[dht]\n");
        output.push_str(&format!("cache_ttl_ms = {}\n", self.dht.cache_ttl_ms));
        output.push_str(&format!(
            "domain_protection = {}\n",
            self.dht.domain_protection
        ));
        if let Some(timeout) = self.dht.operation_timeout_ms {
            output.push_str(&format!("operation_timeout_ms = {}\n", timeout));
        }

        output.push_str("\n[tree]\n");
        output.push_str(&format!(
            "root_dir = \"{}\"\n",
            self.tree.root_dir.display()
        ));

        output.push_str("\n[telemetry]\n");
        output.push_str(&format!(
            "log_level = \"{}\"\n",
            self.telemetry.log_level
        ));

        output
    }
}

//! Config file discovery, loading, and environment variable overlay.

use crate::{ConfigError, PersistConfig};
use std::env;
use std::path::{Path, PathBuf};

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

/// Discover config files in standard locations.
///
/// Returns paths in load order (system, user, local).
/// Only returns files that exist.
pub fn discover_config_files() -> Vec<PathBuf> {
    discover_config_files_with_override(None)
}

/// Discover config files, optionally with an explicit override path.
///
/// If `override_path` is provided and exists, it replaces the local override.
pub fn discover_config_files_with_override(override_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/persist/config.toml");
    if system.exists() {
        files.push(system);
    }

    // XDG_CONFIG_HOME or ~/.config
    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("persist/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    if let Some(path) = override_path {
        if path.exists() {
            files.push(path.to_path_buf());
            return files;
        }
    }

    let local = PathBuf::from("persist.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Values one config file actually sets. Absent keys stay `None` so that a
/// later file can set any value, defaults included.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigLayer {
    pub cache_ttl_ms: Option<u64>,
    pub domain_protection: Option<bool>,
    pub operation_timeout_ms: Option<u64>,
    pub root_dir: Option<PathBuf>,
    pub log_level: Option<String>,
}

/// Load config from a TOML file.
pub fn load_from_file(path: &Path) -> Result<ConfigLayer, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    parse_toml(&contents, path)
}

/// Parse config from TOML string.
///
/// Unknown keys are ignored so that newer files still load.
fn parse_toml(contents: &str, path: &Path) -> Result<ConfigLayer, ConfigError> {
    let table: toml::Table = contents.parse().map_err(|e: toml::de::Error| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let mut layer = ConfigLayer::default();

    if let Some(dht) = table.get("dht").and_then(|v| v.as_table()) {
        if let Some(v) = dht.get("cache_ttl_ms") {
            layer.cache_ttl_ms = Some(non_negative(v, "dht.cache_ttl_ms", path)?);
        }
        layer.domain_protection = dht.get("domain_protection").and_then(|v| v.as_bool());
        if let Some(v) = dht.get("operation_timeout_ms") {
            layer.operation_timeout_ms = Some(non_negative(v, "dht.operation_timeout_ms", path)?);
        }
    }

    if let Some(tree) = table.get("tree").and_then(|v| v.as_table()) {
        layer.root_dir = tree
            .get("root_dir")
            .and_then(|v| v.as_str())
            .map(expand_path);
    }

    if let Some(telemetry) = table.get("telemetry").and_then(|v| v.as_table()) {
        layer.log_level = telemetry
            .get("log_level")
            .and_then(|v| v.as_str())
            .map(str::to_string);
    }

    Ok(layer)
}

fn non_negative(value: &toml::Value, key: &str, path: &Path) -> Result<u64, ConfigError> {
    value
        .as_integer()
        .and_then(|v| u64::try_from(v).ok())
        .ok_or_else(|| ConfigError::Parse {
            path: path.to_path_buf(),
            message: format!("{} must be a non-negative integer", key),
        })
}

/// Overlay the keys `layer` sets onto `base`.
pub fn merge_configs(mut base: PersistConfig, layer: ConfigLayer) -> PersistConfig {
    if let Some(ttl) = layer.cache_ttl_ms {
        base.dht.cache_ttl_ms = ttl;
    }
    if let Some(protection) = layer.domain_protection {
        base.dht.domain_protection = protection;
    }
    if let Some(timeout) = layer.operation_timeout_ms {
        base.dht.operation_timeout_ms = Some(timeout);
    }
    if let Some(root_dir) = layer.root_dir {
        base.tree.root_dir = root_dir;
    }
    if let Some(log_level) = layer.log_level {
        base.telemetry.log_level = log_level;
    }
    base
}

/// Apply environment variable overrides to config.
pub fn apply_env_overrides(config: &mut PersistConfig, sources: &mut ConfigSources) {
    if let Ok(v) = env::var("PERSIST_CACHE_TTL_MS") {
        if let Ok(ttl) = v.parse() {
            config.dht.cache_ttl_ms = ttl;
            sources.env_overrides.push("PERSIST_CACHE_TTL_MS".to_string());
        }
    }
    if let Ok(v) = env::var("PERSIST_DOMAIN_PROTECTION") {
        config.dht.domain_protection = v.to_lowercase() == "true" || v == "1";
        sources
            .env_overrides
            .push("PERSIST_DOMAIN_PROTECTION".to_string());
    }
    if let Ok(v) = env::var("PERSIST_OPERATION_TIMEOUT_MS") {
        if let Ok(timeout) = v.parse() {
            config.dht.operation_timeout_ms = Some(timeout);
            sources
                .env_overrides
                .push("PERSIST_OPERATION_TIMEOUT_MS".to_string());
        }
    }
    if let Ok(v) = env::var("PERSIST_TREE_ROOT") {
        config.tree.root_dir = expand_path(&v);
        sources.env_overrides.push("PERSIST_TREE_ROOT".to_string());
    }
    if let Ok(v) = env::var("PERSIST_LOG_LEVEL") {
        config.telemetry.log_level = v;
        sources.env_overrides.push("PERSIST_LOG_LEVEL".to_string());
    }
}

/// Expand ~ and environment variables in a path.
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
            home.join(stripped)
        } else {
            PathBuf::from(path)
        }
    } else if let Some(stripped) = path.strip_prefix('$') {
        // $VAR/rest/of/path
        if let Some(slash_pos) = stripped.find('/') {
            let var_name = &stripped[..slash_pos];
            if let Ok(var_value) = env::var(var_name) {
                PathBuf::from(var_value).join(&stripped[slash_pos + 1..])
            } else {
                PathBuf::from(path)
            }
        } else {
            env::var(stripped)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(path))
        }
    } else {
        PathBuf::from(path)
    }
}

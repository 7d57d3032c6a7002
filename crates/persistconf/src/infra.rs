//! Configuration sections consumed by the adapters at construction time.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Settings for the DHT-backed adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DhtConfig {
    /// Time to live of cached values in milliseconds.
    /// Zero makes every entry immediately stale, i.e. disables the cache.
    /// Default: 0
    #[serde(default)]
    pub cache_ttl_ms: u64,

    /// Whether the adapter accepts protected (domain-keyed) elements.
    /// Requires the peer to hold a complete key pair.
    /// Default: false
    #[serde(default)]
    pub domain_protection: bool,

    /// Deadline for a single network operation. `None` waits until the
    /// operation completes.
    /// Default: none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_timeout_ms: Option<u64>,
}

impl DhtConfig {
    /// Unprotected adapter with the given cache TTL.
    pub fn unprotected(cache_ttl_ms: u64) -> Self {
        Self {
            cache_ttl_ms,
            domain_protection: false,
            operation_timeout_ms: None,
        }
    }

    /// Protected adapter with the given cache TTL.
    pub fn protected(cache_ttl_ms: u64) -> Self {
        Self {
            cache_ttl_ms,
            domain_protection: true,
            operation_timeout_ms: None,
        }
    }

    /// Builder: set the per-operation deadline.
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.operation_timeout_ms = Some(timeout_ms);
        self
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    pub fn operation_timeout(&self) -> Option<Duration> {
        self.operation_timeout_ms.map(Duration::from_millis)
    }
}

impl Default for DhtConfig {
    fn default() -> Self {
        Self::unprotected(0)
    }
}

/// Settings for the local tree adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeConfig {
    /// Directory all tree paths are resolved against.
    /// Default: ~/.local/share/persist/tree
    #[serde(default = "TreeConfig::default_root_dir")]
    pub root_dir: PathBuf,
}

impl TreeConfig {
    fn default_root_dir() -> PathBuf {
        directories::BaseDirs::new()
            .map(|dirs| dirs.home_dir().join(".local/share/persist/tree"))
            .unwrap_or_else(|| PathBuf::from(".local/share/persist/tree"))
    }

    /// Tree rooted at the given directory.
    pub fn at(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            root_dir: Self::default_root_dir(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level (trace, debug, info, warn, error) or a full env-filter directive.
    /// Default: info
    #[serde(default = "TelemetryConfig::default_log_level")]
    pub log_level: String,
}

impl TelemetryConfig {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
        }
    }
}

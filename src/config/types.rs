//! Configuration types for rolegate
//!
//! This module defines the configuration structure that can be loaded from
//! TOML files and/or environment variables.

use crate::cache::MemoryCacheOptions;
use crate::hierarchy::ResolverOptions;
use crate::permission::ParserOptions;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Permission string syntax
    pub parser: ParserConfig,

    /// Role hierarchy resolution
    pub hierarchy: HierarchyConfig,

    /// In-process cache
    pub cache: CacheConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Permission string syntax
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Segment separator
    pub separator: String,

    /// Single-segment wildcard
    pub wildcard: String,

    /// All-match token, valid only as the whole permission string
    pub globstar: String,

    /// Compare segments case-sensitively
    pub case_sensitive: bool,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            separator: ":".to_string(),
            wildcard: "*".to_string(),
            globstar: "**".to_string(),
            case_sensitive: false,
        }
    }
}

impl From<&ParserConfig> for ParserOptions {
    fn from(config: &ParserConfig) -> Self {
        ParserOptions {
            separator: config.separator.clone(),
            wildcard: config.wildcard.clone(),
            globstar: config.globstar.clone(),
            case_sensitive: config.case_sensitive,
        }
    }
}

/// Role hierarchy resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HierarchyConfig {
    /// Deepest ancestor level, in parent hops
    pub max_depth: usize,

    /// Fail on cycles instead of skipping the cyclic edge
    pub detect_cycles: bool,

    /// Ttl of cached ancestor lists, in seconds; values past the clock's
    /// range never expire
    pub hierarchy_ttl_secs: u64,

    /// Ttl of cached inherited permission sets, in seconds
    pub permissions_ttl_secs: u64,

    /// Cache resolution results
    pub cache_enabled: bool,
}

impl Default for HierarchyConfig {
    fn default() -> Self {
        Self {
            max_depth: 10,
            detect_cycles: true,
            hierarchy_ttl_secs: 3600,
            permissions_ttl_secs: 1800,
            cache_enabled: true,
        }
    }
}

impl From<&HierarchyConfig> for ResolverOptions {
    fn from(config: &HierarchyConfig) -> Self {
        ResolverOptions {
            max_depth: config.max_depth,
            detect_cycles: config.detect_cycles,
            hierarchy_ttl: Duration::from_secs(config.hierarchy_ttl_secs),
            permissions_ttl: Duration::from_secs(config.permissions_ttl_secs),
            cache_enabled: config.cache_enabled,
        }
    }
}

/// In-process cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of cached entries
    pub capacity: usize,

    /// Ttl for entries written without one, in seconds (0 = never expire,
    /// as do values past the clock's range)
    pub default_ttl_secs: u64,

    /// Seconds between background purges (0 = no background purge)
    pub cleanup_interval_secs: u64,

    /// Maximum entries removed per purge
    pub cleanup_batch_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            default_ttl_secs: 3600,
            cleanup_interval_secs: 60,
            cleanup_batch_size: 1000,
        }
    }
}

impl CacheConfig {
    /// Background purge period handed to `MemoryCache::start_cleanup`
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

impl From<&CacheConfig> for MemoryCacheOptions {
    fn from(config: &CacheConfig) -> Self {
        MemoryCacheOptions {
            capacity: config.capacity,
            default_ttl: (config.default_ttl_secs > 0)
                .then(|| Duration::from_secs(config.default_ttl_secs)),
            cleanup_batch_size: config.cleanup_batch_size,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Output format (pretty, json)
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable output
    #[default]
    Pretty,
    /// JSON structured output
    Json,
}

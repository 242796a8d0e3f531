//! Configuration loader with layered sources
//!
//! Loads configuration from multiple sources with the following precedence
//! (highest to lowest):
//! 1. Environment variables (ROLEGATE__*)
//! 2. Configuration file (TOML)
//! 3. Default values

use crate::config::types::EngineConfig;
use crate::error::ConfigError;
use crate::permission::{ParserOptions, WildcardParser};
use config::{Config, Environment, File, FileFormat};
use std::path::Path;

/// Default configuration file paths to check (in order)
const DEFAULT_CONFIG_PATHS: &[&str] = &[
    "rolegate.toml",
    ".rolegate.toml",
    "~/.config/rolegate/config.toml",
    "/etc/rolegate/config.toml",
];

/// Environment variable prefix
const ENV_PREFIX: &str = "ROLEGATE";

/// Load configuration from a TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<EngineConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::from_str(toml_str, FileFormat::Toml))
        .build()
        .map_err(|e| ConfigError::Load(e.to_string()))?;

    let engine_config: EngineConfig = config
        .try_deserialize()
        .map_err(|e| ConfigError::Load(e.to_string()))?;

    validate_config(&engine_config)?;

    Ok(engine_config)
}

/// Load configuration from files and environment
pub fn load_config(config_path: Option<&str>) -> Result<EngineConfig, ConfigError> {
    let mut builder = Config::builder();

    if let Some(path) = config_path {
        // Explicit path provided - must exist
        let expanded = shellexpand::tilde(path);
        if !Path::new(expanded.as_ref()).exists() {
            return Err(ConfigError::Load(format!(
                "Configuration file not found: {}",
                path
            )));
        }
        builder = builder.add_source(File::new(&expanded, FileFormat::Toml));
    } else {
        // Try default paths (first existing one wins)
        for path in DEFAULT_CONFIG_PATHS {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                builder = builder.add_source(File::new(&expanded, FileFormat::Toml));
                break;
            }
        }
    }

    // e.g. ROLEGATE__HIERARCHY__MAX_DEPTH=5 -> hierarchy.max_depth
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder
        .build()
        .map_err(|e| ConfigError::Load(e.to_string()))?;

    let engine_config: EngineConfig = config
        .try_deserialize()
        .map_err(|e| ConfigError::Load(e.to_string()))?;

    validate_config(&engine_config)?;

    Ok(engine_config)
}

/// Validate configuration values
pub fn validate_config(config: &EngineConfig) -> Result<(), ConfigError> {
    // Token rules live with the parser
    WildcardParser::new(ParserOptions::from(&config.parser))?;

    if config.hierarchy.max_depth == 0 {
        return Err(ConfigError::Invalid {
            message: "hierarchy.max_depth must be greater than 0".to_string(),
        });
    }

    if config.cache.capacity == 0 {
        return Err(ConfigError::Invalid {
            message: "cache.capacity must be greater than 0".to_string(),
        });
    }

    if config.cache.cleanup_batch_size == 0 {
        return Err(ConfigError::Invalid {
            message: "cache.cleanup_batch_size must be greater than 0".to_string(),
        });
    }

    if config.logging.level.trim().is_empty() {
        return Err(ConfigError::Missing {
            field: "logging.level".to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogFormat;

    #[test]
    fn test_load_config_from_str_basic() {
        let toml = r#"
[parser]
separator = "."
case_sensitive = true

[hierarchy]
max_depth = 5

[logging]
format = "json"
"#;

        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.parser.separator, ".");
        assert!(config.parser.case_sensitive);
        assert_eq!(config.parser.wildcard, "*");
        assert_eq!(config.hierarchy.max_depth, 5);
        assert!(config.hierarchy.detect_cycles);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = load_config_from_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_zero_max_depth_error() {
        let result = load_config_from_str("[hierarchy]\nmax_depth = 0\n");
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_zero_capacity_error() {
        let result = load_config_from_str("[cache]\ncapacity = 0\n");
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_conflicting_parser_tokens() {
        let toml = r#"
[parser]
wildcard = "*"
globstar = "*"
"#;
        assert!(load_config_from_str(toml).is_err());

        let toml = r#"
[parser]
separator = ""
"#;
        assert!(load_config_from_str(toml).is_err());
    }

    #[test]
    fn test_missing_explicit_file() {
        let result = load_config(Some("/nonexistent/rolegate.toml"));
        assert!(matches!(result, Err(ConfigError::Load(msg)) if msg.contains("not found")));
    }
}

//! Configuration loading tests
//!
//! File discovery, environment overrides and validation. Tests that touch
//! process environment run serially.

use rolegate::config::{
    EngineConfig, LogFormat, load_config, load_config_from_str, validate_config,
};
use rolegate::error::ConfigError;
use rolegate::hierarchy::ResolverOptions;
use rolegate::permission::{ParserOptions, WildcardParser};
use std::env;
use std::fs;
use std::time::Duration;
use tempfile::tempdir;

#[test]
fn test_full_config() {
    let config_str = r##"
[parser]
separator = "/"
wildcard = "+"
globstar = "#"
case_sensitive = true

[hierarchy]
max_depth = 6
detect_cycles = false
hierarchy_ttl_secs = 120
permissions_ttl_secs = 60
cache_enabled = false

[cache]
capacity = 500
default_ttl_secs = 0
cleanup_interval_secs = 0
cleanup_batch_size = 50

[logging]
level = "debug"
format = "json"
"##;

    let config = load_config_from_str(config_str).unwrap();
    assert_eq!(config.parser.separator, "/");
    assert_eq!(config.hierarchy.max_depth, 6);
    assert!(!config.hierarchy.detect_cycles);
    assert_eq!(config.cache.capacity, 500);
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.logging.format, LogFormat::Json);

    let parser = WildcardParser::new(ParserOptions::from(&config.parser)).unwrap();
    assert!(parser.matches("posts/+", "posts/read"));
    assert!(parser.matches("#", "anything/at/all"));

    let options = ResolverOptions::from(&config.hierarchy);
    assert_eq!(options.hierarchy_ttl, Duration::from_secs(120));
    assert!(!options.cache_enabled);
}

#[test]
fn test_unknown_format_rejected() {
    let config_str = r#"
[logging]
format = "xml"
"#;
    assert!(matches!(
        load_config_from_str(config_str),
        Err(ConfigError::Load(_))
    ));
}

#[test]
fn test_separator_containing_wildcard_rejected() {
    let config = EngineConfig {
        parser: rolegate::config::ParserConfig {
            separator: "*".to_string(),
            wildcard: "*".to_string(),
            globstar: "**".to_string(),
            case_sensitive: false,
        },
        ..Default::default()
    };
    assert!(matches!(
        validate_config(&config),
        Err(ConfigError::Invalid { .. })
    ));
}

#[test]
#[serial_test::serial]
fn test_load_config_from_file() {
    let dir = tempdir().unwrap();
    let config_path = dir.path().join("rolegate.toml");
    fs::write(
        &config_path,
        r#"
[hierarchy]
max_depth = 3

[cache]
capacity = 42
"#,
    )
    .unwrap();

    let config = load_config(Some(config_path.to_str().unwrap())).unwrap();
    assert_eq!(config.hierarchy.max_depth, 3);
    assert_eq!(config.cache.capacity, 42);
    assert_eq!(config.parser.separator, ":");
}

#[test]
#[serial_test::serial]
fn test_env_overrides_file() {
    let dir = tempdir().unwrap();
    let config_path = dir.path().join("rolegate.toml");
    fs::write(
        &config_path,
        r#"
[hierarchy]
max_depth = 3
"#,
    )
    .unwrap();

    unsafe {
        env::set_var("ROLEGATE__HIERARCHY__MAX_DEPTH", "7");
        env::set_var("ROLEGATE__CACHE__CAPACITY", "99");
    }

    let config = load_config(Some(config_path.to_str().unwrap()));

    unsafe {
        env::remove_var("ROLEGATE__HIERARCHY__MAX_DEPTH");
        env::remove_var("ROLEGATE__CACHE__CAPACITY");
    }

    let config = config.unwrap();
    assert_eq!(config.hierarchy.max_depth, 7);
    assert_eq!(config.cache.capacity, 99);
}

#[test]
#[serial_test::serial]
fn test_invalid_env_value_fails_validation() {
    let dir = tempdir().unwrap();
    let config_path = dir.path().join("rolegate.toml");
    fs::write(&config_path, "").unwrap();

    unsafe {
        env::set_var("ROLEGATE__CACHE__CAPACITY", "0");
    }
    let result = load_config(Some(config_path.to_str().unwrap()));
    unsafe {
        env::remove_var("ROLEGATE__CACHE__CAPACITY");
    }

    assert!(matches!(result, Err(ConfigError::Invalid { .. })));
}

#[test]
fn test_missing_explicit_config_file() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("absent.toml");
    let result = load_config(Some(missing.to_str().unwrap()));
    assert!(matches!(result, Err(ConfigError::Load(_))));
}

#[tokio::test]
async fn test_huge_ttls_mean_no_expiry() {
    use rolegate::cache::{CacheProvider, CacheSetOptions, MemoryCache};
    use rolegate::hierarchy::{MemoryRoleStore, Role, RoleHierarchyResolver};
    use rolegate::permission::Permission;
    use std::sync::Arc;

    let config = load_config_from_str(
        r#"
[hierarchy]
hierarchy_ttl_secs = 9223372036854775807
permissions_ttl_secs = 9223372036854775807

[cache]
default_ttl_secs = 9223372036854775807
"#,
    )
    .unwrap();

    let cache = Arc::new(MemoryCache::new((&config.cache).into()).unwrap());
    cache
        .set("k", serde_json::json!(1), CacheSetOptions::default())
        .await
        .unwrap();
    assert_eq!(cache.get("k").await.unwrap(), Some(serde_json::json!(1)));

    let store = Arc::new(MemoryRoleStore::with_roles([
        Role::new("viewer").with_permission(Permission::new("p", "posts", "read"))
    ]));
    let resolver = RoleHierarchyResolver::new(store, ResolverOptions::from(&config.hierarchy))
        .with_cache(cache.clone());
    let permissions = resolver.get_inherited_permissions("viewer").await.unwrap();
    assert_eq!(permissions.len(), 1);
    assert_eq!(cache.len(), 3);
}

//! rolegate CLI
//!
//! Evaluates permissions against a roles file from the command line.

use anyhow::Context;
use clap::{Parser, Subcommand};
use rolegate::{
    cache::{CleanupTask, MemoryCache},
    config::{EngineConfig, LogFormat, load_config},
    hierarchy::{HierarchyTree, MemoryRoleStore, ResolverOptions, RoleHierarchyResolver},
    permission::{MatchContext, ParserOptions, PermissionMatcher, WildcardParser},
};
use serde_json::Value;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// rolegate - role-based access control with wildcard permissions
#[derive(Parser, Debug)]
#[command(name = "rolegate")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "ROLEGATE_CONFIG")]
    config: Option<String>,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long, env = "ROLEGATE_LOG_LEVEL")]
    log_level: Option<String>,

    /// Roles file (TOML, `[[roles]]` tables)
    #[arg(short, long, env = "ROLEGATE_ROLES")]
    roles: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check whether a role grants permissions (exit code 1 when denied)
    Check {
        /// Role to evaluate
        role: String,

        /// Required permissions, e.g. `posts:edit:own`
        #[arg(required = true)]
        permissions: Vec<String>,

        /// Require every permission instead of any one
        #[arg(long)]
        all: bool,

        /// Acting user id
        #[arg(long)]
        user: Option<String>,

        /// Owner id of the target resource
        #[arg(long)]
        owner: Option<String>,

        /// Context attribute as key=value (value parsed as JSON when possible)
        #[arg(long = "attr", value_parser = parse_attribute)]
        attributes: Vec<(String, Value)>,
    },

    /// Print a role's inherited permissions
    Inherited {
        role: String,
    },

    /// Print the tree of roles inheriting from a role
    Tree {
        role: String,

        /// Emit JSON instead of an indented listing
        #[arg(long)]
        json: bool,
    },

    /// Check every role for cycles, depth overflow and orphaned parents
    Validate,

    /// Show how a permission string is parsed
    Parse {
        permission: String,
    },
}

fn parse_attribute(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))?;
    if key.is_empty() {
        return Err(format!("empty attribute name in '{}'", raw));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

fn init_logging(config: &EngineConfig, level_override: Option<&str>) {
    let level = level_override.unwrap_or(&config.logging.level);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);

    match config.logging.format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Pretty => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

fn load_roles(path: Option<&str>, parser: &WildcardParser) -> anyhow::Result<MemoryRoleStore> {
    let path = path.context("a roles file is required (--roles or ROLEGATE_ROLES)")?;
    let expanded = shellexpand::tilde(path);
    let contents = std::fs::read_to_string(expanded.as_ref())
        .with_context(|| format!("failed to read roles file {}", path))?;
    let store = MemoryRoleStore::from_toml_str(&contents, parser)?;
    info!(path, roles = store.len(), "Loaded roles");
    Ok(store)
}

/// Build the resolver; with caching enabled the cache's background purge is
/// started and its handle returned
fn build_resolver(
    config: &EngineConfig,
    store: Arc<MemoryRoleStore>,
) -> anyhow::Result<(RoleHierarchyResolver, Option<CleanupTask>)> {
    let options = ResolverOptions::from(&config.hierarchy);
    let resolver = RoleHierarchyResolver::new(store, options);
    if !config.hierarchy.cache_enabled {
        return Ok((resolver, None));
    }

    let cache = MemoryCache::new((&config.cache).into())?;
    let cleanup = cache.start_cleanup(config.cache.cleanup_interval());
    Ok((resolver.with_cache(Arc::new(cache)), cleanup))
}

fn print_tree(tree: &HierarchyTree) {
    let marker = if tree.role.active { "" } else { " (inactive)" };
    println!("{}{}{}", "  ".repeat(tree.depth), tree.role.id, marker);
    for child in &tree.children {
        print_tree(child);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Parse CLI arguments
    let args = Args::parse();

    // Load configuration
    let config = load_config(args.config.as_deref())?;

    // Initialize logging
    init_logging(&config, args.log_level.as_deref());

    let parser = WildcardParser::new(ParserOptions::from(&config.parser))?;

    if let Command::Parse { permission } = &args.command {
        parser.validate(permission)?;
        let parsed = parser.parse(permission);
        println!("{}", serde_json::to_string_pretty(&parsed)?);
        println!("specificity: {}", parser.specificity(&parsed));
        return Ok(ExitCode::SUCCESS);
    }

    let store = Arc::new(load_roles(args.roles.as_deref(), &parser)?);
    let (resolver, cleanup) = build_resolver(&config, store.clone())?;

    let result = run(args.command, &resolver, &store, parser).await;

    if let Some(task) = cleanup {
        task.stop().await;
    }
    result
}

async fn run(
    command: Command,
    resolver: &RoleHierarchyResolver,
    store: &MemoryRoleStore,
    parser: WildcardParser,
) -> anyhow::Result<ExitCode> {
    match command {
        // Handled before roles are loaded
        Command::Parse { .. } => Ok(ExitCode::SUCCESS),

        Command::Check {
            role,
            permissions,
            all,
            user,
            owner,
            attributes,
        } => {
            let available = resolver.get_inherited_permissions(&role).await?;

            let mut context = MatchContext::new();
            if let Some(user) = user {
                context = context.with_user(user);
            }
            if let Some(owner) = owner {
                context = context.with_owner(owner);
            }
            for (key, value) in attributes {
                context = context.with_attribute(key, value);
            }

            let matcher = PermissionMatcher::new(parser);
            let mut granted = 0;
            for required in &permissions {
                let result = matcher.find_best_match(required, &available, Some(&context));
                if result.matched {
                    granted += 1;
                    println!(
                        "ALLOW {} via {} (score {}, {})",
                        required,
                        result.pattern.as_deref().unwrap_or("?"),
                        result.score,
                        result.reason
                    );
                } else {
                    println!("DENY  {} ({})", required, result.reason);
                }
            }

            let allowed = if all {
                granted == permissions.len()
            } else {
                granted > 0
            };
            info!(role = %role, allowed, granted, required = permissions.len(), "Check complete");
            Ok(if allowed {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }

        Command::Inherited { role } => {
            for permission in resolver.get_inherited_permissions(&role).await? {
                println!("{}\t{}", permission.id, permission);
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::Tree { role, json } => {
            let tree = resolver.get_hierarchy_tree(&role).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&tree)?);
            } else {
                print_tree(&tree);
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::Validate => {
            let known = store.role_ids();
            let mut problems = 0;

            for id in &known {
                if let Some(role) = store.get(id) {
                    for parent in role.parent_roles.iter().filter(|p| !known.contains(*p)) {
                        warn!(role_id = %id, parent_id = %parent, "Orphaned parent reference");
                        println!("WARN  {}: parent '{}' does not exist", id, parent);
                    }
                }

                if let Some(chain) = resolver.find_cycle(id).await? {
                    problems += 1;
                    println!("ERROR {}: cycle {}", id, chain.join(" -> "));
                } else if let Err(e) = resolver.get_parent_roles(id, None).await {
                    problems += 1;
                    error!(role_id = %id, error = %e, "Hierarchy check failed");
                    println!("ERROR {}: {}", id, e);
                }
            }

            if problems == 0 {
                println!("OK    {} roles", known.len());
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::FAILURE)
            }
        }
    }
}

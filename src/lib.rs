//! rolegate
//!
//! An embeddable role-based / attribute-based access control engine.
//!
//! ## Features
//!
//! - **Wildcard permissions** in the form `resource:action[:scope]`, with `*`
//!   per segment and `**` as the all-match token
//! - **Scored matching** that picks the most specific granting permission and
//!   evaluates ownership scopes and attribute conditions
//! - **Role inheritance** over a many-to-many parent graph, with cycle and
//!   depth checks that always report the offending id chain
//! - **Caching** through LRU and TTL strategies behind an async provider trait
//!
//! ## Permission Model
//!
//! ```text
//! role → parent roles → ... → inherited permission set → best match
//! ```
//!
//! A role's own permissions shadow an ancestor's permission with the same id.
//!
//! ## Example Configuration
//!
//! ```toml
//! [parser]
//! separator = ":"
//! case_sensitive = false
//!
//! [hierarchy]
//! max_depth = 10
//! detect_cycles = true
//!
//! [cache]
//! capacity = 10000
//! default_ttl_secs = 3600
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod hierarchy;
pub mod permission;

// Re-export main types
pub use cache::{CacheProvider, LruStrategy, MemoryCache, TtlStrategy};
pub use config::{EngineConfig, load_config};
pub use error::{CacheError, ConfigError, RoleError};
pub use hierarchy::{MemoryRoleStore, Role, RoleHierarchyResolver, RoleSource};
pub use permission::{MatchContext, Permission, PermissionMatcher, WildcardParser};

//! Role hierarchy
//!
//! Roles inherit from parent roles (child → parent edges, many-to-many).
//! The resolver walks those edges to collect ancestors and inherited
//! permissions, and reports cycles with the full id chain:
//!
//! ```text
//! admin → editor → viewer
//!   └──────────────↗
//! ```

pub mod graph;
pub mod resolver;
pub mod source;
pub mod types;

pub use graph::{Ancestry, RoleGraph};
pub use resolver::{
    DEFAULT_MAX_DEPTH, ResolverOptions, RoleHierarchyResolver, hierarchy_cache_key,
    permissions_cache_key,
};
pub use source::{MemoryRoleStore, RoleSource};
pub use types::{HierarchyTree, HierarchyValidation, Role};

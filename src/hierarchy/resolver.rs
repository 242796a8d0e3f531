//! Role hierarchy resolver
//!
//! Expands a role into its ancestors and inherited permissions. Roles are
//! fetched from a [`RoleSource`] into a [`RoleGraph`] snapshot first; all
//! traversal then runs over the snapshot, so one resolution sees one
//! consistent view of the graph.
//!
//! Results may be cached through an optional [`CacheProvider`]. The cache is
//! strictly an optimization: read or write failures are logged and the
//! result is recomputed.

use crate::cache::{CacheProvider, CacheSetOptions};
use crate::error::{RoleError, RoleResult};
use crate::hierarchy::graph::RoleGraph;
use crate::hierarchy::source::RoleSource;
use crate::hierarchy::types::{HierarchyTree, HierarchyValidation, Role};
use crate::permission::Permission;
use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Default maximum number of parent hops from a role
pub const DEFAULT_MAX_DEPTH: usize = 10;

/// Resolver behaviour
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverOptions {
    /// Deepest ancestor level allowed, counted in parent hops
    pub max_depth: usize,
    /// Abort on cycles and depth overflow instead of skipping the edge
    pub detect_cycles: bool,
    /// Ttl of cached ancestor lists
    pub hierarchy_ttl: Duration,
    /// Ttl of cached inherited permission sets
    pub permissions_ttl: Duration,
    /// Use the cache provider, when one is attached
    pub cache_enabled: bool,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            detect_cycles: true,
            hierarchy_ttl: Duration::from_secs(3600),
            permissions_ttl: Duration::from_secs(1800),
            cache_enabled: true,
        }
    }
}

/// Cache key of a role's inherited permission set
pub fn permissions_cache_key(role_id: &str) -> String {
    format!("role:{}:permissions", role_id)
}

/// Cache key of a role's ancestor list at a given depth limit
pub fn hierarchy_cache_key(role_id: &str, max_depth: usize) -> String {
    format!("role:{}:hierarchy:d{}", role_id, max_depth)
}

fn role_tag(role_id: &str) -> String {
    format!("role:{}", role_id)
}

/// Resolves role inheritance over a [`RoleSource`]
pub struct RoleHierarchyResolver {
    source: Arc<dyn RoleSource>,
    cache: Option<Arc<dyn CacheProvider>>,
    options: ResolverOptions,
}

impl std::fmt::Debug for RoleHierarchyResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoleHierarchyResolver")
            .field("options", &self.options)
            .field("cached", &self.cache.is_some())
            .finish_non_exhaustive()
    }
}

impl RoleHierarchyResolver {
    pub fn new(source: Arc<dyn RoleSource>, options: ResolverOptions) -> Self {
        Self {
            source,
            cache: None,
            options,
        }
    }

    /// Attach a cache provider
    pub fn with_cache(mut self, cache: Arc<dyn CacheProvider>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn options(&self) -> &ResolverOptions {
        &self.options
    }

    /// A role's own permissions plus every active ancestor's, deduplicated by id
    ///
    /// On an id collision the closer role wins: direct permissions come
    /// first, then ancestors in traversal order. An inactive role grants
    /// nothing.
    pub async fn get_inherited_permissions(&self, role_id: &str) -> RoleResult<Vec<Permission>> {
        debug!(role_id, "Resolving inherited permissions");

        let key = permissions_cache_key(role_id);
        if let Some(cached) = self.cache_get::<Vec<Permission>>(&key).await {
            return Ok(cached);
        }

        let root = self.require_role(role_id).await?;
        let permissions = if root.active {
            let ancestors = self.resolve_ancestors(root.clone(), self.options.max_depth).await?;
            collect_permissions(&root, &ancestors)
        } else {
            trace!(role_id, "Inactive role grants no permissions");
            Vec::new()
        };

        self.cache_put(&key, &permissions, self.options.permissions_ttl, role_id)
            .await;
        Ok(permissions)
    }

    /// Ancestors of a role, each once, depth-first in parent-list order
    ///
    /// `max_depth` defaults to the configured limit.
    pub async fn get_parent_roles(
        &self,
        role_id: &str,
        max_depth: Option<usize>,
    ) -> RoleResult<Vec<Role>> {
        let max_depth = max_depth.unwrap_or(self.options.max_depth);
        debug!(role_id, max_depth, "Resolving parent roles");

        let root = self.require_role(role_id).await?;
        self.resolve_ancestors(root, max_depth).await
    }

    /// The role followed by its ancestors
    pub async fn get_all_roles_in_hierarchy(&self, role_id: &str) -> RoleResult<Vec<Role>> {
        let root = self.require_role(role_id).await?;
        let mut roles = vec![root.clone()];
        roles.extend(self.resolve_ancestors(root, self.options.max_depth).await?);
        Ok(roles)
    }

    /// Whether any single path upward from the role revisits a role
    ///
    /// A role missing from the source has no cycle.
    pub async fn has_circular_dependency(&self, role_id: &str) -> RoleResult<bool> {
        Ok(self.find_cycle(role_id).await?.is_some())
    }

    /// The first cycle reachable upward from the role, as a closed id chain
    pub async fn find_cycle(&self, role_id: &str) -> RoleResult<Option<Vec<String>>> {
        let Some(root) = self.source.find_role_by_id(role_id).await? else {
            return Ok(None);
        };
        let graph = self.load_graph(root).await?;
        Ok(graph.find_cycle())
    }

    /// Pre-flight check for making `parent_id` a parent of `child_id`
    ///
    /// Rejects self-reference, a missing parent, and any edge that would
    /// close a cycle because `child_id` is already an ancestor of
    /// `parent_id`. Nothing is modified.
    pub async fn validate_hierarchy(
        &self,
        child_id: &str,
        parent_id: &str,
    ) -> RoleResult<HierarchyValidation> {
        if child_id == parent_id {
            return Ok(HierarchyValidation::Invalid(format!(
                "Role '{}' cannot be its own parent",
                child_id
            )));
        }

        let Some(parent) = self.source.find_role_by_id(parent_id).await? else {
            return Ok(HierarchyValidation::Invalid(format!(
                "Parent role '{}' does not exist",
                parent_id
            )));
        };

        let graph = self.load_graph(parent).await?;
        if let Some(path) = graph.path_to(child_id) {
            let chain: Vec<&str> = std::iter::once(child_id)
                .chain(path.iter().map(String::as_str))
                .collect();
            return Ok(HierarchyValidation::Invalid(format!(
                "Adding '{}' as a parent of '{}' would create a cycle: {}",
                parent_id,
                child_id,
                chain.join(" -> ")
            )));
        }

        Ok(HierarchyValidation::Valid)
    }

    /// Whether `ancestor_id` is reachable from `role_id` through parent edges
    pub async fn is_ancestor(&self, ancestor_id: &str, role_id: &str) -> RoleResult<bool> {
        let root = self.require_role(role_id).await?;
        let graph = self.load_graph(root).await?;
        Ok(graph.path_to(ancestor_id).is_some())
    }

    /// Length of the longest parent chain above the role; 0 without parents
    pub async fn get_role_depth(&self, role_id: &str) -> RoleResult<usize> {
        let root = self.require_role(role_id).await?;
        let graph = self.load_graph(root).await?;
        let ancestry = graph.ancestors(self.options.max_depth, self.options.detect_cycles)?;
        Ok(ancestry.height)
    }

    /// Roles that list this role as a parent
    pub async fn get_child_roles(&self, role_id: &str) -> RoleResult<Vec<Role>> {
        self.source.find_child_roles(role_id).await
    }

    /// Every role inheriting from this one, directly or transitively, breadth-first
    pub async fn get_descendant_roles(&self, role_id: &str) -> RoleResult<Vec<Role>> {
        let mut visited = HashSet::from([role_id.to_string()]);
        let mut queue = VecDeque::from([role_id.to_string()]);
        let mut descendants = Vec::new();

        while let Some(id) = queue.pop_front() {
            for child in self.source.find_child_roles(&id).await? {
                if visited.insert(child.id.clone()) {
                    queue.push_back(child.id.clone());
                    descendants.push(child);
                }
            }
        }
        Ok(descendants)
    }

    /// Tree of the role and its descendants, walking child edges
    ///
    /// A child already on the path from the root is pruned; the tree stops
    /// growing at the configured max depth.
    pub async fn get_hierarchy_tree(&self, root_id: &str) -> RoleResult<HierarchyTree> {
        debug!(root_id, "Building hierarchy tree");
        let root = self.require_role(root_id).await?;
        self.build_tree(root, 0, Vec::new()).await
    }

    fn build_tree(
        &self,
        role: Role,
        depth: usize,
        mut path: Vec<String>,
    ) -> BoxFuture<'_, RoleResult<HierarchyTree>> {
        async move {
            let mut children = Vec::new();
            if depth < self.options.max_depth {
                path.push(role.id.clone());
                for child in self.source.find_child_roles(&role.id).await? {
                    if path.contains(&child.id) {
                        trace!(role_id = %child.id, "Pruning cyclic child edge");
                        continue;
                    }
                    children.push(self.build_tree(child, depth + 1, path.clone()).await?);
                }
            }
            Ok(HierarchyTree {
                role,
                children,
                depth,
            })
        }
        .boxed()
    }

    /// Drop cached entries for the role and all of its descendants
    ///
    /// Descendants cached a snapshot of this role's permissions, so they go
    /// stale with it. Returns the number of cache entries removed; 0 when no
    /// cache is attached.
    pub async fn invalidate_cache(&self, role_id: &str) -> RoleResult<usize> {
        let Some(cache) = self.cache() else {
            return Ok(0);
        };

        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([role_id.to_string()]);
        let mut removed = 0;

        while let Some(id) = queue.pop_front() {
            if !visited.insert(id.clone()) {
                continue;
            }
            let pattern = format!("{}:*", role_tag(&id));
            match cache.delete_pattern(&pattern).await {
                Ok(count) => removed += count,
                Err(e) => warn!(role_id = %id, error = %e, "Failed to invalidate cached role"),
            }
            for child in self.source.find_child_roles(&id).await? {
                if !visited.contains(&child.id) {
                    queue.push_back(child.id);
                }
            }
        }

        debug!(role_id, roles = visited.len(), removed, "Invalidated role cache");
        Ok(removed)
    }

    async fn require_role(&self, role_id: &str) -> RoleResult<Role> {
        self.source
            .find_role_by_id(role_id)
            .await?
            .ok_or_else(|| RoleError::not_found(role_id))
    }

    /// Fetch every role reachable from `root` through parent edges
    async fn load_graph(&self, root: Role) -> RoleResult<RoleGraph> {
        let mut queue: VecDeque<String> = root.parent_roles.iter().cloned().collect();
        let mut missing = HashSet::new();
        let mut graph = RoleGraph::new(root);

        while let Some(id) = queue.pop_front() {
            if graph.contains(&id) || missing.contains(&id) {
                continue;
            }
            match self.source.find_role_by_id(&id).await? {
                Some(role) => {
                    queue.extend(role.parent_roles.iter().cloned());
                    graph.insert(role);
                }
                None => {
                    trace!(role_id = %id, "Parent role not found");
                    missing.insert(id);
                }
            }
        }
        Ok(graph)
    }

    async fn resolve_ancestors(&self, root: Role, max_depth: usize) -> RoleResult<Vec<Role>> {
        let key = hierarchy_cache_key(&root.id, max_depth);
        if let Some(cached) = self.cache_get::<Vec<Role>>(&key).await {
            return Ok(cached);
        }

        let role_id = root.id.clone();
        let graph = self.load_graph(root).await?;
        let ancestry = graph.ancestors(max_depth, self.options.detect_cycles)?;
        let ancestors: Vec<Role> = ancestry
            .ids
            .iter()
            .filter_map(|id| graph.get(id).cloned())
            .collect();

        self.cache_put(&key, &ancestors, self.options.hierarchy_ttl, &role_id)
            .await;
        Ok(ancestors)
    }

    fn cache(&self) -> Option<&Arc<dyn CacheProvider>> {
        if self.options.cache_enabled {
            self.cache.as_ref()
        } else {
            None
        }
    }

    async fn cache_get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let cache = self.cache()?;
        match cache.get(key).await {
            Ok(Some(value)) => match serde_json::from_value(value) {
                Ok(decoded) => {
                    trace!(key, "Cache hit");
                    Some(decoded)
                }
                Err(e) => {
                    warn!(key, error = %e, "Discarding undecodable cache entry");
                    None
                }
            },
            Ok(None) => {
                trace!(key, "Cache miss");
                None
            }
            Err(e) => {
                warn!(key, error = %e, "Cache read failed");
                None
            }
        }
    }

    async fn cache_put<T: Serialize>(&self, key: &str, value: &T, ttl: Duration, role_id: &str) {
        let Some(cache) = self.cache() else {
            return;
        };
        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "Failed to serialize cache entry");
                return;
            }
        };
        let options = CacheSetOptions::with_ttl(ttl).tag(role_tag(role_id));
        if let Err(e) = cache.set(key, value, options).await {
            warn!(key, error = %e, "Cache write failed");
        }
    }
}

fn collect_permissions(root: &Role, ancestors: &[Role]) -> Vec<Permission> {
    let mut seen = HashSet::new();
    let mut permissions = Vec::new();

    let sources = std::iter::once(root).chain(ancestors.iter().filter(|role| role.active));
    for role in sources {
        for permission in &role.permissions {
            if seen.insert(permission.id.as_str()) {
                permissions.push(permission.clone());
            }
        }
    }
    permissions
}

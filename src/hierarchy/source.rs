//! Role data source
//!
//! The resolver reads roles through the [`RoleSource`] trait; persistence is
//! the implementor's concern. [`MemoryRoleStore`] is an in-process
//! implementation used by the CLI and tests, loadable from a TOML roles file:
//!
//! ```toml
//! [[roles]]
//! id = "viewer"
//! permissions = ["posts:read", "comments:read"]
//!
//! [[roles]]
//! id = "editor"
//! parent_roles = ["viewer"]
//! permissions = [
//!     "posts:edit:own",
//!     { id = "docs-eng", resource = "docs", action = "read", conditions = { department = "eng" } },
//! ]
//! ```

use crate::error::{ConfigError, RoleError};
use crate::hierarchy::types::Role;
use crate::permission::{Permission, WildcardParser};
// async_trait required for dyn-compatibility with Arc<dyn RoleSource>
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Read access to roles
///
/// Returned roles are snapshots; the resolver never writes through them.
#[async_trait]
pub trait RoleSource: Send + Sync {
    /// Look up a role; `Ok(None)` when it does not exist
    async fn find_role_by_id(&self, id: &str) -> Result<Option<Role>, RoleError>;

    /// Roles that list `parent_id` among their parents
    async fn find_child_roles(&self, parent_id: &str) -> Result<Vec<Role>, RoleError>;
}

/// In-memory role store
#[derive(Debug, Default)]
pub struct MemoryRoleStore {
    roles: RwLock<HashMap<String, Role>>,
}

impl MemoryRoleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_roles(roles: impl IntoIterator<Item = Role>) -> Self {
        let store = Self::new();
        for role in roles {
            store.insert(role);
        }
        store
    }

    /// Load roles from a TOML document (see module docs for the format)
    pub fn from_toml_str(toml_str: &str, parser: &WildcardParser) -> Result<Self, ConfigError> {
        let file: RolesFile =
            toml::from_str(toml_str).map_err(|e| ConfigError::Load(e.to_string()))?;

        let mut roles = Vec::with_capacity(file.roles.len());
        for entry in file.roles {
            let mut permissions = Vec::with_capacity(entry.permissions.len());
            for raw in entry.permissions {
                permissions.push(raw.into_permission(parser)?);
            }
            roles.push(Role {
                id: entry.id,
                permissions,
                parent_roles: entry.parent_roles,
                active: entry.active,
            });
        }

        Ok(Self::with_roles(roles))
    }

    /// Insert or replace a role
    pub fn insert(&self, role: Role) -> Option<Role> {
        self.write().insert(role.id.clone(), role)
    }

    pub fn remove(&self, id: &str) -> Option<Role> {
        self.write().remove(id)
    }

    /// Append a parent edge without any validation
    ///
    /// Returns false when the child does not exist.
    pub fn add_parent(&self, child_id: &str, parent_id: &str) -> bool {
        match self.write().get_mut(child_id) {
            Some(role) => {
                if !role.parent_roles.iter().any(|p| p == parent_id) {
                    role.parent_roles.push(parent_id.to_string());
                }
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: &str) -> Option<Role> {
        self.read().get(id).cloned()
    }

    /// All role ids, sorted
    pub fn role_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    // Recover from poisoning; the map is always left consistent
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Role>> {
        self.roles.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Role>> {
        self.roles.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl RoleSource for MemoryRoleStore {
    async fn find_role_by_id(&self, id: &str) -> Result<Option<Role>, RoleError> {
        Ok(self.get(id))
    }

    async fn find_child_roles(&self, parent_id: &str) -> Result<Vec<Role>, RoleError> {
        let mut children: Vec<Role> = self
            .read()
            .values()
            .filter(|role| role.parent_roles.iter().any(|p| p == parent_id))
            .cloned()
            .collect();
        children.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(children)
    }
}

#[derive(Debug, Deserialize)]
struct RolesFile {
    #[serde(default)]
    roles: Vec<RoleEntry>,
}

#[derive(Debug, Deserialize)]
struct RoleEntry {
    id: String,
    #[serde(default)]
    parent_roles: Vec<String>,
    #[serde(default)]
    permissions: Vec<PermissionSpec>,
    #[serde(default = "default_active")]
    active: bool,
}

fn default_active() -> bool {
    true
}

/// A permission given either as a wire-format string or as a full table
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PermissionSpec {
    Short(String),
    Full(Permission),
}

impl PermissionSpec {
    fn into_permission(self, parser: &WildcardParser) -> Result<Permission, ConfigError> {
        match self {
            PermissionSpec::Full(permission) => Ok(permission),
            PermissionSpec::Short(s) => {
                parser.validate(&s)?;
                let parsed = parser.parse(&s);
                // Only the bare globstar becomes the superadmin table form
                if parsed.is_globstar {
                    let globstar = parser.options().globstar.clone();
                    return Ok(Permission::new(s, globstar, parser.options().wildcard.clone()));
                }
                Ok(Permission {
                    id: s,
                    resource: parsed.resource,
                    action: parsed.action,
                    scope: parsed.scope,
                    conditions: None,
                    metadata: None,
                })
            }
        }
    }
}

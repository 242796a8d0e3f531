//! Role hierarchy types

use crate::permission::Permission;
use serde::{Deserialize, Serialize};

/// A role in the hierarchy
///
/// `parent_roles` are directed edges child → parent ("inherits from").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Role {
    pub id: String,
    #[serde(default)]
    pub permissions: Vec<Permission>,
    #[serde(default)]
    pub parent_roles: Vec<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl Role {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            permissions: Vec::new(),
            parent_roles: Vec::new(),
            active: true,
        }
    }

    pub fn with_permission(mut self, permission: Permission) -> Self {
        self.permissions.push(permission);
        self
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_roles.push(parent_id.into());
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    pub fn has_parents(&self) -> bool {
        !self.parent_roles.is_empty()
    }
}

/// A role with its descendants, built by walking child edges
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HierarchyTree {
    pub role: Role,
    pub children: Vec<HierarchyTree>,
    pub depth: usize,
}

impl HierarchyTree {
    /// Number of nodes in the tree
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(HierarchyTree::size).sum::<usize>()
    }

    /// Node ids in depth-first pre-order
    pub fn ids(&self) -> Vec<&str> {
        let mut ids = vec![self.role.id.as_str()];
        for child in &self.children {
            ids.extend(child.ids());
        }
        ids
    }

    pub fn find(&self, role_id: &str) -> Option<&HierarchyTree> {
        if self.role.id == role_id {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(role_id))
    }
}

/// Result of a pre-flight check on a new parent edge
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HierarchyValidation {
    /// The edge can be added safely
    Valid,
    /// The edge must be rejected
    Invalid(String),
}

impl HierarchyValidation {
    pub fn is_valid(&self) -> bool {
        matches!(self, HierarchyValidation::Valid)
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            HierarchyValidation::Valid => None,
            HierarchyValidation::Invalid(reason) => Some(reason),
        }
    }
}

//! Error types for rolegate
//!
//! This module defines the error hierarchy used throughout the engine.
//! We use `thiserror` for library-style errors that are part of the API.
//! A permission that simply does not match is never an error: it is reported
//! as a [`MatchResult`](crate::permission::MatchResult) with `matched == false`.

use std::fmt;
use thiserror::Error;

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(String),

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required configuration: {field}")]
    Missing { field: String },

    #[error("Invalid permission '{permission}': {reason}")]
    InvalidPermission { permission: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    pub fn invalid(message: impl Into<String>) -> Self {
        ConfigError::Invalid {
            message: message.into(),
        }
    }
}

/// The shape of a cycle (or runaway chain) found in the role graph
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleKind {
    /// A role lists itself as a parent
    SelfReference,
    /// Two roles list each other as parents
    Direct,
    /// A cycle spanning three or more roles
    Indirect,
    /// The ancestor chain grew past the configured maximum depth
    MaxDepthExceeded,
}

impl CycleKind {
    /// Classify a closed chain such as `[a, b, a]`.
    ///
    /// The chain may carry a non-cyclic prefix (`[x, a, b, a]`); only the
    /// looping tail is measured.
    pub fn from_chain(chain: &[String]) -> Self {
        let Some(last) = chain.last() else {
            return CycleKind::Indirect;
        };
        let start = chain
            .iter()
            .position(|id| id == last)
            .unwrap_or_default();
        match chain.len() - 1 - start {
            0 | 1 => CycleKind::SelfReference,
            2 => CycleKind::Direct,
            _ => CycleKind::Indirect,
        }
    }
}

impl fmt::Display for CycleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CycleKind::SelfReference => "self-reference",
            CycleKind::Direct => "direct cycle",
            CycleKind::Indirect => "indirect cycle",
            CycleKind::MaxDepthExceeded => "maximum depth exceeded",
        };
        f.write_str(s)
    }
}

/// Errors raised while resolving the role hierarchy
#[derive(Error, Debug)]
pub enum RoleError {
    #[error("Role not found: {role_id}")]
    NotFound { role_id: String },

    #[error("Circular dependency ({kind}): {}{}", .chain.join(" -> "), depth_suffix(.depth, .max_depth))]
    CircularDependency {
        kind: CycleKind,
        chain: Vec<String>,
        depth: Option<usize>,
        max_depth: Option<usize>,
    },

    #[error("Role source error: {0}")]
    Source(String),
}

fn depth_suffix(depth: &Option<usize>, max_depth: &Option<usize>) -> String {
    match (depth, max_depth) {
        (Some(depth), Some(max)) => format!(" (depth {} exceeds maximum {})", depth, max),
        _ => String::new(),
    }
}

impl RoleError {
    pub fn not_found(role_id: impl Into<String>) -> Self {
        RoleError::NotFound {
            role_id: role_id.into(),
        }
    }

    /// Create a cycle error from the discovered chain, classifying its shape
    pub fn cycle(chain: Vec<String>) -> Self {
        RoleError::CircularDependency {
            kind: CycleKind::from_chain(&chain),
            chain,
            depth: None,
            max_depth: None,
        }
    }

    pub fn max_depth(chain: Vec<String>, depth: usize, max_depth: usize) -> Self {
        RoleError::CircularDependency {
            kind: CycleKind::MaxDepthExceeded,
            chain,
            depth: Some(depth),
            max_depth: Some(max_depth),
        }
    }

    /// The id chain carried by a cycle/depth error
    pub fn chain(&self) -> Option<&[String]> {
        match self {
            RoleError::CircularDependency { chain, .. } => Some(chain),
            _ => None,
        }
    }

    pub fn is_circular(&self) -> bool {
        matches!(self, RoleError::CircularDependency { .. })
    }
}

/// Cache collaborator errors
///
/// These never escape the resolver: a failing cache only forces recomputation.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache backend error: {0}")]
    Backend(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid key pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

/// Hard failure for callers that demand an error on a non-match
#[derive(Error, Debug)]
#[error("Permission '{permission}' denied: {reason}")]
pub struct PermissionDeniedError {
    pub permission: String,
    pub reason: String,
}

impl PermissionDeniedError {
    pub fn new(permission: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            permission: permission.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for hierarchy operations
pub type RoleResult<T> = std::result::Result<T, RoleError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_cycle_kind_from_chain() {
        assert_eq!(CycleKind::from_chain(&chain(&["a", "a"])), CycleKind::SelfReference);
        assert_eq!(CycleKind::from_chain(&chain(&["a", "b", "a"])), CycleKind::Direct);
        assert_eq!(
            CycleKind::from_chain(&chain(&["a", "b", "c", "a"])),
            CycleKind::Indirect
        );
        // Prefix before the loop is ignored
        assert_eq!(
            CycleKind::from_chain(&chain(&["x", "a", "b", "a"])),
            CycleKind::Direct
        );
    }

    #[test]
    fn test_cycle_error_display_contains_chain() {
        let err = RoleError::cycle(chain(&["admin", "editor", "admin"]));
        let msg = err.to_string();
        assert!(msg.contains("admin -> editor -> admin"));
        assert!(msg.contains("direct cycle"));
        assert_eq!(err.chain().unwrap().len(), 3);
        assert!(err.is_circular());
    }

    #[test]
    fn test_max_depth_error_display() {
        let err = RoleError::max_depth(chain(&["a", "b", "c"]), 2, 1);
        let msg = err.to_string();
        assert!(msg.contains("maximum depth exceeded"));
        assert!(msg.contains("depth 2 exceeds maximum 1"));
    }

    #[test]
    fn test_not_found_is_not_circular() {
        let err = RoleError::not_found("ghost");
        assert!(!err.is_circular());
        assert!(err.chain().is_none());
        assert_eq!(err.to_string(), "Role not found: ghost");
    }
}

//! Permission types
//!
//! Core types used by the parser and matcher.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// A permission granted to a role
///
/// Owned by the role data source; the engine only reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Permission {
    pub id: String,
    pub resource: String,
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Attribute name → expected value; every entry must equal the context attribute
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<HashMap<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, Value>>,
}

impl Permission {
    pub fn new(id: impl Into<String>, resource: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            resource: resource.into(),
            action: action.into(),
            scope: None,
            conditions: None,
            metadata: None,
        }
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn with_condition(mut self, attribute: impl Into<String>, expected: impl Into<Value>) -> Self {
        self.conditions
            .get_or_insert_with(HashMap::new)
            .insert(attribute.into(), expected.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
        self
    }

    /// Whether this permission carries at least one ABAC condition
    pub fn has_conditions(&self) -> bool {
        self.conditions.as_ref().is_some_and(|c| !c.is_empty())
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.resource, self.action)?;
        if let Some(scope) = &self.scope {
            write!(f, ":{}", scope)?;
        }
        Ok(())
    }
}

/// Runtime context for scope and condition evaluation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchContext {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub resource_owner_id: Option<String>,
    #[serde(default)]
    pub attributes: HashMap<String, Value>,
}

impl MatchContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_owner(mut self, owner_id: impl Into<String>) -> Self {
        self.resource_owner_id = Some(owner_id.into());
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// True only when both ids are present and equal
    pub fn is_owner(&self) -> bool {
        match (&self.user_id, &self.resource_owner_id) {
            (Some(user), Some(owner)) => user == owner,
            _ => false,
        }
    }
}

/// Why a candidate permission matched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchReason {
    /// Globstar grant (`**`)
    Superadmin,
    /// Wildcard resource and action (`*:*`)
    FullWildcard,
    /// Wildcard resource (`*:read`)
    ResourceWildcard,
    /// Wildcard action (`users:*`)
    ActionWildcard,
    /// Concrete resource and action
    ExactMatch,
    /// Nothing matched
    NoMatch,
}

impl MatchReason {
    pub const fn as_str(&self) -> &'static str {
        match self {
            MatchReason::Superadmin => "Superadmin permission (**)",
            MatchReason::FullWildcard => "Full wildcard permission (*:*)",
            MatchReason::ResourceWildcard => "Resource wildcard permission",
            MatchReason::ActionWildcard => "Action wildcard permission",
            MatchReason::ExactMatch => "Exact permission match",
            MatchReason::NoMatch => "No matching permission found",
        }
    }
}

impl fmt::Display for MatchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of evaluating a required permission against a permission set
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    pub matched: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permission: Option<Permission>,
    /// The candidate rendered as a permission string
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    pub score: u32,
    pub reason: MatchReason,
}

impl MatchResult {
    pub fn no_match() -> Self {
        Self {
            matched: false,
            permission: None,
            pattern: None,
            score: 0,
            reason: MatchReason::NoMatch,
        }
    }

    pub fn is_match(&self) -> bool {
        self.matched
    }
}

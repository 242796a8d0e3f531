//! Permission parsing and matching
//!
//! Permission strings follow the wire format `resource:action[:scope]`:
//!
//! ```text
//! users:read          concrete resource and action
//! users:*             any action on users
//! *:read              read on any resource
//! posts:edit:own      scoped to resources the caller owns
//! **                  everything (only valid as the whole string)
//! ```
//!
//! [`WildcardParser`] handles the string format, [`PermissionMatcher`] layers
//! ownership scopes, ABAC conditions and specificity scoring on top.

pub mod matcher;
pub mod parser;
pub mod types;

pub use matcher::{PermissionMatcher, SCOPE_ALL, SCOPE_OWN};
pub use parser::{ParsedPermission, ParserOptions, WildcardParser};
pub use types::{MatchContext, MatchReason, MatchResult, Permission};

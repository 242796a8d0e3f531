//! Wildcard permission parser
//!
//! Permission strings have the form `resource:action[:scope]`. A single
//! wildcard token (`*` by default) stands in for any one segment, and the
//! globstar token (`**`) grants everything, but only when it is the whole
//! string.

use crate::error::ConfigError;
use regex::Regex;
use serde::Serialize;
use std::cmp::Reverse;
use std::sync::LazyLock;

/// Characters allowed in a concrete permission segment
static SEGMENT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9_-]+$").expect("segment pattern is a valid regex")
});

/// Maximum number of segments in a permission string
const MAX_SEGMENTS: usize = 3;

/// Parser tokens and case handling
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParserOptions {
    pub separator: String,
    pub wildcard: String,
    pub globstar: String,
    pub case_sensitive: bool,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            separator: ":".to_string(),
            wildcard: "*".to_string(),
            globstar: "**".to_string(),
            case_sensitive: false,
        }
    }
}

/// A permission string broken into its segments
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedPermission {
    pub resource: String,
    pub action: String,
    pub scope: Option<String>,
    pub is_resource_wildcard: bool,
    pub is_action_wildcard: bool,
    pub is_scope_wildcard: bool,
    pub is_globstar: bool,
    pub original: String,
}

impl ParsedPermission {
    /// Scope that is present and not a wildcard
    pub fn concrete_scope(&self) -> Option<&str> {
        match &self.scope {
            Some(scope) if !self.is_scope_wildcard => Some(scope.as_str()),
            _ => None,
        }
    }
}

/// Parses permission strings and answers pattern matches
#[derive(Debug, Clone, Default)]
pub struct WildcardParser {
    options: ParserOptions,
}

impl WildcardParser {
    /// Create a parser with custom tokens
    pub fn new(options: ParserOptions) -> Result<Self, ConfigError> {
        if options.separator.is_empty() {
            return Err(ConfigError::invalid("permission separator must not be empty"));
        }
        if options.wildcard.is_empty() || options.globstar.is_empty() {
            return Err(ConfigError::invalid("wildcard tokens must not be empty"));
        }
        if options.wildcard == options.globstar {
            return Err(ConfigError::invalid(
                "wildcard and globstar tokens must differ",
            ));
        }
        if options.separator.contains(&options.wildcard) {
            return Err(ConfigError::invalid(format!(
                "separator '{}' must not contain the wildcard token '{}'",
                options.separator, options.wildcard
            )));
        }
        Ok(Self { options })
    }

    pub fn options(&self) -> &ParserOptions {
        &self.options
    }

    fn fold_case(&self, s: &str) -> String {
        let trimmed = s.trim();
        if self.options.case_sensitive {
            trimmed.to_string()
        } else {
            trimmed.to_lowercase()
        }
    }

    fn is_wildcard_token(&self, segment: &str) -> bool {
        segment == self.options.wildcard || segment == self.options.globstar
    }

    /// Parse a permission string
    ///
    /// Never fails: a missing action becomes a wildcard and anything past the
    /// second separator is the scope. Use [`validate`](Self::validate) to reject
    /// malformed input.
    pub fn parse(&self, permission: &str) -> ParsedPermission {
        let folded = self.fold_case(permission);

        if folded == self.options.globstar {
            return ParsedPermission {
                resource: self.options.wildcard.clone(),
                action: self.options.wildcard.clone(),
                scope: None,
                is_resource_wildcard: true,
                is_action_wildcard: true,
                is_scope_wildcard: true,
                is_globstar: true,
                original: permission.to_string(),
            };
        }

        let mut parts = folded.splitn(MAX_SEGMENTS, self.options.separator.as_str());
        let resource = parts.next().unwrap_or_default().to_string();
        let action = parts
            .next()
            .filter(|a| !a.is_empty())
            .unwrap_or(self.options.wildcard.as_str())
            .to_string();
        let scope = parts.next().filter(|s| !s.is_empty()).map(str::to_string);

        ParsedPermission {
            is_resource_wildcard: self.is_wildcard_token(&resource),
            is_action_wildcard: self.is_wildcard_token(&action),
            is_scope_wildcard: scope.as_deref().is_some_and(|s| self.is_wildcard_token(s)),
            is_globstar: false,
            resource,
            action,
            scope,
            original: permission.to_string(),
        }
    }

    /// Parse a list of permission strings
    pub fn parse_many<S: AsRef<str>>(&self, permissions: &[S]) -> Vec<ParsedPermission> {
        permissions.iter().map(|p| self.parse(p.as_ref())).collect()
    }

    /// Check whether `pattern` grants `permission`
    pub fn matches(&self, pattern: &str, permission: &str) -> bool {
        self.matches_parsed(&self.parse(pattern), &self.parse(permission))
    }

    /// Check whether any of `patterns` grants `permission`
    pub fn matches_any<S: AsRef<str>>(&self, patterns: &[S], permission: &str) -> bool {
        let target = self.parse(permission);
        patterns
            .iter()
            .any(|p| self.matches_parsed(&self.parse(p.as_ref()), &target))
    }

    /// Match two already-parsed permissions
    ///
    /// The scope rule is one-sided: a pattern without a concrete scope admits
    /// any scope, but a concretely scoped pattern requires the same scope on
    /// the permission.
    pub fn matches_parsed(&self, pattern: &ParsedPermission, permission: &ParsedPermission) -> bool {
        if pattern.is_globstar {
            return true;
        }

        let resource_ok = pattern.is_resource_wildcard
            || permission.is_resource_wildcard
            || pattern.resource == permission.resource;
        if !resource_ok {
            return false;
        }

        let action_ok = pattern.is_action_wildcard
            || permission.is_action_wildcard
            || pattern.action == permission.action;
        if !action_ok {
            return false;
        }

        match pattern.concrete_scope() {
            None => true,
            Some(scope) => permission.scope.as_deref() == Some(scope),
        }
    }

    /// Lowercase (unless case-sensitive) and add a wildcard action to a bare resource
    pub fn normalize(&self, permission: &str) -> String {
        let folded = self.fold_case(permission);
        if folded == self.options.globstar || folded.contains(self.options.separator.as_str()) {
            return folded;
        }
        self.create(&folded, &self.options.wildcard, None)
    }

    /// Build a permission string from its segments
    pub fn create(&self, resource: &str, action: &str, scope: Option<&str>) -> String {
        let sep = self.options.separator.as_str();
        match scope {
            Some(scope) => format!("{resource}{sep}{action}{sep}{scope}"),
            None => format!("{resource}{sep}{action}"),
        }
    }

    /// `*:<action>`
    pub fn create_resource_wildcard(&self, action: &str) -> String {
        self.create(&self.options.wildcard, action, None)
    }

    /// `<resource>:*`
    pub fn create_action_wildcard(&self, resource: &str) -> String {
        self.create(resource, &self.options.wildcard, None)
    }

    /// Number of concrete segments (0..=3); globstar is 0
    pub fn specificity(&self, parsed: &ParsedPermission) -> u8 {
        if parsed.is_globstar {
            return 0;
        }
        u8::from(!parsed.is_resource_wildcard)
            + u8::from(!parsed.is_action_wildcard)
            + u8::from(parsed.concrete_scope().is_some())
    }

    pub fn get_specificity(&self, permission: &str) -> u8 {
        self.specificity(&self.parse(permission))
    }

    /// Sort most specific first; equal specificity keeps input order
    pub fn sort_by_specificity<S: AsRef<str>>(&self, permissions: &mut [S]) {
        permissions.sort_by_key(|p| Reverse(self.get_specificity(p.as_ref())));
    }

    /// Check the permission string format
    pub fn validate(&self, permission: &str) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidPermission {
            permission: permission.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = permission.trim();
        if trimmed.is_empty() {
            return Err(invalid("permission must not be empty"));
        }
        if trimmed == self.options.globstar {
            return Ok(());
        }

        let segments: Vec<&str> = trimmed.split(self.options.separator.as_str()).collect();
        if segments.len() > MAX_SEGMENTS {
            return Err(invalid("permission has more than 3 segments"));
        }

        for segment in segments {
            if self.is_wildcard_token(segment) {
                continue;
            }
            if !SEGMENT_PATTERN.is_match(segment) {
                return Err(ConfigError::InvalidPermission {
                    permission: permission.to_string(),
                    reason: format!("invalid segment '{}'", segment),
                });
            }
        }

        Ok(())
    }

    pub fn is_valid(&self, permission: &str) -> bool {
        self.validate(permission).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> WildcardParser {
        WildcardParser::default()
    }

    #[test]
    fn test_parse_basic() {
        let parsed = parser().parse("users:read");
        assert_eq!(parsed.resource, "users");
        assert_eq!(parsed.action, "read");
        assert_eq!(parsed.scope, None);
        assert!(!parsed.is_resource_wildcard);
        assert!(!parsed.is_action_wildcard);
        assert!(!parsed.is_globstar);
        assert_eq!(parsed.original, "users:read");
    }

    #[test]
    fn test_parse_with_scope() {
        let parsed = parser().parse("posts:edit:own");
        assert_eq!(parsed.scope.as_deref(), Some("own"));
        assert!(!parsed.is_scope_wildcard);
        assert_eq!(parsed.concrete_scope(), Some("own"));
    }

    #[test]
    fn test_parse_missing_action_is_wildcard() {
        let parsed = parser().parse("users");
        assert_eq!(parsed.action, "*");
        assert!(parsed.is_action_wildcard);

        let parsed = parser().parse("users:");
        assert!(parsed.is_action_wildcard);
    }

    #[test]
    fn test_parse_globstar() {
        let parsed = parser().parse("**");
        assert!(parsed.is_globstar);
        assert!(parsed.is_resource_wildcard);
        assert!(parsed.is_action_wildcard);
    }

    #[test]
    fn test_globstar_only_as_whole_string() {
        let parsed = parser().parse("**:read");
        assert!(!parsed.is_globstar);
        assert!(parsed.is_resource_wildcard);
        assert!(!parser().matches("**:read", "users:write"));
    }

    #[test]
    fn test_parse_case_folding() {
        let parsed = parser().parse("Users:READ");
        assert_eq!(parsed.resource, "users");
        assert_eq!(parsed.action, "read");
        assert_eq!(parsed.original, "Users:READ");

        let sensitive = WildcardParser::new(ParserOptions {
            case_sensitive: true,
            ..Default::default()
        })
        .unwrap();
        let parsed = sensitive.parse("Users:READ");
        assert_eq!(parsed.resource, "Users");
        assert!(!sensitive.matches("users:read", "Users:READ"));
    }

    #[test]
    fn test_parse_is_pure() {
        let p = parser();
        assert_eq!(p.parse("docs:write:all"), p.parse("docs:write:all"));
    }

    #[test]
    fn test_matches_wildcards() {
        let p = parser();
        assert!(p.matches("users:*", "users:read"));
        assert!(p.matches("*:read", "users:read"));
        assert!(p.matches("*:*", "users:delete"));
        assert!(!p.matches("users:read", "users:write"));
        assert!(!p.matches("posts:*", "users:read"));
    }

    #[test]
    fn test_scope_asymmetry() {
        let p = parser();
        // Unscoped pattern admits any scope
        assert!(p.matches("posts:edit", "posts:edit:own"));
        assert!(p.matches("posts:edit:*", "posts:edit:all"));
        // Scoped pattern needs the same scope on the permission
        assert!(p.matches("posts:edit:own", "posts:edit:own"));
        assert!(!p.matches("posts:edit:own", "posts:edit"));
        assert!(!p.matches("posts:edit:own", "posts:edit:all"));
    }

    #[test]
    fn test_custom_separator() {
        let p = WildcardParser::new(ParserOptions {
            separator: ".".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert!(p.matches("users.*", "users.read"));
        assert_eq!(p.create("users", "read", Some("own")), "users.read.own");
    }

    #[test]
    fn test_invalid_options() {
        let result = WildcardParser::new(ParserOptions {
            separator: String::new(),
            ..Default::default()
        });
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));

        let result = WildcardParser::new(ParserOptions {
            separator: "*".to_string(),
            ..Default::default()
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_normalize() {
        let p = parser();
        assert_eq!(p.normalize("Users"), "users:*");
        assert_eq!(p.normalize("USERS:Read"), "users:read");
        assert_eq!(p.normalize("**"), "**");
    }

    #[test]
    fn test_builders() {
        let p = parser();
        assert_eq!(p.create("users", "read", None), "users:read");
        assert_eq!(p.create_resource_wildcard("read"), "*:read");
        assert_eq!(p.create_action_wildcard("users"), "users:*");
    }

    #[test]
    fn test_specificity() {
        let p = parser();
        assert_eq!(p.get_specificity("**"), 0);
        assert_eq!(p.get_specificity("*:*"), 0);
        assert_eq!(p.get_specificity("*:*:*"), 0);
        assert_eq!(p.get_specificity("users:*"), 1);
        assert_eq!(p.get_specificity("users:read"), 2);
        assert_eq!(p.get_specificity("users:read:*"), 2);
        assert_eq!(p.get_specificity("users:read:own"), 3);
    }

    #[test]
    fn test_sort_by_specificity_is_stable() {
        let p = parser();
        let mut perms = vec!["*:read", "users:*", "users:read:own", "**", "posts:write"];
        p.sort_by_specificity(&mut perms);
        assert_eq!(
            perms,
            vec!["users:read:own", "posts:write", "*:read", "users:*", "**"]
        );
    }

    #[test]
    fn test_validate() {
        let p = parser();
        assert!(p.is_valid("users:read"));
        assert!(p.is_valid("users:read:own"));
        assert!(p.is_valid("user-profiles:read_all"));
        assert!(p.is_valid("*:*"));
        assert!(p.is_valid("**"));
        assert!(p.is_valid("users"));

        assert!(!p.is_valid(""));
        assert!(!p.is_valid("   "));
        assert!(!p.is_valid("a:b:c:d"));
        assert!(!p.is_valid("users:re ad"));
        assert!(!p.is_valid("users::read"));
        assert!(!p.is_valid("users:read!"));
    }

    #[test]
    fn test_validate_error_reason() {
        let err = parser().validate("a:b:c:d").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPermission { .. }));
        assert!(err.to_string().contains("more than 3 segments"));
    }
}

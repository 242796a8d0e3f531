//! Permission matcher
//!
//! Decides whether a required permission string is satisfied by a set of
//! granted [`Permission`]s, taking ownership scopes and ABAC conditions into
//! account. A non-match is a regular [`MatchResult`], never an error, so the
//! hot authorization path stays exception-free.

use crate::error::PermissionDeniedError;
use crate::permission::parser::{ParsedPermission, WildcardParser};
use crate::permission::types::{MatchContext, MatchReason, MatchResult, Permission};
use tracing::trace;

/// Scope granted only to the owner of a resource
pub const SCOPE_OWN: &str = "own";
/// Scope granted over every resource; subsumes [`SCOPE_OWN`]
pub const SCOPE_ALL: &str = "all";

const RESOURCE_WEIGHT: u32 = 10;
const ACTION_WEIGHT: u32 = 10;
const SCOPE_WEIGHT: u32 = 5;
const CONDITIONS_WEIGHT: u32 = 3;

/// Evaluates required permissions against granted permission sets
#[derive(Debug, Clone, Default)]
pub struct PermissionMatcher {
    parser: WildcardParser,
}

impl PermissionMatcher {
    pub fn new(parser: WildcardParser) -> Self {
        Self { parser }
    }

    pub fn parser(&self) -> &WildcardParser {
        &self.parser
    }

    /// Check a single required permission (any candidate may satisfy it)
    pub fn matches(
        &self,
        required: &str,
        available: &[Permission],
        context: Option<&MatchContext>,
    ) -> bool {
        let required = self.parser.parse(required);
        available
            .iter()
            .any(|perm| self.permission_matches(&required, perm, context))
    }

    /// OR semantics: true if any required permission is satisfied
    pub fn matches_any<S: AsRef<str>>(
        &self,
        required: &[S],
        available: &[Permission],
        context: Option<&MatchContext>,
    ) -> bool {
        required
            .iter()
            .any(|r| self.matches(r.as_ref(), available, context))
    }

    /// AND semantics: true only if every required permission is satisfied
    pub fn matches_all<S: AsRef<str>>(
        &self,
        required: &[S],
        available: &[Permission],
        context: Option<&MatchContext>,
    ) -> bool {
        required
            .iter()
            .all(|r| self.matches(r.as_ref(), available, context))
    }

    /// Find the highest-scoring matching candidate
    ///
    /// Ties keep the candidate seen first.
    pub fn find_best_match(
        &self,
        required: &str,
        available: &[Permission],
        context: Option<&MatchContext>,
    ) -> MatchResult {
        let parsed = self.parser.parse(required);
        let mut best = MatchResult::no_match();

        for perm in available {
            if !self.permission_matches(&parsed, perm, context) {
                continue;
            }
            let candidate = self.parse_candidate(perm);
            let score = self.score(&candidate, perm);
            if !best.matched || score > best.score {
                best = MatchResult {
                    matched: true,
                    permission: Some(perm.clone()),
                    pattern: Some(self.render(&candidate)),
                    score,
                    reason: Self::reason(&candidate),
                };
            }
        }

        trace!(
            required,
            matched = best.matched,
            score = best.score,
            reason = %best.reason,
            "Best match evaluated"
        );
        best
    }

    /// Every matching candidate, highest score first (ties keep input order)
    pub fn matching_permissions<'a>(
        &self,
        required: &str,
        available: &'a [Permission],
        context: Option<&MatchContext>,
    ) -> Vec<&'a Permission> {
        let parsed = self.parser.parse(required);
        let mut scored: Vec<(u32, &Permission)> = available
            .iter()
            .filter(|perm| self.permission_matches(&parsed, perm, context))
            .map(|perm| (self.score(&self.parse_candidate(perm), perm), perm))
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored.into_iter().map(|(_, perm)| perm).collect()
    }

    /// Like [`find_best_match`](Self::find_best_match), but a non-match is an error
    pub fn require(
        &self,
        required: &str,
        available: &[Permission],
        context: Option<&MatchContext>,
    ) -> Result<MatchResult, PermissionDeniedError> {
        let result = self.find_best_match(required, available, context);
        if result.matched {
            Ok(result)
        } else {
            Err(PermissionDeniedError::new(required, result.reason.as_str()))
        }
    }

    /// Check one candidate permission against a parsed requirement
    pub fn permission_matches(
        &self,
        required: &ParsedPermission,
        permission: &Permission,
        context: Option<&MatchContext>,
    ) -> bool {
        let candidate = self.parse_candidate(permission);

        if !candidate.is_globstar {
            let resource_ok = candidate.is_resource_wildcard
                || required.is_resource_wildcard
                || candidate.resource == required.resource;
            let action_ok = candidate.is_action_wildcard
                || required.is_action_wildcard
                || candidate.action == required.action;
            if !resource_ok || !action_ok {
                return false;
            }

            if !self.evaluate_scope(
                required.concrete_scope(),
                candidate.scope.as_deref(),
                context,
            ) {
                return false;
            }
        }

        self.evaluate_conditions(permission, context)
    }

    /// Ownership-aware scope check
    ///
    /// `all` subsumes `own`, never the reverse. An `own` grant requires the
    /// context to prove ownership; missing ids fail closed.
    pub fn evaluate_scope(
        &self,
        required: Option<&str>,
        granted: Option<&str>,
        context: Option<&MatchContext>,
    ) -> bool {
        let wildcard = self.parser.options().wildcard.as_str();
        let Some(required) = required.filter(|s| *s != wildcard) else {
            return true;
        };
        let Some(granted) = granted else {
            return false;
        };
        if granted == wildcard {
            return true;
        }

        if required == SCOPE_OWN {
            match granted {
                SCOPE_OWN => return context.is_some_and(MatchContext::is_owner),
                SCOPE_ALL => return true,
                _ => {}
            }
        }

        granted == required
    }

    /// Every condition must equal the matching context attribute
    pub fn evaluate_conditions(
        &self,
        permission: &Permission,
        context: Option<&MatchContext>,
    ) -> bool {
        let Some(conditions) = permission.conditions.as_ref().filter(|c| !c.is_empty()) else {
            return true;
        };
        let Some(context) = context else {
            trace!(permission = %permission.id, "Conditions present but no context supplied");
            return false;
        };

        conditions
            .iter()
            .all(|(name, expected)| context.attributes.get(name) == Some(expected))
    }

    /// Specificity score of a matching candidate
    pub fn score(&self, candidate: &ParsedPermission, permission: &Permission) -> u32 {
        let mut score = 0;
        if !candidate.is_globstar {
            if !candidate.is_resource_wildcard {
                score += RESOURCE_WEIGHT;
            }
            if !candidate.is_action_wildcard {
                score += ACTION_WEIGHT;
            }
            if candidate.concrete_scope().is_some() {
                score += SCOPE_WEIGHT;
            }
        }
        if permission.has_conditions() {
            score += CONDITIONS_WEIGHT;
        }
        score
    }

    fn reason(candidate: &ParsedPermission) -> MatchReason {
        if candidate.is_globstar {
            MatchReason::Superadmin
        } else if candidate.is_resource_wildcard && candidate.is_action_wildcard {
            MatchReason::FullWildcard
        } else if candidate.is_resource_wildcard {
            MatchReason::ResourceWildcard
        } else if candidate.is_action_wildcard {
            MatchReason::ActionWildcard
        } else {
            MatchReason::ExactMatch
        }
    }

    /// Table form of the globstar grant: resource `**`, no concrete action, no scope
    fn parse_candidate(&self, permission: &Permission) -> ParsedPermission {
        let options = self.parser.options();
        let globstar = options.globstar.as_str();
        let action = permission.action.trim();
        let open_action = action.is_empty() || action == options.wildcard || action == globstar;
        if permission.resource.trim() == globstar && open_action && permission.scope.is_none() {
            return self.parser.parse(globstar);
        }
        self.parser.parse(&self.parser.create(
            &permission.resource,
            &permission.action,
            permission.scope.as_deref(),
        ))
    }

    fn render(&self, candidate: &ParsedPermission) -> String {
        if candidate.is_globstar {
            return self.parser.options().globstar.clone();
        }
        self.parser.create(
            &candidate.resource,
            &candidate.action,
            candidate.scope.as_deref(),
        )
    }
}

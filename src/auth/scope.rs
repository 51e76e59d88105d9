// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! OAuth2 scope enforcement.

use std::collections::BTreeSet;
use std::fmt;

use tracing::debug;

use super::{AuthError, Claims};

/// Rejected scope requirement.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid scope requirement {0:?}: must be non-empty and contain no whitespace")]
pub struct InvalidScope(pub String);

/// The single scope a protected operation requires.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScopeRequirement(String);

impl ScopeRequirement {
    pub fn new(scope: impl Into<String>) -> Result<Self, InvalidScope> {
        let scope = scope.into();
        if scope.is_empty() || scope.chars().any(char::is_whitespace) {
            return Err(InvalidScope(scope));
        }
        Ok(Self(scope))
    }

    /// Build a requirement from a literal declared at route registration.
    ///
    /// # Panics
    ///
    /// Panics if `scope` is empty or contains whitespace.
    pub fn from_static(scope: &'static str) -> Self {
        match Self::new(scope) {
            Ok(requirement) => requirement,
            Err(e) => panic!("{e}"),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScopeRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Scopes granted by a token's space-separated `scope` claim.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeSet<'a>(BTreeSet<&'a str>);

impl<'a> ScopeSet<'a> {
    /// Missing or non-string `scope` claims grant nothing.
    pub fn from_claims(claims: &'a Claims) -> Self {
        Self(claims.scope().unwrap_or_default().split_whitespace().collect())
    }

    pub fn contains(&self, requirement: &ScopeRequirement) -> bool {
        self.0.contains(requirement.as_str())
    }

    /// Granted scopes in sorted order.
    pub fn to_vec(&self) -> Vec<String> {
        self.0.iter().map(|s| s.to_string()).collect()
    }
}

/// Pass `claims` through if they grant `requirement`.
pub fn authorize(requirement: &ScopeRequirement, claims: Claims) -> Result<Claims, AuthError> {
    if ScopeSet::from_claims(&claims).contains(requirement) {
        return Ok(claims);
    }
    debug!(
        required = %requirement,
        sub = claims.subject().unwrap_or("-"),
        "Scope check failed"
    );
    Err(AuthError::InsufficientScope {
        required: requirement.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn claims(value: serde_json::Value) -> Claims {
        serde_json::from_value(value).unwrap()
    }

    fn sample_claims() -> Claims {
        claims(json!({
            "aud": "https://clientco/api",
            "iss": "https://tenant.example/",
            "scope": "read:data write:data",
        }))
    }

    #[test]
    fn granted_scope_passes_claims_through_unchanged() {
        let original = sample_claims();
        let authorized = authorize(&ScopeRequirement::from_static("read:data"), original.clone());
        assert_eq!(authorized, Ok(original));
    }

    #[test]
    fn missing_scope_is_insufficient_scope() {
        let result = authorize(&ScopeRequirement::from_static("delete:data"), sample_claims());
        assert_eq!(
            result,
            Err(AuthError::InsufficientScope {
                required: "delete:data".into()
            })
        );
    }

    #[test]
    fn scope_match_is_exact_not_prefix() {
        let c = claims(json!({ "scope": "read:data-archive" }));
        assert!(authorize(&ScopeRequirement::from_static("read:data"), c).is_err());
    }

    #[test]
    fn scope_split_tolerates_irregular_whitespace() {
        let c = claims(json!({ "scope": "  openid\tread:data\n write:data " }));
        let set = ScopeSet::from_claims(&c);
        assert_eq!(set.to_vec(), vec!["openid", "read:data", "write:data"]);
    }

    #[test]
    fn absent_or_non_string_scope_grants_nothing() {
        for c in [claims(json!({})), claims(json!({ "scope": ["read:data"] }))] {
            assert!(ScopeSet::from_claims(&c).to_vec().is_empty());
            assert!(authorize(&ScopeRequirement::from_static("read:data"), c).is_err());
        }
    }

    #[test]
    fn requirement_rejects_blank_and_multi_scope_strings() {
        assert!(ScopeRequirement::new("").is_err());
        assert!(ScopeRequirement::new("read:data write:data").is_err());
        assert_eq!(ScopeRequirement::new("read:data").unwrap().as_str(), "read:data");
    }

    #[test]
    #[should_panic(expected = "invalid scope requirement")]
    fn from_static_panics_on_invalid_literal() {
        ScopeRequirement::from_static(" ");
    }
}

//! Scope-based authorization
//!
//! A token's `scope` claim is a whitespace-delimited list of granted scopes.
//! [`ScopeAuthorizer`] requires every configured scope to be granted. Matching
//! is exact: no wildcards, no hierarchy.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::error::Rejection;
use crate::jwt::VerifiedClaims;

/// Granted scopes of a verified token
///
/// An absent or non-string `scope` claim grants nothing.
pub fn granted_scopes(claims: &VerifiedClaims) -> HashSet<&str> {
    claims
        .scope
        .as_deref()
        .map(|scope| scope.split_whitespace().collect())
        .unwrap_or_default()
}

/// Enforces a required scope set (AND semantics)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeAuthorizer {
    required: Vec<String>,
}

impl ScopeAuthorizer {
    /// Create an authorizer requiring all of `required`
    pub fn new<I, S>(required: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            required: required.into_iter().map(Into::into).collect(),
        }
    }

    /// Required scopes
    pub fn required(&self) -> &[String] {
        &self.required
    }

    /// Check `claims` against the required scopes
    ///
    /// # Errors
    ///
    /// Returns an `InsufficientScope` rejection if any required scope is
    /// missing. The rejection never names the missing scopes.
    pub fn authorize(&self, claims: &VerifiedClaims) -> Result<(), Rejection> {
        if self.required.is_empty() {
            return Ok(());
        }

        let granted = granted_scopes(claims);
        let missing = self
            .required
            .iter()
            .filter(|scope| !granted.contains(scope.as_str()))
            .count();

        if missing > 0 {
            warn!(
                subject = ?claims.sub,
                missing_count = missing,
                required_count = self.required.len(),
                "Token lacks required scopes"
            );
            return Err(Rejection::insufficient_scope());
        }

        debug!(subject = ?claims.sub, "Required scopes present");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RejectionKind;
    use proptest::prelude::*;

    fn claims_with_scope(scope: Option<&str>) -> VerifiedClaims {
        VerifiedClaims {
            sub: Some("user-1".into()),
            scope: scope.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_no_required_scopes_always_passes() {
        let authorizer = ScopeAuthorizer::default();
        assert!(authorizer.authorize(&claims_with_scope(None)).is_ok());
        assert!(authorizer.authorize(&claims_with_scope(Some(""))).is_ok());
    }

    #[test]
    fn test_all_required_present() {
        let authorizer = ScopeAuthorizer::new(["read", "write"]);
        let claims = claims_with_scope(Some("write  profile\tread"));
        assert!(authorizer.authorize(&claims).is_ok());
    }

    #[test]
    fn test_missing_scope_is_rejected_without_detail() {
        let authorizer = ScopeAuthorizer::new(["read", "write", "admin"]);

        for scope in [Some("read"), Some("read write"), None] {
            let rejection = authorizer
                .authorize(&claims_with_scope(scope))
                .unwrap_err();
            assert_eq!(rejection.kind(), RejectionKind::InsufficientScope);
            assert_eq!(rejection.message(), Some("Insufficient scopes"));
        }
    }

    #[test]
    fn test_no_prefix_or_wildcard_matching() {
        let authorizer = ScopeAuthorizer::new(["files:read"]);
        assert!(authorizer.authorize(&claims_with_scope(Some("files"))).is_err());
        assert!(authorizer.authorize(&claims_with_scope(Some("files:*"))).is_err());
        assert!(
            authorizer
                .authorize(&claims_with_scope(Some("files:read:all")))
                .is_err()
        );
    }

    #[test]
    fn test_granted_scopes_splits_on_whitespace() {
        let claims = claims_with_scope(Some(" a  b\nc "));
        let granted = granted_scopes(&claims);
        assert_eq!(granted, HashSet::from(["a", "b", "c"]));
    }

    proptest! {
        #[test]
        fn authorize_iff_required_subset_of_granted(
            granted in proptest::collection::hash_set("[a-z]{1,6}", 0..6),
            required in proptest::collection::vec("[a-z]{1,6}", 0..4),
        ) {
            let scope = granted.iter().cloned().collect::<Vec<_>>().join(" ");
            let claims = claims_with_scope(Some(&scope));
            let expected = required.iter().all(|r| granted.contains(r));

            let outcome = ScopeAuthorizer::new(required.clone()).authorize(&claims);
            prop_assert_eq!(outcome.is_ok(), expected);
        }
    }
}

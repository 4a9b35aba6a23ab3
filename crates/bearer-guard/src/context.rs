//! Authenticated request context
//!
//! [`AuthContext`] is what a request handler sees after the guard lets a
//! request through. It wraps the verified claims and lives as long as the
//! request; nothing about it is cached across requests.

use std::collections::HashSet;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use serde_json::Value;

use crate::jwt::{Audience, VerifiedClaims};
use crate::scope::granted_scopes;

/// The authenticated identity of one request
///
/// # Example
///
/// ```rust,ignore
/// // In an axum handler behind `GuardLayer`
/// async fn me(Extension(auth): Extension<AuthContext>) -> String {
///     format!("hello {}", auth.subject().unwrap_or("anonymous"))
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct AuthContext {
    claims: VerifiedClaims,
}

impl AuthContext {
    /// Wrap verified claims
    pub fn new(claims: VerifiedClaims) -> Self {
        Self { claims }
    }

    /// Subject (`sub`)
    pub fn subject(&self) -> Option<&str> {
        self.claims.sub.as_deref()
    }

    /// Issuer (`iss`)
    pub fn issuer(&self) -> Option<&str> {
        self.claims.iss.as_deref()
    }

    /// Audience (`aud`)
    pub fn audience(&self) -> Option<&Audience> {
        self.claims.aud.as_ref()
    }

    /// Granted scopes
    pub fn scopes(&self) -> HashSet<&str> {
        granted_scopes(&self.claims)
    }

    /// Whether `scope` was granted
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes().contains(scope)
    }

    /// When the token expires, if it carries `exp`
    pub fn expires_at(&self) -> Option<SystemTime> {
        self.claims
            .exp
            .map(|exp| UNIX_EPOCH + Duration::from_secs(exp))
    }

    /// A claim outside the registered set
    pub fn claim(&self, name: &str) -> Option<&Value> {
        self.claims.additional.get(name)
    }

    /// All verified claims
    pub fn claims(&self) -> &VerifiedClaims {
        &self.claims
    }

    /// Unwrap into the verified claims
    pub fn into_claims(self) -> VerifiedClaims {
        self.claims
    }
}

impl From<VerifiedClaims> for AuthContext {
    fn from(claims: VerifiedClaims) -> Self {
        Self::new(claims)
    }
}

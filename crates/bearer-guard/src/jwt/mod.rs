//! JWT verification against a remote key source
//!
//! ```text
//! ┌──────────────────────────────┐
//! │ TokenVerifier                │
//! │  - header / kid / alg        │
//! │  - signature, exp, nbf       │
//! │  - issuer, audience          │
//! └──────────────┬───────────────┘
//!                │ resolve(kid)
//! ┌──────────────▼───────────────┐
//! │ KeyStore                     │
//! │  - cached KeySet (maxAge)    │
//! │  - single-flight refresh     │
//! │  - fetch timeout             │
//! └──────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `keystore` - JWKS fetching, caching and key resolution
//! - `verifier` - signature and claim validation

pub mod keystore;
pub mod verifier;

pub use keystore::{KeySet, KeyStore, KeyStoreError, SigningKey};
pub use verifier::{TokenVerifier, VerifyError};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// An audience value: a single string or a list of strings
///
/// Used both for the configured expectation and for the token's `aud` claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    /// A single audience
    One(String),
    /// Several audiences
    Many(Vec<String>),
}

impl Audience {
    /// Iterate over every audience value
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        let values: &[String] = match self {
            Self::One(value) => std::slice::from_ref(value),
            Self::Many(values) => values,
        };
        values.iter().map(String::as_str)
    }

    /// True when at least one value appears in both audiences
    pub fn intersects(&self, other: &Audience) -> bool {
        self.iter().any(|ours| other.iter().any(|theirs| ours == theirs))
    }

    /// True when the audience holds no values
    pub fn is_empty(&self) -> bool {
        match self {
            Self::One(_) => false,
            Self::Many(values) => values.is_empty(),
        }
    }
}

impl From<&str> for Audience {
    fn from(value: &str) -> Self {
        Self::One(value.to_string())
    }
}

impl From<String> for Audience {
    fn from(value: String) -> Self {
        Self::One(value)
    }
}

impl From<Vec<String>> for Audience {
    fn from(values: Vec<String>) -> Self {
        Self::Many(values)
    }
}

impl From<Vec<&str>> for Audience {
    fn from(values: Vec<&str>) -> Self {
        Self::Many(values.into_iter().map(str::to_string).collect())
    }
}

/// Claims of a token that passed signature and claim checks
///
/// Registered claims per RFC 7519 plus the OAuth `scope` claim. Every other
/// field of the payload is preserved untouched in `additional`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct VerifiedClaims {
    /// Subject (sub)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    /// Issuer (iss)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    /// Audience (aud), one or many
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<Audience>,

    /// Whitespace-delimited scope string; a non-string claim reads as absent
    #[serde(
        default,
        deserialize_with = "scope_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub scope: Option<String>,

    /// Expiration Time (exp) - Unix timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<u64>,

    /// Not Before (nbf) - Unix timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<u64>,

    /// Issued At (iat) - Unix timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<u64>,

    /// JWT ID (jti)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,

    /// Additional claims
    #[serde(flatten)]
    pub additional: HashMap<String, Value>,
}

fn scope_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(scope) => Some(scope),
        _ => None,
    })
}

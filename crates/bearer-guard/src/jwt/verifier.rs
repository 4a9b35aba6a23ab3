//! JWT validation against a [`KeyStore`]
//!
//! Validation order:
//! 1. Header decode (structure, `alg`, `kid`)
//! 2. Algorithm allowlist
//! 3. Key resolution through the key store
//! 4. Signature plus `exp`/`nbf` (clock skew tolerance, default zero)
//! 5. Exact issuer match
//! 6. Audience overlap, when an audience is configured
//!
//! Every failure is a [`VerifyError`]. The variants exist for logs and tests;
//! callers see them only as the message of a `VerificationFailed` rejection.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{
    Algorithm, TokenData, Validation, decode, decode_header, get_current_timestamp,
};
use tracing::{debug, warn};

use super::{Audience, KeyStore, KeyStoreError, VerifiedClaims};
use crate::error::Rejection;

/// Asymmetric algorithms accepted unless configured otherwise
pub const DEFAULT_ALGORITHMS: &[Algorithm] = &[
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::PS256,
    Algorithm::PS384,
    Algorithm::PS512,
    Algorithm::ES256,
    Algorithm::ES384,
    Algorithm::EdDSA,
];

/// Why a token failed verification
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
    /// Not a structurally valid JWT
    #[error("malformed token: {0}")]
    Malformed(String),

    /// Header lacks `kid`
    #[error("token header has no key identifier")]
    MissingKeyId,

    /// Header `alg` is outside the allowlist
    #[error("algorithm {0:?} not allowed")]
    AlgorithmNotAllowed(Algorithm),

    /// Key could not be resolved
    #[error(transparent)]
    Key(#[from] KeyStoreError),

    /// Signature does not match
    #[error("invalid signature")]
    InvalidSignature,

    /// Header `alg` does not fit the resolved key
    #[error("algorithm mismatch")]
    AlgorithmMismatch,

    /// `exp` is in the past
    #[error("token expired")]
    Expired,

    /// `nbf` is in the future
    #[error("token not yet valid")]
    NotYetValid,

    /// `iss` differs from the expected issuer
    #[error("issuer mismatch")]
    IssuerMismatch,

    /// No configured audience appears in `aud`
    #[error("audience mismatch")]
    AudienceMismatch,

    /// Any other validation failure reported by the JWT library
    #[error("token validation failed: {0}")]
    Other(String),
}

impl From<jsonwebtoken::errors::Error> for VerifyError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        match e.kind() {
            ErrorKind::InvalidSignature => Self::InvalidSignature,
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::ImmatureSignature => Self::NotYetValid,
            ErrorKind::InvalidAlgorithm => Self::AlgorithmMismatch,
            ErrorKind::InvalidToken
            | ErrorKind::Base64(_)
            | ErrorKind::Json(_)
            | ErrorKind::Utf8(_) => Self::Malformed(e.to_string()),
            _ => Self::Other(e.to_string()),
        }
    }
}

impl From<VerifyError> for Rejection {
    fn from(e: VerifyError) -> Self {
        Rejection::verification_failed(e.to_string())
    }
}

/// Signature and claim verifier backed by a [`KeyStore`]
///
/// # Example
///
/// ```rust,no_run
/// # use bearer_guard::jwt::{KeyStore, TokenVerifier};
/// # use std::sync::Arc;
/// # use std::time::Duration;
/// # tokio_test::block_on(async {
/// let store = Arc::new(KeyStore::new(
///     "https://auth.example.com/jwks".parse()?,
///     Duration::from_secs(600),
///     Duration::from_secs(5),
/// )?);
/// let verifier = TokenVerifier::new(store);
///
/// let claims = verifier
///     .verify("eyJ0eXAi...", "https://auth.example.com", None)
///     .await?;
/// println!("subject: {:?}", claims.sub);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct TokenVerifier {
    key_store: Arc<KeyStore>,
    clock_skew: Duration,
    allowed_algorithms: Vec<Algorithm>,
}

impl TokenVerifier {
    /// Create a verifier with zero clock skew and the default asymmetric algorithms
    pub fn new(key_store: Arc<KeyStore>) -> Self {
        Self {
            key_store,
            clock_skew: Duration::ZERO,
            allowed_algorithms: DEFAULT_ALGORITHMS.to_vec(),
        }
    }

    /// Set clock skew tolerance for `exp`/`nbf`
    pub fn with_clock_skew(mut self, leeway: Duration) -> Self {
        self.clock_skew = leeway;
        self
    }

    /// Set allowed algorithms
    ///
    /// # Security Warning
    ///
    /// Symmetric algorithms (HS*) only make sense when the key source is
    /// trusted to publish shared secrets.
    pub fn with_algorithms(mut self, algorithms: Vec<Algorithm>) -> Self {
        self.allowed_algorithms = algorithms;
        self
    }

    /// The key store this verifier resolves keys from
    pub fn key_store(&self) -> &Arc<KeyStore> {
        &self.key_store
    }

    /// Verify `token` and return its claims
    ///
    /// `audience`, when given, must overlap the token's `aud` claim in at
    /// least one value.
    ///
    /// # Errors
    ///
    /// Returns a [`VerifyError`] describing the first failed check.
    pub async fn verify(
        &self,
        token: &str,
        issuer: &str,
        audience: Option<&Audience>,
    ) -> Result<VerifiedClaims, VerifyError> {
        let header = decode_header(token).map_err(|e| {
            debug!(error = %e, "Failed to decode JWT header");
            VerifyError::Malformed(e.to_string())
        })?;

        if !self.allowed_algorithms.contains(&header.alg) {
            warn!(
                algorithm = ?header.alg,
                allowed = ?self.allowed_algorithms,
                "JWT algorithm not allowed"
            );
            return Err(VerifyError::AlgorithmNotAllowed(header.alg));
        }

        let kid = header.kid.as_deref().ok_or_else(|| {
            warn!("JWT missing kid (key ID) in header");
            VerifyError::MissingKeyId
        })?;

        let key = self.key_store.resolve(kid).await?;

        if let Some(key_alg) = key.algorithm()
            && key_alg != header.alg
        {
            warn!(
                kid = kid,
                key_algorithm = ?key_alg,
                token_algorithm = ?header.alg,
                "JWT algorithm does not match key"
            );
            return Err(VerifyError::AlgorithmMismatch);
        }

        let leeway = leeway_secs(self.clock_skew);
        let mut validation = Validation::new(header.alg);
        validation.leeway = leeway;
        validation.validate_exp = true;
        validation.validate_nbf = true;
        // Issuer and audience are checked below so each gets its own failure.
        validation.validate_aud = false;
        validation.required_spec_claims = HashSet::new();

        let token_data: TokenData<VerifiedClaims> =
            decode(token, key.decoding_key(), &validation).map_err(|e| {
                let e = VerifyError::from(e);
                warn!(kid = kid, error = %e, "JWT validation failed");
                e
            })?;
        let claims = token_data.claims;

        // The library only rejects `exp < now - leeway`; `exp` itself is
        // already outside the validity window.
        if let Some(exp) = claims.exp
            && exp <= get_current_timestamp().saturating_sub(leeway)
        {
            warn!(kid = kid, exp = exp, "JWT expired");
            return Err(VerifyError::Expired);
        }

        if claims.iss.as_deref() != Some(issuer) {
            warn!(
                expected = issuer,
                actual = ?claims.iss,
                "JWT issuer mismatch"
            );
            return Err(VerifyError::IssuerMismatch);
        }

        if let Some(expected) = audience {
            let matched = claims
                .aud
                .as_ref()
                .is_some_and(|actual| expected.intersects(actual));
            if !matched {
                warn!(
                    expected = ?expected,
                    actual = ?claims.aud,
                    "JWT audience mismatch"
                );
                return Err(VerifyError::AudienceMismatch);
            }
        }

        debug!(
            issuer = issuer,
            subject = ?claims.sub,
            algorithm = ?header.alg,
            kid = kid,
            "JWT validation successful"
        );

        Ok(claims)
    }
}

/// Whole seconds of leeway for `skew`, rounding any fraction up
fn leeway_secs(skew: Duration) -> u64 {
    skew.as_secs() + u64::from(skew.subsec_nanos() > 0)
}

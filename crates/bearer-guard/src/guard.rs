//! Resource-server guard
//!
//! [`ResourceServerGuard`] combines token verification and scope
//! authorization into one decision per request. It holds no per-request
//! state, so a single instance is shared by every concurrent request.

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::config::{ConfigError, GuardConfig};
use crate::context::AuthContext;
use crate::error::Rejection;
use crate::jwt::{KeyStore, TokenVerifier};
use crate::scope::ScopeAuthorizer;

/// Per-request bearer-token gate
///
/// # Example
///
/// ```rust,no_run
/// use bearer_guard::{GuardConfig, ResourceServerGuard};
///
/// # tokio_test::block_on(async {
/// let guard = ResourceServerGuard::new(
///     GuardConfig::new("https://auth.example.com/jwks", "https://auth.example.com")
///         .with_audience("orders-api")
///         .with_required_scopes(["orders:read"]),
/// )?;
///
/// match guard.authenticate(Some("eyJ0eXAi...")).await {
///     Ok(ctx) => println!("subject: {:?}", ctx.subject()),
///     Err(rejection) => println!("{} {}", rejection.status(), rejection.to_json()),
/// }
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// # });
/// ```
#[derive(Debug)]
pub struct ResourceServerGuard {
    config: Arc<GuardConfig>,
    verifier: TokenVerifier,
    authorizer: ScopeAuthorizer,
}

impl ResourceServerGuard {
    /// Build a guard from configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the key source
    /// client cannot be built.
    pub fn new(config: GuardConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let key_source = config.key_source_url()?;

        let key_store = KeyStore::new(key_source, config.cache_max_age, config.fetch_timeout)
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        Ok(Self::with_key_store(config, Arc::new(key_store)))
    }

    /// Build a guard around an existing key store
    ///
    /// The configuration's key source, cache and timeout settings are
    /// ignored in favour of the store's own.
    pub fn with_key_store(config: GuardConfig, key_store: Arc<KeyStore>) -> Self {
        let verifier = TokenVerifier::new(key_store)
            .with_clock_skew(config.clock_skew)
            .with_algorithms(config.algorithms.clone());
        let authorizer = ScopeAuthorizer::new(config.required_scopes.iter().cloned());

        Self {
            config: Arc::new(config),
            verifier,
            authorizer,
        }
    }

    /// Decide one request
    ///
    /// `raw_token` is the bearer credential with the scheme already removed.
    /// `None`, an empty string and whitespace all count as no token; in that
    /// case no key lookup happens.
    ///
    /// # Errors
    ///
    /// - `MissingToken` when no token was presented
    /// - `VerificationFailed` when any verification step fails
    /// - `InsufficientScope` when a required scope is not granted
    #[instrument(skip_all, level = "debug")]
    pub async fn authenticate(&self, raw_token: Option<&str>) -> Result<AuthContext, Rejection> {
        let Some(token) = raw_token.map(str::trim).filter(|t| !t.is_empty()) else {
            debug!("Request carries no bearer token");
            return Err(Rejection::missing_token());
        };

        let claims = self
            .verifier
            .verify(token, &self.config.issuer, self.config.audience.as_ref())
            .await
            .map_err(|e| {
                warn!(error = %e, "Bearer token rejected");
                Rejection::from(e)
            })?;

        self.authorizer.authorize(&claims)?;

        debug!(subject = ?claims.sub, "Bearer token accepted");
        Ok(AuthContext::new(claims))
    }

    /// Active configuration
    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    /// Shared key store
    pub fn key_store(&self) -> &Arc<KeyStore> {
        self.verifier.key_store()
    }

    /// Token verifier
    pub fn verifier(&self) -> &TokenVerifier {
        &self.verifier
    }

    /// Scope authorizer
    pub fn authorizer(&self) -> &ScopeAuthorizer {
        &self.authorizer
    }
}

//! # Bearer Guard - OAuth2 Resource-Server Guard
//!
//! Per-request bearer-token authentication for HTTP APIs that sit behind an
//! OAuth2 / OpenID Connect authorization server.
//!
//! ## Key Features
//!
//! - **JWKS Key Store** - Cached, single-flight refresh of the issuer's signing keys
//! - **Token Verification** - Signature, `exp`/`nbf`, issuer and audience checks
//! - **Scope Authorization** - All configured scopes must be granted
//! - **Classified Rejections** - 401/403 outcomes with stable JSON bodies
//! - **Tower Middleware** - Drop-in layer for axum/hyper stacks
//!
//! ## Architecture
//!
//! - [`config`] - Guard configuration, file and environment loading
//! - [`jwt`] - Key store and token verifier
//! - [`scope`] - Scope authorizer
//! - [`guard`] - The per-request decision
//! - [`context`] - `AuthContext` handed to accepted requests
//! - [`error`] - Rejection kinds and their HTTP rendering
//! - `tower` - Tower layer (feature `middleware`)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bearer_guard::{GuardConfig, ResourceServerGuard};
//!
//! # tokio_test::block_on(async {
//! let guard = ResourceServerGuard::new(
//!     GuardConfig::new(
//!         "https://auth.example.com/.well-known/jwks.json",
//!         "https://auth.example.com",
//!     )
//!     .with_audience("orders-api")
//!     .with_required_scopes(["orders:read"]),
//! )?;
//!
//! let outcome = guard.authenticate(Some("eyJ0eXAi...")).await;
//! if let Err(rejection) = &outcome {
//!     assert!(rejection.status().is_client_error());
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```
//!
//! ## Feature Flags
//!
//! - `middleware` (default) - Tower `GuardLayer`/`GuardService`
//!
//! ## Standards
//!
//! - **RFC 7517** - JSON Web Key (JWK)
//! - **RFC 7519** - JSON Web Token (JWT)
//! - **RFC 6750** - Bearer Token Usage

pub mod config;
pub mod context;
pub mod error;
pub mod guard;
pub mod jwt;
pub mod scope;

#[cfg(feature = "middleware")]
pub mod tower;

#[doc(inline)]
pub use config::{ConfigError, GuardConfig};
#[doc(inline)]
pub use context::AuthContext;
#[doc(inline)]
pub use error::{Rejection, RejectionBody, RejectionKind};
#[doc(inline)]
pub use guard::ResourceServerGuard;
#[doc(inline)]
pub use jwt::{
    Audience, KeySet, KeyStore, KeyStoreError, SigningKey, TokenVerifier, VerifiedClaims,
    VerifyError,
};
#[doc(inline)]
pub use scope::ScopeAuthorizer;

#[cfg(feature = "middleware")]
pub use crate::tower::{GuardLayer, GuardService, extract_bearer};

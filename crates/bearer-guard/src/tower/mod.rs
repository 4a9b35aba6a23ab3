//! # Tower Middleware
//!
//! [`GuardLayer`] puts a [`ResourceServerGuard`](crate::ResourceServerGuard)
//! in front of any `tower` service that speaks `http::Request`/`http::Response`,
//! which covers axum, hyper and tonic stacks.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tower::ServiceBuilder;
//! use bearer_guard::{GuardConfig, ResourceServerGuard, tower::GuardLayer};
//!
//! let guard = Arc::new(ResourceServerGuard::new(config)?);
//!
//! let service = ServiceBuilder::new()
//!     .layer(GuardLayer::new(guard))
//!     .service(my_inner_service);
//! ```
//!
//! ## Request Extensions
//!
//! An accepted request reaches the inner service with its
//! [`AuthContext`](crate::AuthContext) in the request extensions:
//!
//! ```rust,ignore
//! if let Some(auth) = req.extensions().get::<AuthContext>() {
//!     println!("Authenticated subject: {:?}", auth.subject());
//! }
//! ```
//!
//! A rejected request never reaches the inner service; the layer answers it
//! with [`Rejection::into_response`](crate::Rejection::into_response).

mod layer;
mod service;

pub use layer::GuardLayer;
pub use service::{GuardService, GuardServiceFuture};

use http::{HeaderMap, header};

/// Extract the bearer credential from an `Authorization` header
///
/// The scheme match is case-insensitive. Returns `None` when the header is
/// absent, not valid ASCII, uses another scheme, or carries an empty token.
pub fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value
        .trim_start()
        .split_once(|c: char| c.is_ascii_whitespace())?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn headers(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn test_extract_bearer() {
        assert_eq!(extract_bearer(&headers("Bearer abc.def.ghi")), Some("abc.def.ghi"));
        assert_eq!(extract_bearer(&headers("bearer abc")), Some("abc"));
        assert_eq!(extract_bearer(&headers("BEARER   abc  ")), Some("abc"));
        assert_eq!(extract_bearer(&headers("Bearer\tabc")), Some("abc"));
        assert_eq!(extract_bearer(&headers("Bearer \t abc")), Some("abc"));
    }

    #[test]
    fn test_extract_bearer_rejects_other_shapes() {
        assert_eq!(extract_bearer(&HeaderMap::new()), None);
        assert_eq!(extract_bearer(&headers("Basic dXNlcjpwYXNz")), None);
        assert_eq!(extract_bearer(&headers("Bearer")), None);
        assert_eq!(extract_bearer(&headers("Bearer    ")), None);
        assert_eq!(extract_bearer(&headers("Bearerabc")), None);
        assert_eq!(extract_bearer(&headers("Bearer\t")), None);
    }
}

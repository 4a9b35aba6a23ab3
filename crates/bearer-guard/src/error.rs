//! Rejection outcomes of the guard
//!
//! Every request that does not end in an [`AuthContext`](crate::AuthContext)
//! ends in exactly one [`Rejection`]. Rejections are ordinary values returned
//! up the call chain; they are never panics and never escape as unclassified
//! faults.
//!
//! # HTTP mapping
//!
//! | Kind | Status | Body |
//! |------|--------|------|
//! | `MissingToken` | 401 | `{"error":"Unauthorized"}` |
//! | `VerificationFailed` | 401 | `{"error":"Unauthorized","message":"<cause>"}` |
//! | `InsufficientScope` | 403 | `{"error":"Forbidden","message":"Insufficient scopes"}` |
//!
//! The guard itself does not write responses. [`Rejection::into_response`]
//! renders the status, JSON body and an RFC 6750 `WWW-Authenticate` challenge
//! for whatever HTTP layer sits in front of it.

use std::fmt;

use http::{HeaderValue, StatusCode, header};
use serde::{Deserialize, Serialize};

/// Message carried by every scope rejection. Never names the missing
/// scopes.
pub const INSUFFICIENT_SCOPES: &str = "Insufficient scopes";

/// The three terminal failure states of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RejectionKind {
    /// No bearer token was presented
    MissingToken,
    /// The token could not be verified (structure, key, signature, time or
    /// identity claims, or key-source failure)
    VerificationFailed,
    /// The token is valid but lacks one or more required scopes
    InsufficientScope,
}

impl RejectionKind {
    /// HTTP status for this kind
    pub fn status(self) -> StatusCode {
        match self {
            Self::MissingToken | Self::VerificationFailed => StatusCode::UNAUTHORIZED,
            Self::InsufficientScope => StatusCode::FORBIDDEN,
        }
    }

    /// The `error` field of the JSON body
    pub fn error_label(self) -> &'static str {
        match self {
            Self::MissingToken | Self::VerificationFailed => "Unauthorized",
            Self::InsufficientScope => "Forbidden",
        }
    }
}

impl fmt::Display for RejectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingToken => f.write_str("missing token"),
            Self::VerificationFailed => f.write_str("verification failed"),
            Self::InsufficientScope => f.write_str("insufficient scope"),
        }
    }
}

/// A classified, terminal rejection of a request
///
/// Constructed only through [`Rejection::missing_token`],
/// [`Rejection::verification_failed`] and [`Rejection::insufficient_scope`],
/// so a `MissingToken` never carries a message and the other two always do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    kind: RejectionKind,
    message: Option<String>,
}

impl Rejection {
    /// No token was presented
    pub fn missing_token() -> Self {
        Self {
            kind: RejectionKind::MissingToken,
            message: None,
        }
    }

    /// Verification failed with the given cause
    pub fn verification_failed(cause: impl Into<String>) -> Self {
        Self {
            kind: RejectionKind::VerificationFailed,
            message: Some(cause.into()),
        }
    }

    /// The token lacks required scopes
    pub fn insufficient_scope() -> Self {
        Self {
            kind: RejectionKind::InsufficientScope,
            message: Some(INSUFFICIENT_SCOPES.to_string()),
        }
    }

    /// Rejection kind
    pub fn kind(&self) -> RejectionKind {
        self.kind
    }

    /// Human-readable message, absent for `MissingToken`
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// HTTP status code
    pub fn status(&self) -> StatusCode {
        self.kind.status()
    }

    /// JSON-shaped response body
    pub fn body(&self) -> RejectionBody {
        RejectionBody {
            error: self.kind.error_label().to_string(),
            message: self.message.clone(),
        }
    }

    /// Serialized response body
    pub fn to_json(&self) -> String {
        // Two string fields; serialization cannot fail in practice.
        serde_json::to_string(&self.body())
            .unwrap_or_else(|_| format!(r#"{{"error":"{}"}}"#, self.kind.error_label()))
    }

    /// RFC 6750 `WWW-Authenticate` challenge for this rejection
    pub fn www_authenticate(&self) -> String {
        match self.kind {
            RejectionKind::MissingToken => "Bearer".to_string(),
            RejectionKind::VerificationFailed => {
                let description = self
                    .message
                    .as_deref()
                    .unwrap_or_default()
                    .replace(['"', '\\'], "'");
                format!(r#"Bearer error="invalid_token", error_description="{description}""#)
            }
            RejectionKind::InsufficientScope => r#"Bearer error="insufficient_scope""#.to_string(),
        }
    }

    /// Render as an HTTP response
    ///
    /// Works with any body type that can be built from a `String`
    /// (`String`, `axum::body::Body`, `http_body_util::Full<Bytes>`, ...).
    pub fn into_response<B>(self) -> http::Response<B>
    where
        B: From<String>,
    {
        let challenge = HeaderValue::from_str(&self.www_authenticate())
            .unwrap_or_else(|_| HeaderValue::from_static("Bearer"));

        let mut response = http::Response::new(B::from(self.to_json()));
        *response.status_mut() = self.status();
        let headers = response.headers_mut();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(header::WWW_AUTHENTICATE, challenge);
        response
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{}: {message}", self.kind),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl std::error::Error for Rejection {}

/// JSON body of a rejection response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectionBody {
    /// `Unauthorized` or `Forbidden`
    pub error: String,
    /// Cause, omitted for a missing token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

//! Common test utilities for integration tests
//!
//! A wiremock key source that publishes HMAC keys, plus token minting that
//! signs with the same secret. HS256 keeps the fixtures small; the guard
//! under test is configured to allow it.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bearer_guard::{GuardConfig, KeyStore, ResourceServerGuard};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde_json::{Value, json};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
};

/// Base64 HMAC secret published as the `k` of every test key
pub const SECRET_K: &str = "c2lnbmluZ2tleWZvcnRlc3RzMDEyMzQ1Njc4OWFiY2RlZmdoaWprbG1ub3BxcnN0";

/// Issuer every minted token carries by default
pub const ISSUER: &str = "https://auth.example.com";

/// Audience every minted token carries by default
pub const AUDIENCE: &str = "orders-api";

/// Symmetric JWK for `kid`
pub fn oct_jwk(kid: &str) -> Value {
    json!({"kty": "oct", "kid": kid, "alg": "HS256", "use": "sig", "k": SECRET_K})
}

/// JWKS document holding the given keys
pub fn jwks(keys: &[Value]) -> Value {
    json!({ "keys": keys })
}

/// Seconds since the epoch
pub fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock before epoch")
        .as_secs()
}

/// Claims for a valid token granting `scope`
pub fn claims(scope: &str) -> Value {
    json!({
        "sub": "user-42",
        "iss": ISSUER,
        "aud": AUDIENCE,
        "scope": scope,
        "iat": now(),
        "exp": now() + 600,
    })
}

/// Sign `claims` with HS256 under `kid`
pub fn mint(kid: &str, claims: &Value) -> String {
    let mut header = Header::new(Algorithm::HS256);
    header.kid = Some(kid.to_string());
    encode(
        &header,
        claims,
        &EncodingKey::from_base64_secret(SECRET_K).expect("valid base64 secret"),
    )
    .expect("token encodes")
}

/// Mock key source
pub struct MockKeySource {
    pub server: MockServer,
    pub jwks_uri: String,
}

impl MockKeySource {
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        let jwks_uri = format!("{}/jwks", server.uri());
        Self { server, jwks_uri }
    }

    /// Serve `keys` on every request
    pub async fn serve(&self, keys: &[Value]) {
        Mock::given(method("GET"))
            .and(path("/jwks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks(keys)))
            .mount(&self.server)
            .await;
    }

    /// Serve `keys`, expecting exactly `hits` requests, each delayed by `delay`
    pub async fn serve_expecting(&self, keys: &[Value], hits: u64, delay: Duration) {
        Mock::given(method("GET"))
            .and(path("/jwks"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(jwks(keys))
                    .set_delay(delay),
            )
            .expect(hits)
            .mount(&self.server)
            .await;
    }

    /// Answer every request with `status`
    pub async fn fail_with(&self, status: u16) {
        Mock::given(method("GET"))
            .and(path("/jwks"))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    /// Number of key-source requests received so far
    pub async fn hits(&self) -> usize {
        self.server
            .received_requests()
            .await
            .map(|requests| requests.len())
            .unwrap_or_default()
    }

    /// Guard configuration pointing at this key source
    pub fn config(&self) -> GuardConfig {
        GuardConfig::new(&self.jwks_uri, ISSUER)
            .with_audience(AUDIENCE)
            .with_algorithms(vec![Algorithm::HS256])
    }

    /// Guard built from [`MockKeySource::config`] with extra settings
    pub fn guard(&self, customize: impl FnOnce(GuardConfig) -> GuardConfig) -> ResourceServerGuard {
        ResourceServerGuard::new(customize(self.config())).expect("valid guard config")
    }

    /// Standalone key store
    pub fn key_store(&self, max_age: Duration, fetch_timeout: Duration) -> Arc<KeyStore> {
        Arc::new(
            KeyStore::new(
                self.jwks_uri.parse().expect("valid uri"),
                max_age,
                fetch_timeout,
            )
            .expect("client builds"),
        )
    }
}

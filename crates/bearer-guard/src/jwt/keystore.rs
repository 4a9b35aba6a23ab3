//! JWKS (JSON Web Key Set) fetching and caching
//!
//! [`KeyStore`] owns the cached [`KeySet`] of one key source and resolves a
//! `kid` to a verification key:
//!
//! - **Fresh hit**: the key is returned without touching the network.
//! - **Stale set or unknown `kid`**: the set is refreshed with one HTTP GET,
//!   bounded by the fetch timeout, and replaced wholesale on success.
//! - **Single-flight**: concurrent resolutions that need a refresh share one
//!   in-flight fetch and all observe its outcome, success or failure.
//! - **No partial updates**: a failed or timed-out fetch leaves the cached set
//!   untouched; the next resolution simply tries again.
//!
//! There is no background refresh. Refresh is driven by resolutions only.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use futures::future::{BoxFuture, FutureExt, Shared};
use jsonwebtoken::jwk::Jwk;
use jsonwebtoken::{Algorithm, DecodingKey};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use url::Url;

/// Key resolution failures
///
/// `Clone` so that one fetch outcome can be handed to every waiter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyStoreError {
    /// The `kid` is not in the key set, even after a refresh
    #[error("unknown key identifier")]
    UnknownKey(String),

    /// Transport-level failure talking to the key source
    #[error("key source request failed: {0}")]
    Fetch(String),

    /// The key source answered with a non-success status
    #[error("key source returned status {0}")]
    Status(u16),

    /// The fetch exceeded the configured timeout
    #[error("key source request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// The response was not a key set document
    #[error("invalid key set: {0}")]
    Parse(String),
}

/// A single verification key
///
/// Immutable once built from a JWK.
#[derive(Clone)]
pub struct SigningKey {
    kid: String,
    algorithm: Option<Algorithm>,
    key: DecodingKey,
}

impl SigningKey {
    /// Create a signing key from its parts
    pub fn new(kid: impl Into<String>, algorithm: Option<Algorithm>, key: DecodingKey) -> Self {
        Self {
            kid: kid.into(),
            algorithm,
            key,
        }
    }

    /// Build a signing key from one raw JWK entry
    ///
    /// # Errors
    ///
    /// Returns a reason string when the entry is an encryption key, has no
    /// `kid`, declares an unsupported `alg`, or holds unusable key material.
    pub fn from_jwk(raw: &Value) -> Result<Self, String> {
        if raw.get("use").and_then(Value::as_str) == Some("enc") {
            return Err("encryption key".to_string());
        }

        let kid = raw
            .get("kid")
            .and_then(Value::as_str)
            .filter(|kid| !kid.is_empty())
            .ok_or_else(|| "missing kid".to_string())?;

        let algorithm = match raw.get("alg").and_then(Value::as_str) {
            Some(alg) => Some(
                Algorithm::from_str(alg).map_err(|_| format!("unsupported alg {alg}"))?,
            ),
            None => None,
        };

        let jwk: Jwk = serde_json::from_value(raw.clone()).map_err(|e| format!("invalid JWK: {e}"))?;
        let key = DecodingKey::from_jwk(&jwk).map_err(|e| format!("unusable key material: {e}"))?;

        Ok(Self::new(kid, algorithm, key))
    }

    /// Key identifier
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Algorithm declared by the key, if any
    pub fn algorithm(&self) -> Option<Algorithm> {
        self.algorithm
    }

    /// Key material for signature verification
    pub fn decoding_key(&self) -> &DecodingKey {
        &self.key
    }
}

// Key material stays out of logs
impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct JwksDocument {
    keys: Vec<Value>,
}

/// A snapshot of the key source: `kid` -> key, plus freshness metadata
///
/// Never mutated after construction; refreshes replace the whole set.
#[derive(Debug, Clone)]
pub struct KeySet {
    keys: HashMap<String, Arc<SigningKey>>,
    fetched_at: Option<Instant>,
    max_age: Duration,
}

impl KeySet {
    /// The empty, always-stale set a store starts with
    pub fn empty(max_age: Duration) -> Self {
        Self {
            keys: HashMap::new(),
            fetched_at: None,
            max_age,
        }
    }

    /// Build a set from signing keys, stamped as fetched now
    pub fn new(keys: impl IntoIterator<Item = SigningKey>, max_age: Duration) -> Self {
        Self {
            keys: keys
                .into_iter()
                .map(|key| (key.kid.clone(), Arc::new(key)))
                .collect(),
            fetched_at: Some(Instant::now()),
            max_age,
        }
    }

    /// Parse a JWKS document
    ///
    /// Individual entries that cannot be used for signature verification are
    /// skipped; the document itself must be an object with a `keys` array.
    ///
    /// # Errors
    ///
    /// Returns [`KeyStoreError::Parse`] if the document is not a key set.
    pub fn from_jwks(document: &[u8], max_age: Duration) -> Result<Self, KeyStoreError> {
        let document: JwksDocument =
            serde_json::from_slice(document).map_err(|e| KeyStoreError::Parse(e.to_string()))?;

        let keys = document
            .keys
            .iter()
            .filter_map(|raw| match SigningKey::from_jwk(raw) {
                Ok(key) => Some(key),
                Err(reason) => {
                    let kid = raw.get("kid").and_then(Value::as_str).unwrap_or("<none>");
                    warn!(
                        kid = kid,
                        reason = %reason,
                        "Skipping JWK"
                    );
                    None
                }
            });

        Ok(Self::new(keys, max_age))
    }

    /// Look up a key by `kid`
    pub fn get(&self, kid: &str) -> Option<Arc<SigningKey>> {
        self.keys.get(kid).cloned()
    }

    /// Whether the set holds `kid`
    pub fn contains(&self, kid: &str) -> bool {
        self.keys.contains_key(kid)
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// True when the set holds no keys
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// True while the set is younger than its max age
    pub fn is_fresh(&self) -> bool {
        self.fetched_at
            .is_some_and(|fetched_at| fetched_at.elapsed() < self.max_age)
    }
}

type Refresh = Shared<BoxFuture<'static, Result<Arc<KeySet>, KeyStoreError>>>;

/// Cached, single-flight view of one remote key source
///
/// # Example
///
/// ```rust,no_run
/// # use bearer_guard::jwt::KeyStore;
/// # use std::time::Duration;
/// # tokio_test::block_on(async {
/// let store = KeyStore::new(
///     "https://auth.example.com/.well-known/jwks.json".parse()?,
///     Duration::from_secs(600),
///     Duration::from_secs(5),
/// )?;
///
/// let key = store.resolve("key-2025-01").await?;
/// println!("resolved {}", key.kid());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// # });
/// ```
pub struct KeyStore {
    key_source: Url,
    http_client: reqwest::Client,
    max_age: Duration,
    fetch_timeout: Duration,
    current: Arc<ArcSwap<KeySet>>,
    in_flight: Mutex<Option<Refresh>>,
}

impl KeyStore {
    /// Create a key store with its own HTTP client
    ///
    /// # Errors
    ///
    /// Returns [`KeyStoreError::Fetch`] if the HTTP client cannot be built.
    pub fn new(
        key_source: Url,
        max_age: Duration,
        fetch_timeout: Duration,
    ) -> Result<Self, KeyStoreError> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(fetch_timeout)
            .build()
            .map_err(|e| KeyStoreError::Fetch(format!("failed to build HTTP client: {e}")))?;

        Ok(Self::with_client(
            key_source,
            http_client,
            max_age,
            fetch_timeout,
        ))
    }

    /// Create a key store around an existing HTTP client
    pub fn with_client(
        key_source: Url,
        http_client: reqwest::Client,
        max_age: Duration,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            key_source,
            http_client,
            max_age,
            fetch_timeout,
            current: Arc::new(ArcSwap::from_pointee(KeySet::empty(max_age))),
            in_flight: Mutex::new(None),
        }
    }

    /// Seed the cache with a known key set
    ///
    /// The set is served until it goes stale like any fetched set.
    pub fn with_preloaded(self, key_set: KeySet) -> Self {
        self.current.store(Arc::new(key_set));
        self
    }

    /// Resolve `kid` to a signing key
    ///
    /// # Errors
    ///
    /// - [`KeyStoreError::UnknownKey`] if `kid` is absent after a successful refresh
    /// - any fetch error if the refresh failed
    pub async fn resolve(&self, kid: &str) -> Result<Arc<SigningKey>, KeyStoreError> {
        let observed = self.current.load_full();
        if observed.is_fresh() {
            if let Some(key) = observed.get(kid) {
                debug!(kid = kid, "Using cached signing key");
                return Ok(key);
            }
            debug!(kid = kid, "Key not in cached set, refreshing");
        }

        let refreshed = self.refresh(&observed).await?;
        refreshed.get(kid).ok_or_else(|| {
            warn!(kid = kid, key_source = %self.key_source, "Key ID not found in key set");
            KeyStoreError::UnknownKey(kid.to_string())
        })
    }

    /// Refresh the cached set, joining an in-flight refresh if there is one
    ///
    /// `observed` is the set the caller found wanting. If another refresh
    /// replaced it with a fresh set in the meantime, that set is returned
    /// without a fetch. A set replaced by [`KeyStore::invalidate`] is stale
    /// and still triggers one.
    async fn refresh(&self, observed: &Arc<KeySet>) -> Result<Arc<KeySet>, KeyStoreError> {
        let flight = {
            let mut slot = self.in_flight.lock();
            match slot.as_ref() {
                Some(flight) => {
                    debug!(key_source = %self.key_source, "Joining in-flight key refresh");
                    flight.clone()
                }
                None => {
                    let current = self.current.load_full();
                    if current.is_fresh() && !Arc::ptr_eq(&current, observed) {
                        return Ok(current);
                    }
                    let flight = self.start_fetch();
                    *slot = Some(flight.clone());
                    flight
                }
            }
        };

        let outcome = flight.clone().await;

        let mut slot = self.in_flight.lock();
        if slot.as_ref().is_some_and(|current| current.ptr_eq(&flight)) {
            *slot = None;
        }

        outcome
    }

    fn start_fetch(&self) -> Refresh {
        fetch_key_set(
            self.http_client.clone(),
            self.key_source.clone(),
            self.fetch_timeout,
            self.max_age,
            Arc::clone(&self.current),
        )
        .boxed()
        .shared()
    }

    /// The currently cached key set
    pub fn snapshot(&self) -> Arc<KeySet> {
        self.current.load_full()
    }

    /// Drop the cached set so the next resolution refreshes
    pub fn invalidate(&self) {
        self.current.store(Arc::new(KeySet::empty(self.max_age)));
        debug!(key_source = %self.key_source, "Key set cache cleared");
    }

    /// Key source URI
    pub fn key_source(&self) -> &Url {
        &self.key_source
    }

    /// Freshness window of fetched sets
    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// Upper bound on a single fetch
    pub fn fetch_timeout(&self) -> Duration {
        self.fetch_timeout
    }
}

impl fmt::Debug for KeyStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyStore")
            .field("key_source", &self.key_source.as_str())
            .field("max_age", &self.max_age)
            .field("fetch_timeout", &self.fetch_timeout)
            .field("cached_keys", &self.current.load().len())
            .field("refresh_in_flight", &self.in_flight.lock().is_some())
            .finish()
    }
}

/// One fetch of the key source. Stores the parsed set on success only.
async fn fetch_key_set(
    http_client: reqwest::Client,
    key_source: Url,
    fetch_timeout: Duration,
    max_age: Duration,
    current: Arc<ArcSwap<KeySet>>,
) -> Result<Arc<KeySet>, KeyStoreError> {
    info!(key_source = %key_source, "Fetching signing keys from key source");

    let request = async {
        let response = http_client
            .get(key_source.clone())
            .send()
            .await
            .map_err(|e| KeyStoreError::Fetch(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(KeyStoreError::Status(status.as_u16()));
        }

        response
            .bytes()
            .await
            .map_err(|e| KeyStoreError::Fetch(e.to_string()))
    };

    let body = match tokio::time::timeout(fetch_timeout, request).await {
        Ok(Ok(body)) => body,
        Ok(Err(e)) => {
            error!(key_source = %key_source, error = %e, "Failed to fetch key set");
            return Err(e);
        }
        Err(_) => {
            error!(
                key_source = %key_source,
                timeout_ms = fetch_timeout.as_millis(),
                "Key set fetch timed out"
            );
            return Err(KeyStoreError::Timeout(fetch_timeout));
        }
    };

    let key_set = KeySet::from_jwks(&body, max_age).map_err(|e| {
        error!(key_source = %key_source, error = %e, "Failed to parse key set");
        e
    })?;

    info!(
        key_source = %key_source,
        key_count = key_set.len(),
        "Successfully fetched key set"
    );

    let key_set = Arc::new(key_set);
    current.store(Arc::clone(&key_set));
    Ok(key_set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // 64 base64 characters with no '+', '/', '-' or '_', so standard and
    // URL-safe decoders agree on the secret.
    const SECRET_K: &str = "c2lnbmluZ2tleWZvcnRlc3RzMDEyMzQ1Njc4OWFiY2RlZmdoaWprbG1ub3BxcnN0";

    fn oct_jwk(kid: &str) -> Value {
        json!({"kty": "oct", "kid": kid, "alg": "HS256", "use": "sig", "k": SECRET_K})
    }

    fn store() -> KeyStore {
        KeyStore::new(
            "https://auth.example.com/jwks".parse().unwrap(),
            Duration::from_secs(600),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_signing_key_from_jwk() {
        let key = SigningKey::from_jwk(&oct_jwk("k1")).unwrap();
        assert_eq!(key.kid(), "k1");
        assert_eq!(key.algorithm(), Some(Algorithm::HS256));
    }

    #[test]
    fn test_signing_key_rejects_unusable_entries() {
        let mut enc = oct_jwk("k1");
        enc["use"] = json!("enc");
        assert_eq!(SigningKey::from_jwk(&enc).unwrap_err(), "encryption key");

        let mut no_kid = oct_jwk("k1");
        no_kid.as_object_mut().unwrap().remove("kid");
        assert_eq!(SigningKey::from_jwk(&no_kid).unwrap_err(), "missing kid");

        let mut bad_alg = oct_jwk("k1");
        bad_alg["alg"] = json!("XX999");
        assert!(SigningKey::from_jwk(&bad_alg).unwrap_err().contains("unsupported alg"));
    }

    #[test]
    fn test_key_set_skips_bad_entries() {
        let document = json!({
            "keys": [oct_jwk("good"), {"kty": "oct", "k": SECRET_K}, {"kid": "junk"}]
        });
        let set = KeySet::from_jwks(document.to_string().as_bytes(), Duration::from_secs(60))
            .unwrap();

        assert_eq!(set.len(), 1);
        assert!(set.contains("good"));
        assert!(set.get("junk").is_none());
        assert!(set.is_fresh());
    }

    #[test]
    fn test_key_set_rejects_non_jwks_documents() {
        let documents: [&[u8]; 3] = [b"not json", br#"{"no_keys": []}"#, b"[1, 2, 3]"];
        for document in documents {
            let err = KeySet::from_jwks(document, Duration::from_secs(60)).unwrap_err();
            assert!(matches!(err, KeyStoreError::Parse(_)));
        }
    }

    #[test]
    fn test_empty_key_set_is_stale() {
        let set = KeySet::empty(Duration::from_secs(600));
        assert!(set.is_empty());
        assert!(!set.is_fresh());
    }

    #[test]
    fn test_zero_max_age_is_never_fresh() {
        let set = KeySet::new(Vec::new(), Duration::ZERO);
        assert!(!set.is_fresh());
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            KeyStoreError::UnknownKey("k9".into()).to_string(),
            "unknown key identifier"
        );
        assert_eq!(
            KeyStoreError::Timeout(Duration::from_millis(250)).to_string(),
            "key source request timed out after 250ms"
        );
        assert_eq!(
            KeyStoreError::Status(503).to_string(),
            "key source returned status 503"
        );
    }

    #[tokio::test]
    async fn test_new_store_starts_empty() {
        let store = store();
        assert!(store.snapshot().is_empty());
        assert!(!store.snapshot().is_fresh());
        assert_eq!(store.key_source().as_str(), "https://auth.example.com/jwks");
    }

    #[tokio::test]
    async fn test_invalidate_replaces_set() {
        let store = store();
        let store = store.with_preloaded(KeySet::new(
            vec![SigningKey::from_jwk(&oct_jwk("k1")).unwrap()],
            Duration::from_secs(600),
        ));
        assert!(store.snapshot().contains("k1"));

        store.invalidate();
        assert!(store.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_fresh_hit_needs_no_network() {
        // The key source host does not resolve; a fresh hit must not touch it.
        let store = KeyStore::new(
            "https://key-source.invalid/jwks".parse().unwrap(),
            Duration::from_secs(600),
            Duration::from_millis(100),
        )
        .unwrap()
        .with_preloaded(KeySet::new(
            vec![SigningKey::from_jwk(&oct_jwk("k1")).unwrap()],
            Duration::from_secs(600),
        ));

        let key = store.resolve("k1").await.unwrap();
        assert_eq!(key.kid(), "k1");
    }

    #[tokio::test]
    async fn test_refresh_after_invalidate_still_fetches() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jwks"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"keys": [oct_jwk("k2")]})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let store = KeyStore::new(
            format!("{}/jwks", server.uri()).parse().unwrap(),
            Duration::from_secs(600),
            Duration::from_secs(5),
        )
        .unwrap()
        .with_preloaded(KeySet::new(
            vec![SigningKey::from_jwk(&oct_jwk("k1")).unwrap()],
            Duration::from_secs(600),
        ));

        // A resolution for k2 saw the preloaded set; the cache is cleared
        // before it gets to refresh.
        let observed = store.snapshot();
        store.invalidate();

        let refreshed = store.refresh(&observed).await.unwrap();
        assert!(refreshed.contains("k2"));
        assert!(store.snapshot().contains("k2"));
    }

    #[test]
    fn test_key_set_skips_entry_without_kid_string() {
        let document = json!({
            "keys": [oct_jwk("ok"), {"kty": "oct", "kid": 7, "k": SECRET_K}]
        });
        let set =
            KeySet::from_jwks(document.to_string().as_bytes(), Duration::from_secs(60)).unwrap();
        assert_eq!(set.len(), 1);
        assert!(set.contains("ok"));
    }
}

//! Guard Configuration
//!
//! [`GuardConfig`] is supplied once, when the guard is built, and never
//! changes afterwards. It can be built in code or loaded from a TOML, YAML or
//! JSON file with environment variable overrides.
//!
//! Durations are written in milliseconds:
//!
//! ```toml
//! key_source_uri = "https://auth.example.com/.well-known/jwks.json"
//! issuer = "https://auth.example.com"
//! audience = ["orders-api", "billing-api"]
//! required_scopes = ["orders:read"]
//! cache_max_age = 600000
//! fetch_timeout = 5000
//! ```

use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use jsonwebtoken::Algorithm;
use serde::{Deserialize, Serialize};
use serde_with::{DurationMilliSeconds, serde_as};
use url::{Host, Url};

use crate::jwt::Audience;
use crate::jwt::verifier::DEFAULT_ALGORITHMS;

/// Default environment variable prefix for file-based configuration
pub const DEFAULT_ENV_PREFIX: &str = "BEARER_GUARD";

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Key source URI does not parse
    #[error("Invalid key source URI {0}: {1}")]
    InvalidKeySourceUri(String, String),

    /// Key source is neither https nor loopback http
    #[error("Key source must use HTTPS (HTTP only allowed for loopback hosts): {0}")]
    InsecureKeySource(String),

    /// Issuer is empty
    #[error("Issuer must not be empty")]
    MissingIssuer,

    /// Audience list is present but empty
    #[error("Audience list must not be empty")]
    EmptyAudience,

    /// Fetch timeout is zero
    #[error("Fetch timeout must be greater than zero")]
    ZeroFetchTimeout,

    /// No algorithms allowed
    #[error("At least one signing algorithm must be allowed")]
    NoAlgorithms,

    /// HTTP client for the key source could not be built
    #[error("Failed to build key source client: {0}")]
    HttpClient(String),

    /// Config file not found
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    /// Unsupported file format
    #[error("Unsupported configuration file format. Use .toml, .yaml, .yml, or .json")]
    UnsupportedFormat,

    /// Configuration parsing error
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] config::ConfigError),
}

/// Resource-server guard configuration
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Where to fetch the signing key set (JWKS)
    #[serde(alias = "jwks_uri")]
    pub key_source_uri: String,

    /// Required exact `iss` value
    pub issuer: String,

    /// Accepted audiences; any one must appear in the token's `aud`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audience: Option<Audience>,

    /// Scopes that must all be granted
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_scopes: Vec<String>,

    /// Freshness window of the cached key set (default: 10 minutes)
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(default = "default_cache_max_age")]
    pub cache_max_age: Duration,

    /// Upper bound on one key-source fetch (default: 5 seconds)
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout: Duration,

    /// Clock skew tolerance for `exp`/`nbf` (default: zero)
    ///
    /// Applied in whole seconds; a fractional part rounds up.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(default)]
    pub clock_skew: Duration,

    /// Accepted signing algorithms (default: asymmetric RS*, PS*, ES256/384, EdDSA)
    #[serde(default = "default_algorithms")]
    pub algorithms: Vec<Algorithm>,
}

fn default_cache_max_age() -> Duration {
    Duration::from_secs(600)
}

fn default_fetch_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_algorithms() -> Vec<Algorithm> {
    DEFAULT_ALGORITHMS.to_vec()
}

impl GuardConfig {
    /// Create a configuration with defaults for everything but the key source and issuer
    pub fn new(key_source_uri: impl Into<String>, issuer: impl Into<String>) -> Self {
        Self {
            key_source_uri: key_source_uri.into(),
            issuer: issuer.into(),
            audience: None,
            required_scopes: Vec::new(),
            cache_max_age: default_cache_max_age(),
            fetch_timeout: default_fetch_timeout(),
            clock_skew: Duration::ZERO,
            algorithms: default_algorithms(),
        }
    }

    /// Require one of these audiences
    #[must_use]
    pub fn with_audience(mut self, audience: impl Into<Audience>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    /// Require all of these scopes
    #[must_use]
    pub fn with_required_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Set the key set freshness window
    #[must_use]
    pub fn with_cache_max_age(mut self, max_age: Duration) -> Self {
        self.cache_max_age = max_age;
        self
    }

    /// Set the key-source fetch timeout
    #[must_use]
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Set clock skew tolerance
    #[must_use]
    pub fn with_clock_skew(mut self, leeway: Duration) -> Self {
        self.clock_skew = leeway;
        self
    }

    /// Set accepted signing algorithms
    #[must_use]
    pub fn with_algorithms(mut self, algorithms: Vec<Algorithm>) -> Self {
        self.algorithms = algorithms;
        self
    }

    /// Parse and vet the key source URI
    ///
    /// # Errors
    ///
    /// Returns an error if the URI does not parse, or uses anything other
    /// than `https` (plain `http` is accepted for loopback hosts only).
    pub fn key_source_url(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.key_source_uri).map_err(|e| {
            ConfigError::InvalidKeySourceUri(self.key_source_uri.clone(), e.to_string())
        })?;

        match url.scheme() {
            "https" => Ok(url),
            "http" if is_loopback(&url) => Ok(url),
            _ => Err(ConfigError::InsecureKeySource(self.key_source_uri.clone())),
        }
    }

    /// Check the configuration for values the guard cannot work with
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.key_source_url()?;

        if self.issuer.trim().is_empty() {
            return Err(ConfigError::MissingIssuer);
        }
        if self.audience.as_ref().is_some_and(Audience::is_empty) {
            return Err(ConfigError::EmptyAudience);
        }
        if self.fetch_timeout.is_zero() {
            return Err(ConfigError::ZeroFetchTimeout);
        }
        if self.algorithms.is_empty() {
            return Err(ConfigError::NoAlgorithms);
        }
        Ok(())
    }

    /// Load configuration from a file (TOML, YAML, or JSON)
    ///
    /// Environment variables with the `BEARER_GUARD_` prefix override file
    /// settings, e.g. `BEARER_GUARD_FETCH_TIMEOUT=2000`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file doesn't exist
    /// - The file format is unsupported
    /// - The file contains invalid configuration
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        Self::from_file_with_prefix(path, DEFAULT_ENV_PREFIX)
    }

    /// Load configuration from a file with a custom environment prefix
    ///
    /// # Errors
    ///
    /// See [`GuardConfig::from_file`].
    pub fn from_file_with_prefix(
        path: impl AsRef<std::path::Path>,
        env_prefix: &str,
    ) -> Result<Self, ConfigError> {
        use config::{Config, File, FileFormat};

        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let format = match path.extension().and_then(|s| s.to_str()) {
            Some("toml") => FileFormat::Toml,
            Some("yaml") | Some("yml") => FileFormat::Yaml,
            Some("json") => FileFormat::Json,
            _ => return Err(ConfigError::UnsupportedFormat),
        };

        let config = Config::builder()
            .add_source(File::new(
                path.to_str().ok_or(ConfigError::UnsupportedFormat)?,
                format,
            ))
            .add_source(
                config::Environment::with_prefix(env_prefix)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }
}

fn is_loopback(url: &Url) -> bool {
    match url.host() {
        Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
        Some(Host::Ipv4(ip)) => IpAddr::V4(ip).is_loopback(),
        Some(Host::Ipv6(ip)) => IpAddr::V6(ip).is_loopback(),
        None => false,
    }
}

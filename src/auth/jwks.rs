//! Signing key provider: JWKS fetch and caching.
//!
//! # Caching
//!
//! - One entry per JWKS URL, fresh for `ttl` (default 1 hour).
//! - A refresh swaps in a complete `Arc<JwkSet>` with a single map insert, or
//!   leaves the previous set untouched when the fetch fails. Readers never see
//!   a partially updated set.
//! - Refreshes are serialized behind an async mutex; a caller that waited on the
//!   mutex re-checks the cache before fetching, so one expiry costs one fetch.
//! - An unknown `kid` forces a single refresh (key rotation) once the cached set
//!   is older than `min_refresh_interval`; younger sets answer `NotFound`
//!   directly so unknown kids cannot drive fetch traffic.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use jsonwebtoken::{
    DecodingKey,
    jwk::{AlgorithmParameters, JwkSet},
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Key lookup failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum KeyError {
    /// No usable key with this id in the provider's key set.
    #[error("Unknown key ID: {0}")]
    NotFound(String),

    /// The key set could not be fetched or parsed.
    #[error("JWKS fetch error: {0}")]
    Fetch(String),
}

impl From<reqwest::Error> for KeyError {
    fn from(err: reqwest::Error) -> Self {
        Self::Fetch(err.to_string())
    }
}

/// Where key sets come from.
#[async_trait::async_trait]
pub trait JwksSource: Send + Sync + 'static {
    /// Fetch the complete key set published at `jwks_uri`.
    async fn fetch(&self, jwks_uri: &str) -> Result<JwkSet, KeyError>;
}

/// Fetches key sets over HTTPS.
pub struct HttpJwksSource {
    http: reqwest::Client,
}

impl HttpJwksSource {
    /// Create a client that only talks HTTPS and gives up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialized.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .https_only(true)
            .timeout(timeout)
            .build()?;
        Ok(Self { http })
    }
}

#[async_trait::async_trait]
impl JwksSource for HttpJwksSource {
    async fn fetch(&self, jwks_uri: &str) -> Result<JwkSet, KeyError> {
        debug!("Fetching JWKS from {jwks_uri}");
        let jwks = self
            .http
            .get(jwks_uri)
            .send()
            .await?
            .error_for_status()?
            .json::<JwkSet>()
            .await?;
        Ok(jwks)
    }
}

/// A pinned key set, served regardless of the requested URL.
pub struct StaticJwksSource {
    keys: JwkSet,
}

impl StaticJwksSource {
    /// Serve `keys` on every fetch.
    #[must_use]
    pub fn new(keys: JwkSet) -> Self {
        Self { keys }
    }

    /// Load a JWKS JSON document from disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a JWKS document.
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let keys: JwkSet = serde_json::from_str(&raw)?;
        info!(path = %path.display(), keys = keys.keys.len(), "Loaded pinned JWKS");
        Ok(Self::new(keys))
    }
}

#[async_trait::async_trait]
impl JwksSource for StaticJwksSource {
    async fn fetch(&self, _jwks_uri: &str) -> Result<JwkSet, KeyError> {
        Ok(self.keys.clone())
    }
}

/// Cached JWKS entry.
struct CachedJwks {
    keys: Arc<JwkSet>,
    fetched_at: Instant,
}

/// Signing key provider for one identity provider.
pub struct KeyProvider {
    jwks_uri: String,
    source: Arc<dyn JwksSource>,
    cache: DashMap<String, CachedJwks>,
    refresh_lock: Mutex<()>,
    ttl: Duration,
    min_refresh_interval: Duration,
}

impl KeyProvider {
    /// Create a provider with the default 1-hour TTL and 30-second forced-refresh floor.
    #[must_use]
    pub fn new(jwks_uri: impl Into<String>, source: Arc<dyn JwksSource>) -> Self {
        Self {
            jwks_uri: jwks_uri.into(),
            source,
            cache: DashMap::new(),
            refresh_lock: Mutex::new(()),
            ttl: Duration::from_secs(3600),
            min_refresh_interval: Duration::from_secs(30),
        }
    }

    /// Override the cache TTL.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Override how old the cached set must be before an unknown `kid` refetches.
    #[must_use]
    pub fn with_min_refresh_interval(mut self, interval: Duration) -> Self {
        self.min_refresh_interval = interval;
        self
    }

    /// The URL key sets are fetched from.
    #[must_use]
    pub fn jwks_uri(&self) -> &str {
        &self.jwks_uri
    }

    /// Resolve the verification key for `kid`.
    ///
    /// # Errors
    ///
    /// [`KeyError::NotFound`] when no usable key carries this id, or
    /// [`KeyError::Fetch`] when the key set could not be obtained.
    pub async fn get_key(&self, kid: &str) -> Result<DecodingKey, KeyError> {
        let (keys, fetched_at) = match self.fresh_entry() {
            Some(entry) => entry,
            None => self.refresh(None).await?,
        };

        if let Some(key) = find_key_in_jwks(&keys, kid) {
            return Ok(key);
        }

        if fetched_at.elapsed() < self.min_refresh_interval {
            return Err(KeyError::NotFound(kid.to_string()));
        }

        debug!(kid = %kid, "Key not found in cached JWKS, refreshing");
        let (keys, _) = self.refresh(Some(fetched_at)).await?;
        find_key_in_jwks(&keys, kid).ok_or_else(|| KeyError::NotFound(kid.to_string()))
    }

    fn fresh_entry(&self) -> Option<(Arc<JwkSet>, Instant)> {
        let cached = self.cache.get(&self.jwks_uri)?;
        if cached.fetched_at.elapsed() >= self.ttl {
            return None;
        }
        Some((Arc::clone(&cached.keys), cached.fetched_at))
    }

    /// Fetch and install a new key set.
    ///
    /// `seen` is the fetch instant of the set the caller found wanting. If the
    /// cache already holds something newer (another task refreshed while this
    /// one waited for the lock), that set is returned without fetching.
    async fn refresh(&self, seen: Option<Instant>) -> Result<(Arc<JwkSet>, Instant), KeyError> {
        let _guard = self.refresh_lock.lock().await;

        if let Some(cached) = self.cache.get(&self.jwks_uri) {
            let newer = seen.is_none_or(|s| cached.fetched_at > s);
            if newer && cached.fetched_at.elapsed() < self.ttl {
                return Ok((Arc::clone(&cached.keys), cached.fetched_at));
            }
        }

        let keys = match self.source.fetch(&self.jwks_uri).await {
            Ok(keys) => Arc::new(keys),
            Err(e) => {
                warn!(jwks_uri = %self.jwks_uri, error = %e, "JWKS refresh failed");
                return Err(e);
            }
        };
        let fetched_at = Instant::now();
        debug!(jwks_uri = %self.jwks_uri, keys = keys.keys.len(), "JWKS refreshed");

        self.cache.insert(
            self.jwks_uri.clone(),
            CachedJwks {
                keys: Arc::clone(&keys),
                fetched_at,
            },
        );

        Ok((keys, fetched_at))
    }
}

/// Find an RSA JWK by `kid` and convert it to a `DecodingKey`.
fn find_key_in_jwks(jwks: &JwkSet, kid: &str) -> Option<DecodingKey> {
    let jwk = jwks
        .keys
        .iter()
        .find(|jwk| jwk.common.key_id.as_deref() == Some(kid))?;

    match &jwk.algorithm {
        AlgorithmParameters::RSA(rsa) => DecodingKey::from_rsa_components(&rsa.n, &rsa.e).ok(),
        _ => {
            debug!(kid = %kid, "Ignoring non-RSA key");
            None
        }
    }
}

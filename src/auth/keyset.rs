//! Identity provider signing keys (JWKS) with snapshot caching.
//!
//! # Refresh policy
//!
//! - First lookup fetches the whole key set.
//! - A snapshot older than `max_age` is refreshed on the next lookup. If that
//!   refresh fails the stale snapshot keeps serving and the failure is logged.
//! - An unknown `kid` triggers at most one refresh per lookup, counting an
//!   age-triggered one. A miss after that is [`KeySetError::NotFound`], or the
//!   fetch error if the refresh failed.
//!
//! # Concurrency model
//!
//! The current [`KeySetSnapshot`] sits behind an `ArcSwapOption` and is only
//! ever replaced whole. Readers clone the `Arc` and keep verifying against it
//! even if a refresh lands mid-request. Refreshes serialize on an async mutex;
//! a caller that waited on the lock shares the outcome of the fetch that ran
//! while it waited (the new snapshot or the failure) instead of fetching again.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use jsonwebtoken::{
    Algorithm, DecodingKey,
    jwk::{AlgorithmParameters, Jwk, JwkSet, KeyAlgorithm, PublicKeyUse},
};
use tracing::{debug, info, warn};

use super::{AuthFailureKind, Denied};
use crate::config::AuthConfig;

/// Key set lookup failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeySetError {
    /// `kid` not present after a refresh
    #[error("signing key '{0}' not found in the identity provider key set")]
    NotFound(String),

    /// Network, HTTP status, timeout or parse failure while fetching
    #[error("key set fetch failed: {0}")]
    FetchFailed(String),
}

impl From<KeySetError> for Denied {
    fn from(err: KeySetError) -> Self {
        let kind = match err {
            KeySetError::NotFound(_) => AuthFailureKind::KeyNotFound,
            KeySetError::FetchFailed(_) => AuthFailureKind::KeyFetchFailed,
        };
        Denied::new(kind, err.to_string())
    }
}

/// One RSA public key from the identity provider.
#[derive(Clone)]
pub struct SigningKey {
    key_id: String,
    algorithm: Algorithm,
    modulus: String,
    exponent: String,
    decoding_key: DecodingKey,
}

impl SigningKey {
    /// Build from base64url modulus and exponent.
    ///
    /// # Errors
    ///
    /// Returns the `jsonwebtoken` error when the components don't decode.
    pub fn from_rsa_components(
        key_id: impl Into<String>,
        modulus: &str,
        exponent: &str,
    ) -> Result<Self, jsonwebtoken::errors::Error> {
        let decoding_key = DecodingKey::from_rsa_components(modulus, exponent)?;
        Ok(Self {
            key_id: key_id.into(),
            algorithm: Algorithm::RS256,
            modulus: modulus.to_string(),
            exponent: exponent.to_string(),
            decoding_key,
        })
    }

    /// Build from a JWK, or `None` if it isn't a usable RS256 signing key.
    fn from_jwk(jwk: &Jwk) -> Option<Self> {
        let kid = jwk.common.key_id.as_deref()?;

        if let Some(alg) = &jwk.common.key_algorithm {
            if *alg != KeyAlgorithm::RS256 {
                debug!(kid = %kid, alg = ?alg, "Skipping JWK with unsupported algorithm");
                return None;
            }
        }
        if let Some(key_use) = &jwk.common.public_key_use {
            if !matches!(key_use, PublicKeyUse::Signature) {
                debug!(kid = %kid, "Skipping JWK not intended for signatures");
                return None;
            }
        }

        let AlgorithmParameters::RSA(rsa) = &jwk.algorithm else {
            debug!(kid = %kid, "Skipping non-RSA JWK");
            return None;
        };

        match Self::from_rsa_components(kid, &rsa.n, &rsa.e) {
            Ok(key) => Some(key),
            Err(e) => {
                warn!(kid = %kid, error = %e, "Skipping JWK with invalid RSA components");
                None
            }
        }
    }

    /// Key identifier (`kid`)
    #[must_use]
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Signing algorithm; always RS256
    #[must_use]
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Base64url modulus
    #[must_use]
    pub fn modulus(&self) -> &str {
        &self.modulus
    }

    /// Base64url public exponent
    #[must_use]
    pub fn exponent(&self) -> &str {
        &self.exponent
    }

    pub(crate) fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("key_id", &self.key_id)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

/// An immutable view of the key set as of one fetch.
#[derive(Debug)]
pub struct KeySetSnapshot {
    keys: Vec<Arc<SigningKey>>,
    fetched_at: Instant,
    generation: u64,
}

impl KeySetSnapshot {
    /// Keep the usable keys of `jwks`; the first key wins on a duplicate `kid`.
    #[must_use]
    pub fn from_jwks(jwks: &JwkSet, generation: u64) -> Self {
        let mut keys: Vec<Arc<SigningKey>> = Vec::with_capacity(jwks.keys.len());
        for key in jwks.keys.iter().filter_map(SigningKey::from_jwk) {
            if keys.iter().any(|k| k.key_id == key.key_id) {
                debug!(kid = %key.key_id, "Duplicate kid in key set, keeping first");
                continue;
            }
            keys.push(Arc::new(key));
        }

        Self {
            keys,
            fetched_at: Instant::now(),
            generation,
        }
    }

    /// Look up a key by `kid`.
    #[must_use]
    pub fn get(&self, key_id: &str) -> Option<Arc<SigningKey>> {
        self.keys.iter().find(|k| k.key_id == key_id).cloned()
    }

    /// Key identifiers in fetch order.
    pub fn key_ids(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(|k| k.key_id.as_str())
    }

    /// Number of usable keys
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the provider published no usable keys
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Time since this snapshot was fetched
    #[must_use]
    pub fn age(&self) -> Duration {
        self.fetched_at.elapsed()
    }

    /// Monotonic fetch counter; later snapshots have larger values.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Source of the identity provider's key set.
#[async_trait]
pub trait KeySetFetcher: Send + Sync {
    /// Fetch the full key set.
    async fn fetch(&self) -> Result<JwkSet, KeySetError>;
}

/// Fetches the key set with an HTTP GET.
pub struct HttpKeySetFetcher {
    http: reqwest::Client,
    url: String,
}

impl HttpKeySetFetcher {
    /// Create a fetcher for `url` whose requests give up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>, timeout: Duration) -> crate::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            url: url.into(),
        })
    }

    /// The JWKS endpoint
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl KeySetFetcher for HttpKeySetFetcher {
    async fn fetch(&self) -> Result<JwkSet, KeySetError> {
        debug!(url = %self.url, "Fetching JWKS");
        let response = self
            .http
            .get(&self.url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| KeySetError::FetchFailed(e.to_string()))?;

        response
            .json::<JwkSet>()
            .await
            .map_err(|e| KeySetError::FetchFailed(format!("invalid JWKS document: {e}")))
    }
}

/// Shared cache of the current key set snapshot.
pub struct KeySetCache {
    current: ArcSwapOption<KeySetSnapshot>,
    /// Serializes fetches; holds the failure of the last attempt, if it failed.
    refresh_lock: tokio::sync::Mutex<Option<KeySetError>>,
    /// Completed fetch attempts, successful or not.
    attempts: AtomicU64,
    generation: AtomicU64,
    fetcher: Arc<dyn KeySetFetcher>,
    fetch_timeout: Duration,
    max_age: Duration,
}

/// How [`KeySetCache::load`] obtained its snapshot.
enum Loaded {
    /// Served from cache without fetching
    Cached(Arc<KeySetSnapshot>),
    /// Refreshed during this lookup
    Refreshed(Arc<KeySetSnapshot>),
    /// Refresh was attempted and failed; the stale snapshot is still served
    Stale(Arc<KeySetSnapshot>, KeySetError),
}

impl KeySetCache {
    /// Create an empty cache; nothing is fetched until the first lookup.
    #[must_use]
    pub fn new(fetcher: Arc<dyn KeySetFetcher>, fetch_timeout: Duration, max_age: Duration) -> Self {
        Self {
            current: ArcSwapOption::empty(),
            refresh_lock: tokio::sync::Mutex::new(None),
            attempts: AtomicU64::new(0),
            generation: AtomicU64::new(0),
            fetcher,
            fetch_timeout,
            max_age,
        }
    }

    /// Create a cache backed by the configured JWKS endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &AuthConfig) -> crate::Result<Self> {
        let fetcher = HttpKeySetFetcher::new(config.resolved_jwks_url(), config.jwks_fetch_timeout)?;
        Ok(Self::new(
            Arc::new(fetcher),
            config.jwks_fetch_timeout,
            config.jwks_max_age,
        ))
    }

    /// Resolve `key_id`, refreshing at most once per lookup.
    pub async fn get_key(&self, key_id: &str) -> Result<Arc<SigningKey>, KeySetError> {
        let not_found = || KeySetError::NotFound(key_id.to_string());

        match self.load().await? {
            Loaded::Cached(snapshot) => {
                if let Some(key) = snapshot.get(key_id) {
                    return Ok(key);
                }
                debug!(kid = %key_id, generation = snapshot.generation(), "Key not in cached key set, refreshing");
                let refreshed = self.refresh(Some(snapshot.generation())).await?;
                refreshed.get(key_id).ok_or_else(not_found)
            }
            // Already refreshed for this lookup; a miss is final.
            Loaded::Refreshed(snapshot) => snapshot.get(key_id).ok_or_else(not_found),
            Loaded::Stale(snapshot, err) => snapshot.get(key_id).ok_or(err),
        }
    }

    /// The current snapshot, fetching on first use and refreshing when stale.
    pub async fn snapshot(&self) -> Result<Arc<KeySetSnapshot>, KeySetError> {
        Ok(match self.load().await? {
            Loaded::Cached(snapshot) | Loaded::Refreshed(snapshot) | Loaded::Stale(snapshot, _) => {
                snapshot
            }
        })
    }

    async fn load(&self) -> Result<Loaded, KeySetError> {
        match self.current.load_full() {
            Some(snapshot) if snapshot.age() < self.max_age => Ok(Loaded::Cached(snapshot)),
            Some(stale) => match self.refresh(Some(stale.generation())).await {
                Ok(fresh) => Ok(Loaded::Refreshed(fresh)),
                Err(e) => {
                    warn!(error = %e, age = ?stale.age(), "Key set refresh failed, serving stale snapshot");
                    Ok(Loaded::Stale(stale, e))
                }
            },
            None => self.refresh(None).await.map(Loaded::Refreshed),
        }
    }

    /// The snapshot currently published, without fetching.
    #[must_use]
    pub fn current(&self) -> Option<Arc<KeySetSnapshot>> {
        self.current.load_full()
    }

    /// Replace the snapshot with a fresh fetch.
    ///
    /// `seen` is the generation the caller found wanting (`None` if there was
    /// no snapshot). Callers queued behind an in-flight fetch share its
    /// outcome: a snapshot published while they waited is returned as is, and
    /// a failure that landed while they waited is returned without fetching
    /// again. Failures are not remembered for later callers.
    pub async fn refresh(&self, seen: Option<u64>) -> Result<Arc<KeySetSnapshot>, KeySetError> {
        let ticket = self.attempts.load(Ordering::Acquire);
        let mut last_failure = self.refresh_lock.lock().await;

        if let Some(current) = self.current.load_full() {
            if seen.is_none_or(|g| current.generation() > g) {
                debug!(generation = current.generation(), "Adopting key set refreshed by another request");
                return Ok(current);
            }
        }

        if self.attempts.load(Ordering::Acquire) != ticket {
            if let Some(err) = last_failure.as_ref() {
                debug!(error = %err, "Sharing key set fetch failure with queued request");
                return Err(err.clone());
            }
        }

        let outcome = self.fetch_snapshot().await;
        *last_failure = outcome.as_ref().err().cloned();
        self.attempts.fetch_add(1, Ordering::Release);
        outcome
    }

    async fn fetch_snapshot(&self) -> Result<Arc<KeySetSnapshot>, KeySetError> {
        let jwks = match tokio::time::timeout(self.fetch_timeout, self.fetcher.fetch()).await {
            Ok(Ok(jwks)) => jwks,
            Ok(Err(e)) => {
                telemetry_metrics::counter!("jwks_fetch_total", "result" => "error").increment(1);
                return Err(e);
            }
            Err(_) => {
                telemetry_metrics::counter!("jwks_fetch_total", "result" => "timeout").increment(1);
                return Err(KeySetError::FetchFailed(format!(
                    "timed out after {:?}",
                    self.fetch_timeout
                )));
            }
        };

        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let snapshot = Arc::new(KeySetSnapshot::from_jwks(&jwks, generation));
        if snapshot.is_empty() {
            warn!(generation, "Identity provider published no usable RS256 signing keys");
        }
        info!(
            generation,
            keys = snapshot.len(),
            kids = ?snapshot.key_ids().collect::<Vec<_>>(),
            "Key set refreshed"
        );
        telemetry_metrics::counter!("jwks_fetch_total", "result" => "ok").increment(1);

        self.current.store(Some(Arc::clone(&snapshot)));
        Ok(snapshot)
    }
}

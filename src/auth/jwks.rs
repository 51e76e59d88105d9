// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JWKS (JSON Web Key Set) fetching and caching.
//!
//! ## Cache model
//!
//! - The key set is held as an immutable `Arc` snapshot; a refresh builds a new
//!   snapshot and swaps it in, so readers never see a half-updated set
//! - Cache hits take the read lock only long enough to clone the `Arc`
//! - At most one refresh runs at a time; concurrent misses wait for it and reuse
//!   its result instead of issuing their own fetch
//! - A key id that is not in the cached set triggers a refresh (key rotation),
//!   rate limited by `min_refresh_interval`
//! - A failed refresh keeps serving the last-known-good set; only a process that
//!   never fetched a set successfully reports `KeySetFetchError`
//! - A failed attempt is shared like a successful one: requests queued behind it,
//!   and requests arriving within `min_refresh_interval`, get its error without
//!   fetching again

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::jwk::{AlgorithmParameters, EllipticCurve, Jwk, KeyAlgorithm, PublicKeyUse};
use jsonwebtoken::{Algorithm, DecodingKey};
use serde::Deserialize;
use tokio::sync::{Mutex, MutexGuard, RwLock};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::error::AuthError;

/// Default key set refresh interval (5 minutes).
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(300);

/// Default minimum gap between refreshes triggered by unknown key ids.
pub const DEFAULT_MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// Default timeout for the key set HTTP request.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Raw JWKS document as published by the issuer.
///
/// Keys stay untyped here so that one key the verifier cannot use does not
/// make the whole document unreadable.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JwksDocument {
    pub keys: Vec<serde_json::Value>,
}

/// Where key sets come from.
#[async_trait]
pub trait KeySetSource: Send + Sync {
    /// Fetch the current key set document.
    async fn fetch(&self) -> Result<JwksDocument, AuthError>;

    /// Human readable location, used in logs and readiness output.
    fn location(&self) -> &str;
}

/// Fetches the key set over HTTPS.
pub struct HttpKeySetSource {
    url: String,
    client: reqwest::Client,
}

impl HttpKeySetSource {
    /// Create a source for `url` whose requests give up after `timeout`.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::KeySetFetchError(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

#[async_trait]
impl KeySetSource for HttpKeySetSource {
    async fn fetch(&self) -> Result<JwksDocument, AuthError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| AuthError::KeySetFetchError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthError::KeySetFetchError(format!(
                "HTTP {} from JWKS endpoint",
                response.status()
            )));
        }

        response
            .json::<JwksDocument>()
            .await
            .map_err(|e| AuthError::KeySetFetchError(format!("malformed JWKS: {e}")))
    }

    fn location(&self) -> &str {
        &self.url
    }
}

/// Key type of a verification key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyFamily {
    Rsa,
    /// EC keys are bound to the algorithm of their curve.
    Ec(Algorithm),
}

/// A public key usable for signature verification.
#[derive(Clone)]
pub struct VerificationKey {
    key: DecodingKey,
    family: KeyFamily,
    /// `alg` pinned by the JWK itself, if any.
    declared: Option<Algorithm>,
}

impl VerificationKey {
    /// The decoding key handed to `jsonwebtoken`.
    pub fn decoding_key(&self) -> &DecodingKey {
        &self.key
    }

    /// Whether this key may verify a token signed with `alg`.
    pub fn supports(&self, alg: Algorithm) -> bool {
        if let Some(declared) = self.declared {
            if declared != alg {
                return false;
            }
        }
        match self.family {
            KeyFamily::Rsa => matches!(
                alg,
                Algorithm::RS256
                    | Algorithm::RS384
                    | Algorithm::RS512
                    | Algorithm::PS256
                    | Algorithm::PS384
                    | Algorithm::PS512
            ),
            KeyFamily::Ec(curve_alg) => curve_alg == alg,
        }
    }
}

impl std::fmt::Debug for VerificationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerificationKey")
            .field("family", &self.family)
            .field("declared", &self.declared)
            .finish_non_exhaustive()
    }
}

/// Immutable mapping from key id to verification key.
#[derive(Debug, Clone, Default)]
pub struct KeySet {
    keys: HashMap<String, VerificationKey>,
}

impl KeySet {
    /// Build a key set from a JWKS document, skipping keys that cannot verify
    /// signatures (no `kid`, encryption keys, unsupported key types).
    pub fn from_document(document: JwksDocument) -> Self {
        let mut keys = HashMap::new();
        for raw in document.keys {
            let jwk: Jwk = match serde_json::from_value(raw) {
                Ok(jwk) => jwk,
                Err(e) => {
                    warn!(error = %e, "Skipping unparseable JWK");
                    continue;
                }
            };
            let Some(kid) = jwk.common.key_id.clone() else {
                debug!("Skipping JWK without kid");
                continue;
            };
            match jwk_to_verification_key(&jwk) {
                Ok(key) => {
                    keys.insert(kid, key);
                }
                Err(reason) => debug!(kid = %kid, reason, "Skipping JWK"),
            }
        }
        Self { keys }
    }

    /// Look up a key by id.
    pub fn get(&self, kid: &str) -> Option<&VerificationKey> {
        self.keys.get(kid)
    }

    /// Key ids in this set, sorted.
    pub fn key_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.keys.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Convert a JWK to a verification key.
fn jwk_to_verification_key(jwk: &Jwk) -> Result<VerificationKey, &'static str> {
    if matches!(jwk.common.public_key_use, Some(PublicKeyUse::Encryption)) {
        return Err("encryption key");
    }

    let declared = match &jwk.common.key_algorithm {
        None => None,
        Some(KeyAlgorithm::RS256) => Some(Algorithm::RS256),
        Some(KeyAlgorithm::RS384) => Some(Algorithm::RS384),
        Some(KeyAlgorithm::RS512) => Some(Algorithm::RS512),
        Some(KeyAlgorithm::PS256) => Some(Algorithm::PS256),
        Some(KeyAlgorithm::PS384) => Some(Algorithm::PS384),
        Some(KeyAlgorithm::PS512) => Some(Algorithm::PS512),
        Some(KeyAlgorithm::ES256) => Some(Algorithm::ES256),
        Some(KeyAlgorithm::ES384) => Some(Algorithm::ES384),
        Some(_) => return Err("algorithm is not an asymmetric signature algorithm"),
    };

    match &jwk.algorithm {
        AlgorithmParameters::RSA(rsa) => {
            let key = DecodingKey::from_rsa_components(&rsa.n, &rsa.e)
                .map_err(|_| "invalid RSA components")?;
            Ok(VerificationKey {
                key,
                family: KeyFamily::Rsa,
                declared,
            })
        }
        AlgorithmParameters::EllipticCurve(ec) => {
            let curve_alg = match ec.curve {
                EllipticCurve::P256 => Algorithm::ES256,
                EllipticCurve::P384 => Algorithm::ES384,
                _ => return Err("unsupported curve"),
            };
            let key = DecodingKey::from_ec_components(&ec.x, &ec.y)
                .map_err(|_| "invalid EC components")?;
            Ok(VerificationKey {
                key,
                family: KeyFamily::Ec(curve_alg),
                declared,
            })
        }
        _ => Err("unsupported key type"),
    }
}

/// One fetched key set snapshot.
struct CachedKeySet {
    keys: KeySet,
    fetched_at: Instant,
    generation: u64,
}

#[derive(Default)]
struct RefreshState {
    /// When the last fetch finished, successful or not.
    last_attempt: Option<Instant>,
    /// Error of the last fetch; cleared by a successful one.
    last_error: Option<AuthError>,
    generation: u64,
}

/// Freshness of the cached key set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySetStatus {
    /// A key set is cached and within the refresh interval.
    Fresh,
    /// A key set is cached but older than the refresh interval.
    Stale,
    /// No key set has been fetched successfully yet.
    Unavailable,
}

impl KeySetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeySetStatus::Fresh => "ok",
            KeySetStatus::Stale => "stale",
            KeySetStatus::Unavailable => "unavailable",
        }
    }
}

/// JWKS manager with caching.
///
/// Cheap to clone; clones share one cache.
#[derive(Clone)]
pub struct JwksManager {
    source: Arc<dyn KeySetSource>,
    /// Age after which a cached set is refreshed (`None` = only on key miss)
    refresh_interval: Option<Duration>,
    /// Cool-down between refresh attempts while a cached set exists
    min_refresh_interval: Duration,
    cache: Arc<RwLock<Option<Arc<CachedKeySet>>>>,
    refresh: Arc<Mutex<RefreshState>>,
    /// Completed fetch attempts; readable without the refresh lock.
    attempts: Arc<AtomicU64>,
}

impl JwksManager {
    /// Create a manager that loads keys from `source`.
    pub fn new(source: Arc<dyn KeySetSource>) -> Self {
        Self {
            source,
            refresh_interval: Some(DEFAULT_REFRESH_INTERVAL),
            min_refresh_interval: DEFAULT_MIN_REFRESH_INTERVAL,
            cache: Arc::new(RwLock::new(None)),
            refresh: Arc::new(Mutex::new(RefreshState::default())),
            attempts: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Create a manager fetching from an HTTPS JWKS endpoint.
    pub fn from_url(jwks_url: impl Into<String>, timeout: Duration) -> Result<Self, AuthError> {
        Ok(Self::new(Arc::new(HttpKeySetSource::new(jwks_url, timeout)?)))
    }

    /// Set the refresh interval; `None` disables age-based refresh.
    pub fn with_refresh_interval(mut self, interval: Option<Duration>) -> Self {
        self.refresh_interval = interval;
        self
    }

    /// Set the minimum gap between refresh attempts.
    pub fn with_min_refresh_interval(mut self, interval: Duration) -> Self {
        self.min_refresh_interval = interval;
        self
    }

    /// Location of the key set (the JWKS URL for HTTP sources).
    pub fn jwks_url(&self) -> &str {
        self.source.location()
    }

    /// Resolve the verification key for `kid`.
    ///
    /// Cache hits on a fresh set return without touching the network. A stale
    /// set is refreshed by whichever request notices first while the others
    /// keep using the cached keys.
    pub async fn resolve(&self, kid: &str) -> Result<VerificationKey, AuthError> {
        let seen = self.attempts.load(Ordering::Acquire);
        let current = self.current().await;

        if let Some(cached) = &current {
            if let Some(key) = cached.keys.get(kid) {
                if !self.is_stale(cached) {
                    return Ok(key.clone());
                }
                let Ok(guard) = self.refresh.try_lock() else {
                    return Ok(key.clone());
                };
                let refreshed = self.refresh_locked(guard, seen, false).await?;
                return lookup(&refreshed, kid);
            }
        }

        debug!(kid = %kid, "Key id not in cached JWKS, refreshing");
        let guard = self.refresh.lock().await;
        let refreshed = self.refresh_locked(guard, seen, false).await?;
        lookup(&refreshed, kid)
    }

    /// Force a fetch of the key set.
    ///
    /// Unlike the refresh done during [`resolve`](Self::resolve), a failure is
    /// reported to the caller; the cached set is left untouched either way.
    pub async fn refresh(&self) -> Result<(), AuthError> {
        let guard = self.refresh.lock().await;
        let seen = self.attempts.load(Ordering::Acquire);
        self.refresh_locked(guard, seen, true).await.map(|_| ())
    }

    /// Make sure a key set is loaded, fetching only if no attempt happened within
    /// `min_refresh_interval`.
    ///
    /// Fails with the last fetch error while no set has ever been fetched.
    pub async fn ensure_loaded(&self) -> Result<(), AuthError> {
        let seen = self.attempts.load(Ordering::Acquire);
        if self.current().await.is_some() {
            return Ok(());
        }
        let guard = self.refresh.lock().await;
        self.refresh_locked(guard, seen, false).await.map(|_| ())
    }

    /// Check if a key set is cached and within its refresh interval.
    pub async fn is_cached(&self) -> bool {
        self.status().await == KeySetStatus::Fresh
    }

    /// Freshness of the cached set.
    pub async fn status(&self) -> KeySetStatus {
        match self.current().await {
            None => KeySetStatus::Unavailable,
            Some(cached) if self.is_stale(&cached) => KeySetStatus::Stale,
            Some(_) => KeySetStatus::Fresh,
        }
    }

    /// Key ids currently cached.
    pub async fn key_ids(&self) -> Vec<String> {
        self.current()
            .await
            .map(|cached| cached.keys.key_ids())
            .unwrap_or_default()
    }

    async fn current(&self) -> Option<Arc<CachedKeySet>> {
        self.cache.read().await.clone()
    }

    fn is_stale(&self, cached: &CachedKeySet) -> bool {
        self.refresh_interval
            .is_some_and(|interval| cached.fetched_at.elapsed() >= interval)
    }

    /// Refresh while holding the refresh lock.
    ///
    /// `seen` is the attempt count the caller read before queueing. If an attempt
    /// finished meanwhile, or the last one is within the cooldown, its outcome is
    /// reused: the cached set if there is one, otherwise its error.
    async fn refresh_locked(
        &self,
        mut state: MutexGuard<'_, RefreshState>,
        seen: u64,
        strict: bool,
    ) -> Result<Arc<CachedKeySet>, AuthError> {
        let latest = self.current().await;

        if !strict {
            let superseded = self.attempts.load(Ordering::Acquire) != seen;
            let cooling_down = state
                .last_attempt
                .is_some_and(|at| at.elapsed() < self.min_refresh_interval);
            if superseded || cooling_down {
                if let Some(latest) = latest {
                    debug!(superseded, "JWKS refresh skipped, reusing cached key set");
                    return Ok(latest);
                }
                if let Some(e) = &state.last_error {
                    debug!(superseded, "JWKS refresh skipped, reusing last fetch error");
                    return Err(e.clone());
                }
            }
        }

        let fetched = self.source.fetch().await;
        state.last_attempt = Some(Instant::now());
        self.attempts.fetch_add(1, Ordering::Release);

        match fetched {
            Ok(document) => {
                state.last_error = None;
                state.generation += 1;
                let entry = Arc::new(CachedKeySet {
                    keys: KeySet::from_document(document),
                    fetched_at: Instant::now(),
                    generation: state.generation,
                });
                *self.cache.write().await = Some(entry.clone());
                info!(
                    jwks_url = %self.source.location(),
                    keys = entry.keys.len(),
                    generation = entry.generation,
                    "JWKS refreshed"
                );
                Ok(entry)
            }
            Err(e) => {
                state.last_error = Some(e.clone());
                match latest {
                    Some(latest) if !strict => {
                        warn!(
                            jwks_url = %self.source.location(),
                            error = %e,
                            "JWKS refresh failed, using last known good key set"
                        );
                        Ok(latest)
                    }
                    _ => {
                        warn!(jwks_url = %self.source.location(), error = %e, "JWKS fetch failed");
                        Err(e)
                    }
                }
            }
        }
    }
}

fn lookup(cached: &CachedKeySet, kid: &str) -> Result<VerificationKey, AuthError> {
    cached
        .keys
        .get(kid)
        .cloned()
        .ok_or_else(|| AuthError::KeyNotFound(kid.to_string()))
}

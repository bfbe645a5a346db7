// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Signing key set fetching and caching.
//!
//! ## Refresh Protocol
//!
//! - The published snapshot is an immutable `Arc<KeySet>`; readers clone the
//!   `Arc` under a briefly held read lock and never wait on the network
//! - A lookup that misses the key id, or finds the snapshot older than the TTL,
//!   triggers one refresh and retries the lookup once
//! - Refreshes are single-flight: a dedicated async mutex serializes them, and a
//!   completed-attempt counter lets every caller that queued behind an attempt
//!   reuse its outcome instead of fetching again
//! - A failed refresh keeps serving the previous snapshot; only a cache that
//!   was never populated surfaces `KeyUnavailable` / `KeyTimeout`

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::jwk::{AlgorithmParameters, EllipticCurve, Jwk, KeyAlgorithm, PublicKeyUse};
use jsonwebtoken::{Algorithm, DecodingKey};
use serde::Deserialize;
use tokio::sync::{Mutex, RwLock};
use url::Url;

use super::error::VerificationError;

/// Default key set TTL (5 minutes).
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Default bound on a single key set refresh.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Largest key set document accepted from the endpoint.
const MAX_DOCUMENT_BYTES: u64 = 512 * 1024;

/// Failure while obtaining or parsing a key set document.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeySetError {
    #[error("key set request failed: {0}")]
    Http(String),
    #[error("key set endpoint returned HTTP {0}")]
    Status(u16),
    #[error("key set document is invalid: {0}")]
    Parse(String),
}

/// One public key the issuer signs with.
#[derive(Clone)]
pub struct SigningKey {
    pub key_id: String,
    pub algorithm: Algorithm,
    decoding_key: DecodingKey,
}

impl SigningKey {
    pub fn new(key_id: impl Into<String>, algorithm: Algorithm, decoding_key: DecodingKey) -> Self {
        Self {
            key_id: key_id.into(),
            algorithm,
            decoding_key,
        }
    }

    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("key_id", &self.key_id)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

/// Immutable snapshot of the issuer's keys. Replaced wholesale on refresh.
#[derive(Debug)]
pub struct KeySet {
    keys: Vec<Arc<SigningKey>>,
    pub fetched_at: Instant,
    /// Incremented on every successful refresh.
    pub generation: u64,
}

impl KeySet {
    pub fn find(&self, key_id: &str) -> Option<Arc<SigningKey>> {
        self.keys.iter().find(|k| k.key_id == key_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn key_ids(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(|k| k.key_id.as_str())
    }
}

// =============================================================================
// Document Parsing
// =============================================================================

#[derive(Deserialize)]
struct RawKeySet {
    keys: Vec<serde_json::Value>,
}

/// Parse a key set document, skipping entries that cannot be used for
/// signature verification.
///
/// Entries are parsed one at a time so an unknown key type, an encryption key or
/// an unsupported algorithm drops only that entry. A document whose `keys`
/// array is missing, or that yields no usable key, is an error.
pub fn parse_key_set(document: &[u8]) -> Result<Vec<SigningKey>, KeySetError> {
    let raw: RawKeySet =
        serde_json::from_slice(document).map_err(|e| KeySetError::Parse(e.to_string()))?;

    let mut keys = Vec::with_capacity(raw.keys.len());
    for entry in raw.keys {
        let jwk: Jwk = match serde_json::from_value(entry) {
            Ok(jwk) => jwk,
            Err(e) => {
                tracing::debug!(error = %e, "Skipping unrecognized key set entry");
                continue;
            }
        };
        if let Some(key) = signing_key_from_jwk(&jwk) {
            keys.push(key);
        }
    }

    if keys.is_empty() {
        return Err(KeySetError::Parse("no usable signing keys".to_string()));
    }
    Ok(keys)
}

fn signing_key_from_jwk(jwk: &Jwk) -> Option<SigningKey> {
    let Some(key_id) = jwk.common.key_id.clone() else {
        tracing::debug!("Skipping key without kid");
        return None;
    };
    if matches!(jwk.common.public_key_use, Some(PublicKeyUse::Encryption)) {
        tracing::debug!(kid = %key_id, "Skipping encryption key");
        return None;
    }
    let Some(algorithm) = signing_algorithm(jwk) else {
        tracing::debug!(kid = %key_id, "Skipping key with unsupported algorithm");
        return None;
    };
    match DecodingKey::from_jwk(jwk) {
        Ok(decoding_key) => Some(SigningKey::new(key_id, algorithm, decoding_key)),
        Err(e) => {
            tracing::debug!(kid = %key_id, error = %e, "Skipping malformed key material");
            None
        }
    }
}

/// Resolve the verification algorithm for a key, defaulting by key type when
/// `alg` is absent. Symmetric and encryption algorithms are never accepted.
fn signing_algorithm(jwk: &Jwk) -> Option<Algorithm> {
    let params = &jwk.algorithm;
    let declared = match jwk.common.key_algorithm {
        None => {
            return match params {
                AlgorithmParameters::RSA(_) => Some(Algorithm::RS256),
                AlgorithmParameters::EllipticCurve(ec) => match ec.curve {
                    EllipticCurve::P256 => Some(Algorithm::ES256),
                    EllipticCurve::P384 => Some(Algorithm::ES384),
                    _ => None,
                },
                AlgorithmParameters::OctetKeyPair(okp) if okp.curve == EllipticCurve::Ed25519 => {
                    Some(Algorithm::EdDSA)
                }
                _ => None,
            };
        }
        Some(KeyAlgorithm::RS256) => Algorithm::RS256,
        Some(KeyAlgorithm::RS384) => Algorithm::RS384,
        Some(KeyAlgorithm::RS512) => Algorithm::RS512,
        Some(KeyAlgorithm::PS256) => Algorithm::PS256,
        Some(KeyAlgorithm::PS384) => Algorithm::PS384,
        Some(KeyAlgorithm::PS512) => Algorithm::PS512,
        Some(KeyAlgorithm::ES256) => Algorithm::ES256,
        Some(KeyAlgorithm::ES384) => Algorithm::ES384,
        Some(KeyAlgorithm::EdDSA) => Algorithm::EdDSA,
        Some(_) => return None,
    };

    let compatible = match (declared, params) {
        (
            Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512,
            AlgorithmParameters::RSA(_),
        ) => true,
        (Algorithm::ES256, AlgorithmParameters::EllipticCurve(ec)) => ec.curve == EllipticCurve::P256,
        (Algorithm::ES384, AlgorithmParameters::EllipticCurve(ec)) => ec.curve == EllipticCurve::P384,
        (Algorithm::EdDSA, AlgorithmParameters::OctetKeyPair(okp)) => {
            okp.curve == EllipticCurve::Ed25519
        }
        _ => false,
    };
    compatible.then_some(declared)
}

// =============================================================================
// Fetchers
// =============================================================================

/// Source of the raw key set document.
#[async_trait]
pub trait KeyFetcher: Send + Sync {
    async fn fetch(&self) -> Result<Vec<u8>, KeySetError>;
}

/// Fetches the key set document over HTTPS.
#[derive(Clone)]
pub struct HttpKeyFetcher {
    url: Url,
    client: reqwest::Client,
}

impl HttpKeyFetcher {
    /// Create a fetcher for `url`; each request is bounded by `timeout`.
    pub fn new(url: Url, timeout: Duration) -> Result<Self, KeySetError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("user-service/", env!("CARGO_PKG_VERSION")))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| KeySetError::Http(e.to_string()))?;
        Ok(Self { url, client })
    }
}

#[async_trait]
impl KeyFetcher for HttpKeyFetcher {
    async fn fetch(&self) -> Result<Vec<u8>, KeySetError> {
        let response = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .map_err(|e| KeySetError::Http(e.to_string()))?;

        if !response.status().is_success() {
            return Err(KeySetError::Status(response.status().as_u16()));
        }
        if response.content_length().is_some_and(|len| len > MAX_DOCUMENT_BYTES) {
            return Err(KeySetError::Parse("document too large".to_string()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| KeySetError::Http(e.to_string()))?;
        if body.len() as u64 > MAX_DOCUMENT_BYTES {
            return Err(KeySetError::Parse("document too large".to_string()));
        }
        Ok(body.to_vec())
    }
}

// =============================================================================
// Cache
// =============================================================================

#[derive(Default)]
struct RefreshState {
    last_failure: Option<VerificationError>,
}

/// Process-wide cache of the issuer's signing keys.
pub struct KeySetCache {
    fetcher: Arc<dyn KeyFetcher>,
    ttl: Duration,
    fetch_timeout: Duration,
    snapshot: RwLock<Option<Arc<KeySet>>>,
    refresh: Mutex<RefreshState>,
    /// Completed refresh attempts, successful or not. Written under `refresh`.
    attempts: AtomicU64,
}

impl KeySetCache {
    /// Create an empty cache. Nothing is fetched until the first lookup.
    pub fn new(fetcher: Arc<dyn KeyFetcher>) -> Self {
        Self {
            fetcher,
            ttl: DEFAULT_CACHE_TTL,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            snapshot: RwLock::new(None),
            refresh: Mutex::new(RefreshState::default()),
            attempts: AtomicU64::new(0),
        }
    }

    /// Create with custom cache TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Create with a custom bound on each refresh.
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Current snapshot, if any refresh has ever succeeded.
    pub async fn snapshot(&self) -> Option<Arc<KeySet>> {
        self.snapshot.read().await.clone()
    }

    /// Whether a non-empty key set has been loaded.
    pub async fn is_ready(&self) -> bool {
        self.snapshot
            .read()
            .await
            .as_ref()
            .is_some_and(|set| !set.is_empty())
    }

    /// Resolve the signing key for `key_id`.
    ///
    /// Refreshes at most once per call; a refresh already in flight is joined
    /// rather than repeated.
    pub async fn get_key(&self, key_id: &str) -> Result<Arc<SigningKey>, VerificationError> {
        // Read the counter before the snapshot: a refresh finishing between the
        // two reads is then seen as already done.
        let observed = self.attempts.load(Ordering::Acquire);
        let current = self.snapshot().await;

        if let Some(set) = &current {
            if set.fetched_at.elapsed() < self.ttl {
                if let Some(key) = set.find(key_id) {
                    return Ok(key);
                }
            }
        }

        match self.refresh_after(observed).await {
            Ok(set) => set.find(key_id).ok_or(VerificationError::UnknownKey),
            Err(e) => match self.snapshot().await {
                Some(stale) => stale.find(key_id).ok_or(VerificationError::UnknownKey),
                None => Err(e),
            },
        }
    }

    /// Force a refresh and return the number of keys now cached.
    ///
    /// Joins a refresh already in flight instead of starting another.
    pub async fn refresh(&self) -> Result<usize, VerificationError> {
        let observed = self.attempts.load(Ordering::Acquire);
        self.refresh_after(observed).await.map(|set| set.len())
    }

    /// Refresh unless an attempt completed after `observed`, in which case
    /// that attempt's outcome is reused.
    async fn refresh_after(&self, observed: u64) -> Result<Arc<KeySet>, VerificationError> {
        let mut state = self.refresh.lock().await;

        if self.attempts.load(Ordering::Acquire) != observed {
            return match (&state.last_failure, self.snapshot().await) {
                (None, Some(set)) => Ok(set),
                (Some(e), _) => Err(e.clone()),
                (None, None) => Err(VerificationError::KeyUnavailable(
                    "no key set loaded".to_string(),
                )),
            };
        }

        let outcome = match tokio::time::timeout(self.fetch_timeout, self.fetcher.fetch()).await {
            Err(_) => Err(VerificationError::KeyTimeout),
            Ok(Err(e)) => Err(VerificationError::KeyUnavailable(e.to_string())),
            Ok(Ok(document)) => parse_key_set(&document)
                .map_err(|e| VerificationError::KeyUnavailable(e.to_string())),
        };

        let result = match outcome {
            Ok(keys) => {
                let mut snapshot = self.snapshot.write().await;
                let generation = snapshot.as_ref().map_or(1, |s| s.generation + 1);
                let set = Arc::new(KeySet {
                    keys: keys.into_iter().map(Arc::new).collect(),
                    fetched_at: Instant::now(),
                    generation,
                });
                *snapshot = Some(set.clone());
                drop(snapshot);

                tracing::info!(
                    keys = set.len(),
                    kids = ?set.key_ids().collect::<Vec<_>>(),
                    generation,
                    "Signing key set refreshed"
                );
                state.last_failure = None;
                Ok(set)
            }
            Err(e) => {
                if self.is_ready().await {
                    tracing::warn!(error = %e, "Key set refresh failed, serving cached keys");
                } else {
                    tracing::error!(error = %e, "Key set refresh failed with no cached keys");
                }
                state.last_failure = Some(e.clone());
                Err(e)
            }
        };

        self.attempts.fetch_add(1, Ordering::Release);
        result
    }
}

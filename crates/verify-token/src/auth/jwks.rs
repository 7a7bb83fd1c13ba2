//! Google signing-certificate client.
//!
//! Fetches Google's OAuth2 signing keys (JWK set, `/oauth2/v3/certs`) and
//! caches them with a configurable TTL. Google rotates keys every few days
//! and publishes the new one ahead of use, so an unknown `kid` may trigger a
//! refresh before the token is rejected. Those refreshes are rate limited and
//! single-flight: a forged `kid` cannot drive one fetch per request.

use crate::errors::ProviderError;
use crate::observability::metrics;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::instrument;

/// Default cache TTL in seconds (1 hour).
const DEFAULT_CACHE_TTL_SECONDS: u64 = 3600;

/// Minimum gap between refreshes triggered by an unknown `kid` (1 minute).
const DEFAULT_MIN_REFRESH_INTERVAL_SECONDS: u64 = 60;

/// JSON Web Key from the certificate endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    /// Key type (always "RSA" for Google).
    pub kty: String,

    /// Key ID - matched against the token header.
    pub kid: String,

    /// RSA modulus (base64url).
    #[serde(default)]
    pub n: Option<String>,

    /// RSA public exponent (base64url).
    #[serde(default)]
    pub e: Option<String>,

    /// Algorithm (should be "RS256").
    #[serde(default)]
    pub alg: Option<String>,

    /// Key use (should be "sig").
    #[serde(default, rename = "use")]
    pub key_use: Option<String>,
}

/// JWK set response.
#[derive(Debug, Clone, Deserialize)]
pub struct JwksResponse {
    pub keys: Vec<Jwk>,
}

struct CachedJwks {
    keys: HashMap<String, Jwk>,
    fetched_at: Instant,
    expires_at: Instant,
}

enum Lookup {
    Hit(Jwk),
    Miss { may_refresh: bool },
}

/// Thread-safe client for Google's signing keys.
pub struct JwksClient {
    certs_url: String,
    http_client: reqwest::Client,
    cache: Arc<RwLock<Option<CachedJwks>>>,
    refresh_lock: Mutex<()>,
    cache_ttl: Duration,
    min_refresh_interval: Duration,
}

impl JwksClient {
    /// Create a client with the default cache TTL.
    pub fn new(certs_url: String, http_client: reqwest::Client) -> Self {
        Self::with_ttl(
            certs_url,
            http_client,
            Duration::from_secs(DEFAULT_CACHE_TTL_SECONDS),
        )
    }

    /// Create a client with a custom cache TTL.
    pub fn with_ttl(certs_url: String, http_client: reqwest::Client, cache_ttl: Duration) -> Self {
        Self {
            certs_url,
            http_client,
            cache: Arc::new(RwLock::new(None)),
            refresh_lock: Mutex::new(()),
            cache_ttl,
            min_refresh_interval: Duration::from_secs(DEFAULT_MIN_REFRESH_INTERVAL_SECONDS),
        }
    }

    /// Set the minimum gap between refreshes caused by an unknown `kid`.
    #[must_use]
    pub fn with_min_refresh_interval(mut self, interval: Duration) -> Self {
        self.min_refresh_interval = interval;
        self
    }

    /// Get a signing key by key ID.
    ///
    /// Serves from cache when fresh; otherwise fetches the key set. A `kid`
    /// missing from a fresh cache triggers a refresh only when the last fetch
    /// is older than the minimum refresh interval. Concurrent misses share
    /// one fetch.
    ///
    /// # Errors
    ///
    /// - `ProviderError::Http` / `InvalidResponse` if the key set cannot be fetched
    /// - `ProviderError::InvalidToken("No pem found for envelope")` if the key is unknown
    #[instrument(skip_all, name = "vt.auth.jwks.get_key", fields(kid = %kid))]
    pub async fn get_key(&self, kid: &str) -> Result<Jwk, ProviderError> {
        match self.lookup(kid).await {
            Lookup::Hit(key) => {
                tracing::debug!(target: "vt.auth.jwks", "Certificate cache hit");
                return Ok(key);
            }
            Lookup::Miss { may_refresh: false } => return Err(unknown_key()),
            Lookup::Miss { may_refresh: true } => {}
        }

        let _refreshing = self.refresh_lock.lock().await;

        // Another task may have refreshed while we waited
        match self.lookup(kid).await {
            Lookup::Hit(key) => return Ok(key),
            Lookup::Miss { may_refresh: false } => return Err(unknown_key()),
            Lookup::Miss { may_refresh: true } => {}
        }

        tracing::debug!(target: "vt.auth.jwks", "Key not in cache, refreshing");
        self.refresh_cache().await?;

        let cache = self.cache.read().await;
        if let Some(key) = cache.as_ref().and_then(|cached| cached.keys.get(kid)) {
            return Ok(key.clone());
        }

        tracing::warn!(target: "vt.auth.jwks", "Key not found in certificates after refresh");
        Err(unknown_key())
    }

    async fn lookup(&self, kid: &str) -> Lookup {
        let cache = self.cache.read().await;
        let Some(cached) = cache.as_ref() else {
            return Lookup::Miss { may_refresh: true };
        };

        if cached.expires_at <= Instant::now() {
            return Lookup::Miss { may_refresh: true };
        }

        match cached.keys.get(kid) {
            Some(key) => Lookup::Hit(key.clone()),
            None => {
                let may_refresh = cached.fetched_at.elapsed() >= self.min_refresh_interval;
                if !may_refresh {
                    tracing::debug!(
                        target: "vt.auth.jwks",
                        "Key not in cache, refresh suppressed by rate limit"
                    );
                }
                Lookup::Miss { may_refresh }
            }
        }
    }

    #[instrument(skip_all)]
    async fn refresh_cache(&self) -> Result<(), ProviderError> {
        tracing::debug!(target: "vt.auth.jwks", url = %self.certs_url, "Fetching certificates");
        let start = Instant::now();

        let result = self.fetch().await;
        metrics::record_provider_request(
            "certs",
            if result.is_ok() { "success" } else { "error" },
            start.elapsed(),
        );
        let jwks = result?;

        let keys: HashMap<String, Jwk> = jwks
            .keys
            .into_iter()
            .map(|key| (key.kid.clone(), key))
            .collect();

        tracing::info!(
            target: "vt.auth.jwks",
            key_count = keys.len(),
            "Certificate cache refreshed"
        );

        let now = Instant::now();
        let mut cache = self.cache.write().await;
        *cache = Some(CachedJwks {
            keys,
            fetched_at: now,
            expires_at: now + self.cache_ttl,
        });

        Ok(())
    }

    async fn fetch(&self) -> Result<JwksResponse, ProviderError> {
        let response = self
            .http_client
            .get(&self.certs_url)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(target: "vt.auth.jwks", error = %e, "Failed to fetch certificates");
                ProviderError::from(e)
            })?;

        if !response.status().is_success() {
            tracing::error!(
                target: "vt.auth.jwks",
                status = %response.status(),
                "Certificate endpoint returned error"
            );
            return Err(ProviderError::Http(format!(
                "Failed to retrieve verification certificates: {}",
                response.status()
            )));
        }

        response.json().await.map_err(|e| {
            tracing::error!(target: "vt.auth.jwks", error = %e, "Failed to parse certificates");
            ProviderError::InvalidResponse(
                "Failed to parse verification certificates".to_string(),
            )
        })
    }

    /// Drop the cached key set.
    #[cfg(test)]
    pub async fn clear_cache(&self) {
        let mut cache = self.cache.write().await;
        *cache = None;
    }
}

fn unknown_key() -> ProviderError {
    ProviderError::InvalidToken("No pem found for envelope".to_string())
}

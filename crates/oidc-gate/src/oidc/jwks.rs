//! JWKS cache.
//!
//! Keys are fetched per JWKS URI and cached with a TTL. A `kid` that is not
//! in a still-valid cache entry triggers one refetch, so keys rotated in at
//! the provider are picked up before the TTL runs out. Refetches for unknown
//! `kid`s are rate limited per URI by a cooldown measured from the last fetch.

use jsonwebtoken::jwk::{Jwk, JwkSet};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::instrument;

/// Default cache TTL (5 minutes).
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Default minimum interval between unknown-`kid` refetches of one URI.
pub const DEFAULT_REFETCH_COOLDOWN: Duration = Duration::from_secs(10);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JwksError {
    #[error("JWKS endpoint unavailable: {0}")]
    Unavailable(String),

    #[error("signing key not found")]
    KeyNotFound,
}

struct CachedJwks {
    keys: JwkSet,
    fetched_at: Instant,
    expires_at: Instant,
}

/// Thread-safe JWKS cache shared by all providers.
pub struct JwksCache {
    http_client: reqwest::Client,
    cache: RwLock<HashMap<String, CachedJwks>>,
    cache_ttl: Duration,
    refetch_cooldown: Duration,
}

impl JwksCache {
    pub fn new(http_client: reqwest::Client, cache_ttl: Duration) -> Self {
        Self {
            http_client,
            cache: RwLock::new(HashMap::new()),
            cache_ttl,
            refetch_cooldown: DEFAULT_REFETCH_COOLDOWN,
        }
    }

    /// Override the unknown-`kid` refetch cooldown. Zero refetches on every miss.
    pub fn with_refetch_cooldown(mut self, refetch_cooldown: Duration) -> Self {
        self.refetch_cooldown = refetch_cooldown;
        self
    }

    /// Look up a key by `kid`, fetching the key set on miss or expiry.
    ///
    /// A miss against a fresh entry fetched within the cooldown fails with
    /// `KeyNotFound` without contacting the provider.
    #[instrument(skip(self), fields(kid = %kid))]
    pub async fn get_key(&self, jwks_uri: &str, kid: &str) -> Result<Jwk, JwksError> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.get(jwks_uri) {
                if cached.expires_at > Instant::now() {
                    if let Some(key) = cached.keys.find(kid) {
                        tracing::debug!(target: "oidc_gate.oidc.jwks", kid = %kid, "JWKS cache hit");
                        return Ok(key.clone());
                    }
                    if cached.fetched_at.elapsed() < self.refetch_cooldown {
                        tracing::debug!(target: "oidc_gate.oidc.jwks", kid = %kid, "Key not in cached JWKS, refetch cooling down");
                        return Err(JwksError::KeyNotFound);
                    }
                    tracing::debug!(target: "oidc_gate.oidc.jwks", kid = %kid, "Key not in cached JWKS, refetching");
                }
            }
        }

        let keys = self.refresh(jwks_uri).await?;

        keys.find(kid).cloned().ok_or_else(|| {
            tracing::warn!(target: "oidc_gate.oidc.jwks", kid = %kid, "Key not found in JWKS after refresh");
            JwksError::KeyNotFound
        })
    }

    /// Fetch a key set and replace its cache entry.
    async fn refresh(&self, jwks_uri: &str) -> Result<JwkSet, JwksError> {
        tracing::debug!(target: "oidc_gate.oidc.jwks", url = %jwks_uri, "Fetching JWKS");

        let response = self
            .http_client
            .get(jwks_uri)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(target: "oidc_gate.oidc.jwks", error = %e, "Failed to fetch JWKS");
                JwksError::Unavailable(e.to_string())
            })?;

        if !response.status().is_success() {
            tracing::error!(
                target: "oidc_gate.oidc.jwks",
                status = %response.status(),
                "JWKS endpoint returned error"
            );
            return Err(JwksError::Unavailable(format!(
                "HTTP {}",
                response.status()
            )));
        }

        let keys: JwkSet = response.json().await.map_err(|e| {
            tracing::error!(target: "oidc_gate.oidc.jwks", error = %e, "Failed to parse JWKS response");
            JwksError::Unavailable(e.to_string())
        })?;

        tracing::info!(
            target: "oidc_gate.oidc.jwks",
            key_count = keys.keys.len(),
            "JWKS cache refreshed"
        );

        let now = Instant::now();
        let mut cache = self.cache.write().await;
        cache.insert(
            jwks_uri.to_string(),
            CachedJwks {
                keys: keys.clone(),
                fetched_at: now,
                expires_at: now + self.cache_ttl,
            },
        );

        Ok(keys)
    }

    /// Drop every cached key set.
    pub async fn clear(&self) {
        self.cache.write().await.clear();
    }
}

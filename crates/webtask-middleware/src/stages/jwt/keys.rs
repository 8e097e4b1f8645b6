//! Cached, rate-limited JWKS key set.
//!
//! Keys are cached for the configured TTL. An unknown `kid` triggers a
//! refresh, but refreshes are capped per sliding one-minute window so a
//! stream of tokens with made-up key IDs cannot hammer the key endpoint.

use jsonwebtoken::jwk::{Jwk, PublicKeyUse};
use jsonwebtoken::DecodingKey;
use parking_lot::{Mutex, RwLock};
use reqwest::Url;
use serde::Deserialize;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use webtask_config::JwksConfig;
use webtask_core::{ErrorFields, WebtaskError, WebtaskResult};
use webtask_telemetry::metrics::record_jwks_fetch;

const RATE_WINDOW: Duration = Duration::from_secs(60);

/// Error returned when no key matches a token.
pub(crate) fn signing_key_not_found() -> WebtaskError {
    WebtaskError::authentication("signing key not found")
        .with_fields(ErrorFields::new().code("invalid_token"))
}

/// Sliding window of refresh attempts.
#[derive(Debug)]
struct FetchLimiter {
    limit: usize,
    attempts: VecDeque<Instant>,
}

impl FetchLimiter {
    fn new(limit: u32) -> Self {
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        Self {
            limit,
            attempts: VecDeque::with_capacity(limit.min(64)),
        }
    }

    fn try_acquire(&mut self, now: Instant) -> bool {
        while self
            .attempts
            .front()
            .is_some_and(|at| now.duration_since(*at) >= RATE_WINDOW)
        {
            self.attempts.pop_front();
        }

        if self.attempts.len() < self.limit {
            self.attempts.push_back(now);
            true
        } else {
            false
        }
    }
}

#[derive(Default)]
struct KeyCache {
    by_kid: HashMap<String, DecodingKey>,
    unnamed: Vec<DecodingKey>,
    fetched_at: Option<Instant>,
}

impl KeyCache {
    fn lookup(&self, kid: Option<&str>) -> Option<DecodingKey> {
        match kid {
            Some(kid) => self.by_kid.get(kid).cloned(),
            None => {
                let mut all = self.by_kid.values().chain(self.unnamed.iter());
                match (all.next(), all.next()) {
                    (Some(only), None) => Some(only.clone()),
                    _ => None,
                }
            }
        }
    }

    fn is_fresh(&self, ttl: Duration, now: Instant) -> bool {
        self.fetched_at
            .is_some_and(|at| now.duration_since(at) < ttl)
    }

    fn len(&self) -> usize {
        self.by_kid.len() + self.unnamed.len()
    }
}

#[derive(Deserialize)]
struct JwksDocument {
    keys: Vec<serde_json::Value>,
}

/// Verification keys published at a JWKS endpoint.
pub struct JwksKeySet {
    jwks_uri: Url,
    http: reqwest::Client,
    ttl: Duration,
    limiter: Mutex<FetchLimiter>,
    cache: RwLock<KeyCache>,
}

impl JwksKeySet {
    /// Creates an empty key set; nothing is fetched until a key is needed.
    #[must_use]
    pub fn new(jwks_uri: Url, http: reqwest::Client, settings: &JwksConfig) -> Self {
        Self {
            jwks_uri,
            http,
            ttl: Duration::from_secs(settings.cache_ttl_secs),
            limiter: Mutex::new(FetchLimiter::new(settings.requests_per_minute)),
            cache: RwLock::new(KeyCache::default()),
        }
    }

    /// The endpoint keys are fetched from.
    #[must_use]
    pub fn jwks_uri(&self) -> &Url {
        &self.jwks_uri
    }

    /// Returns the key for `kid`.
    ///
    /// A token without a `kid` matches only a key set holding exactly one
    /// key.
    ///
    /// # Errors
    ///
    /// - `invalid_token` (401) when no key matches, including when a refresh
    ///   is refused by the rate limit
    /// - upstream dependency error (502) when the endpoint cannot be read
    pub async fn key(&self, kid: Option<&str>) -> WebtaskResult<DecodingKey> {
        let now = Instant::now();
        let stale = {
            let cache = self.cache.read();
            match cache.lookup(kid) {
                Some(key) if cache.is_fresh(self.ttl, now) => return Ok(key),
                found => found,
            }
        };

        if !self.limiter.lock().try_acquire(now) {
            record_jwks_fetch("rate_limited");
            tracing::warn!(jwks_uri = %self.jwks_uri, kid, "JWKS refresh refused by rate limit");
            return stale.ok_or_else(signing_key_not_found);
        }

        let fresh = self.fetch().await?;
        let found = fresh.lookup(kid);
        *self.cache.write() = fresh;

        found.ok_or_else(|| {
            tracing::debug!(jwks_uri = %self.jwks_uri, kid, "No matching signing key");
            signing_key_not_found()
        })
    }

    async fn fetch(&self) -> WebtaskResult<KeyCache> {
        let result = async {
            self.http
                .get(self.jwks_uri.clone())
                .send()
                .await?
                .error_for_status()?
                .json::<JwksDocument>()
                .await
        }
        .await;

        let document = match result {
            Ok(document) => {
                record_jwks_fetch("ok");
                document
            }
            Err(e) => {
                record_jwks_fetch("error");
                tracing::warn!(jwks_uri = %self.jwks_uri, error = %e, "JWKS fetch failed");
                return Err(WebtaskError::upstream("Failed to fetch signing keys"));
            }
        };

        let mut cache = KeyCache {
            fetched_at: Some(Instant::now()),
            ..KeyCache::default()
        };

        for raw in document.keys {
            let jwk = match serde_json::from_value::<Jwk>(raw) {
                Ok(jwk) => jwk,
                Err(e) => {
                    tracing::debug!(error = %e, "Skipping unparseable JWK");
                    continue;
                }
            };
            if matches!(
                jwk.common.public_key_use,
                Some(ref usage) if *usage != PublicKeyUse::Signature
            ) {
                continue;
            }
            let key = match DecodingKey::from_jwk(&jwk) {
                Ok(key) => key,
                Err(e) => {
                    tracing::debug!(error = %e, "Skipping unusable JWK");
                    continue;
                }
            };
            match jwk.common.key_id {
                Some(kid) => {
                    cache.by_kid.insert(kid, key);
                }
                None => cache.unnamed.push(key),
            }
        }

        tracing::debug!(jwks_uri = %self.jwks_uri, keys = cache.len(), "Refreshed signing keys");
        Ok(cache)
    }
}

impl std::fmt::Debug for JwksKeySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwksKeySet")
            .field("jwks_uri", &self.jwks_uri.as_str())
            .field("ttl", &self.ttl)
            .field("cached_keys", &self.cache.read().len())
            .finish_non_exhaustive()
    }
}

//! Auth0 API authentication.
//!
//! Every request must carry `Authorization: Bearer <jwt>` issued by the
//! tenant named in the `AUTH0_DOMAIN` secret for the `AUTH0_AUDIENCE` API.
//! Unlike the JWT scope step no scope is required: a genuine token is
//! enough, and its claims are left on the request for the webtask.
//!
//! | Secret | Meaning |
//! |---|---|
//! | `AUTH0_DOMAIN` | tenant host, bare or as an `https://` URL (required) |
//! | `AUTH0_AUDIENCE` | expected `aud` claim (required) |
//! | `AUTH0_ALGORITHM` | `RS256` (default) or `HS256` |
//! | `AUTH0_API_SECRET` | HS256 shared key (required for HS256) |
//! | `AUTH0_JWKS_CACHE` | any non-empty value caches fetched keys |
//! | `AUTH0_JWKS_RATE_LIMIT` | key fetches allowed per minute |

use super::jwt::{credentials, JwksKeySet, JwtVerifier, SigningAlgorithm, TokenVerifier};
use crate::context::RequestContext;
use crate::middleware::{BoxFuture, Flow, Middleware};
use crate::types::ResponseSink;
use parking_lot::RwLock;
use reqwest::Url;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use webtask_config::JwksConfig;
use webtask_core::{WebtaskError, WebtaskResult};
use webtask_telemetry::metrics::record_auth_decision;

/// Secret naming the Auth0 tenant.
pub const AUTH0_DOMAIN: &str = "AUTH0_DOMAIN";
/// Secret naming the expected audience.
pub const AUTH0_AUDIENCE: &str = "AUTH0_AUDIENCE";
/// Secret selecting the signing algorithm.
pub const AUTH0_ALGORITHM: &str = "AUTH0_ALGORITHM";
/// Secret holding the HS256 shared key.
pub const AUTH0_API_SECRET: &str = "AUTH0_API_SECRET";
/// Secret enabling the key cache.
pub const AUTH0_JWKS_CACHE: &str = "AUTH0_JWKS_CACHE";
/// Secret capping key fetches per minute.
pub const AUTH0_JWKS_RATE_LIMIT: &str = "AUTH0_JWKS_RATE_LIMIT";

const JWKS_PATH: &str = "/.well-known/jwks.json";

/// How tokens are checked.
#[derive(Clone, PartialEq, Eq)]
pub enum Auth0Keys {
    /// HS256 against `AUTH0_API_SECRET`.
    Secret(String),
    /// RS256 against the tenant's published key set.
    Jwks {
        /// `https://<domain>/.well-known/jwks.json`.
        jwks_uri: Url,
        /// Key-set cache and rate-limit settings.
        settings: JwksConfig,
    },
}

impl fmt::Debug for Auth0Keys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Secret(_) => f.write_str("Secret([redacted])"),
            Self::Jwks { jwks_uri, settings } => f
                .debug_struct("Jwks")
                .field("jwks_uri", &jwks_uri.as_str())
                .field("settings", settings)
                .finish(),
        }
    }
}

/// Settings of one Auth0 step, fixed once derived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Auth0Config {
    /// `https://<domain>/`.
    pub issuer: String,
    /// Expected `aud` claim.
    pub audience: String,
    /// Key source.
    pub keys: Auth0Keys,
}

impl Auth0Config {
    /// Derives the settings from the request's secrets.
    ///
    /// `defaults` supplies the request timeout and the cache TTL used when
    /// `AUTH0_JWKS_CACHE` is set. Without it keys are fetched on every
    /// verification. Without `AUTH0_JWKS_RATE_LIMIT` fetches are not capped.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the audience or domain is missing,
    /// the domain is not https, the algorithm is neither `RS256` nor `HS256`,
    /// HS256 is selected without `AUTH0_API_SECRET`, or the rate limit is
    /// not a number.
    pub fn from_context(ctx: &RequestContext, defaults: &JwksConfig) -> WebtaskResult<Self> {
        let secret = |name: &str| ctx.secret(name).filter(|value| !value.is_empty());

        let audience = secret(AUTH0_AUDIENCE)
            .ok_or_else(|| required(AUTH0_AUDIENCE))?
            .to_string();
        let host = tenant_host(secret(AUTH0_DOMAIN).ok_or_else(|| required(AUTH0_DOMAIN))?)?;
        let issuer = format!("https://{host}/");

        let algorithm = match secret(AUTH0_ALGORITHM) {
            None | Some("RS256") => SigningAlgorithm::Rs256,
            Some("HS256") => SigningAlgorithm::Hs256,
            Some(other) => {
                return Err(WebtaskError::configuration(format!(
                    "the {AUTH0_ALGORITHM} secret must be one of HS256, RS256 (got `{other}`)"
                )));
            }
        };

        let keys = match algorithm {
            SigningAlgorithm::Hs256 => Auth0Keys::Secret(
                secret(AUTH0_API_SECRET)
                    .ok_or_else(|| {
                        WebtaskError::configuration(format!(
                            "the {AUTH0_API_SECRET} secret is required when using HS256"
                        ))
                    })?
                    .to_string(),
            ),
            SigningAlgorithm::Rs256 => {
                let jwks_uri = Url::parse(&format!("https://{host}{JWKS_PATH}")).map_err(|e| {
                    WebtaskError::configuration(format!("invalid {AUTH0_DOMAIN} `{host}`: {e}"))
                })?;
                let requests_per_minute = match secret(AUTH0_JWKS_RATE_LIMIT) {
                    None => u32::MAX,
                    Some(limit) => limit.trim().parse().map_err(|_| {
                        WebtaskError::configuration(format!(
                            "the {AUTH0_JWKS_RATE_LIMIT} secret must be a whole number (got `{limit}`)"
                        ))
                    })?,
                };
                let cache_ttl_secs = if secret(AUTH0_JWKS_CACHE).is_some() {
                    defaults.cache_ttl_secs
                } else {
                    0
                };

                Auth0Keys::Jwks {
                    jwks_uri,
                    settings: JwksConfig {
                        requests_per_minute,
                        cache_ttl_secs,
                        request_timeout_ms: defaults.request_timeout_ms,
                    },
                }
            }
        };

        Ok(Self {
            issuer,
            audience,
            keys,
        })
    }

    fn verifier(&self, http: &reqwest::Client) -> JwtVerifier {
        match &self.keys {
            Auth0Keys::Secret(secret) => JwtVerifier::with_secret(&self.issuer, &self.audience, secret),
            Auth0Keys::Jwks { jwks_uri, settings } => JwtVerifier::with_key_set(
                &self.issuer,
                &self.audience,
                JwksKeySet::new(jwks_uri.clone(), http.clone(), settings),
            ),
        }
    }
}

fn required(name: &str) -> WebtaskError {
    WebtaskError::configuration(format!("the {name} secret is required"))
}

/// Host (and port) of the tenant; a scheme, when given, must be https.
fn tenant_host(domain: &str) -> WebtaskResult<String> {
    let domain = domain.trim();
    let invalid = |reason: &str| {
        WebtaskError::configuration(format!("invalid {AUTH0_DOMAIN} `{domain}`: {reason}"))
    };

    let url = if domain.contains("://") {
        Url::parse(domain).map_err(|e| invalid(&e.to_string()))?
    } else {
        Url::parse(&format!("https://{domain}")).map_err(|e| invalid(&e.to_string()))?
    };

    if url.scheme() != "https" {
        return Err(invalid("must be an https uri"));
    }
    let host = url.host_str().ok_or_else(|| invalid("missing host"))?;

    Ok(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

/// The Auth0 authentication step.
pub struct Auth0AuthMiddleware {
    defaults: JwksConfig,
    http: reqwest::Client,
    verifier: RwLock<Option<Arc<JwtVerifier>>>,
}

impl Auth0AuthMiddleware {
    /// Creates the step.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the HTTP client cannot be built.
    pub fn new(defaults: &JwksConfig) -> WebtaskResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(defaults.request_timeout_ms))
            .build()
            .map_err(|e| WebtaskError::configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            defaults: defaults.clone(),
            http,
            verifier: RwLock::new(None),
        })
    }

    fn verifier(&self, ctx: &RequestContext) -> WebtaskResult<Arc<JwtVerifier>> {
        if let Some(verifier) = self.verifier.read().as_ref() {
            return Ok(Arc::clone(verifier));
        }

        let config = Auth0Config::from_context(ctx, &self.defaults)?;
        tracing::debug!(?config, "Derived Auth0 settings");

        let built = Arc::new(config.verifier(&self.http));
        Ok(Arc::clone(self.verifier.write().get_or_insert(built)))
    }
}

impl fmt::Debug for Auth0AuthMiddleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Auth0AuthMiddleware")
            .field("defaults", &self.defaults)
            .field("configured", &self.verifier.read().is_some())
            .finish_non_exhaustive()
    }
}

impl Middleware for Auth0AuthMiddleware {
    fn name(&self) -> &'static str {
        "auth0-auth"
    }

    fn handle<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        _res: &'a mut ResponseSink,
    ) -> BoxFuture<'a, WebtaskResult<Flow>> {
        Box::pin(async move {
            let verifier = self.verifier(ctx)?;
            let token = credentials(ctx.authorization())?.to_string();

            let claims = match verifier.verify(&token).await {
                Ok(claims) => claims,
                Err(e) => {
                    record_auth_decision("auth0", false);
                    return Err(e);
                }
            };
            record_auth_decision("auth0", true);

            tracing::debug!(
                request_id = %ctx.request_id(),
                subject = claims.get("sub").and_then(serde_json::Value::as_str),
                "Auth0 token accepted"
            );
            ctx.set_claims(claims);

            Ok(Flow::Continue)
        })
    }
}

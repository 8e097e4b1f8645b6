//! JWT scope authorization.
//!
//! Enabled per webtask with the `wt-authorize-execution` metadata flag. When
//! enabled, every request must carry `Authorization: Bearer <jwt>` signed by
//! the configured issuer for the configured audience, and the token's
//! `scope` claim must grant execution:
//!
//! - `wt:admin` grants every container
//! - `wt:owner:<container>` grants the caller's container
//! - the `wt-execution-scope` metadata value, when set, grants as well
//!
//! Settings and discovered keys are derived on the first enabled request and
//! kept for the life of the step. Failed derivations are retried on the next
//! request.

mod config;
mod discovery;
mod keys;
mod verifier;

pub use config::{
    is_enabled, JwtAuthConfig, KeyDiscovery, SigningAlgorithm, AUTHORIZE_EXECUTION,
    EXECUTION_ALGORITHM, EXECUTION_AUDIENCE, EXECUTION_ISSUER, EXECUTION_SCOPE, EXECUTION_SECRET,
    KEY_DISCOVERY,
};
pub use discovery::{discover_jwks_uri, issuer_url, DISCOVERY_PATH, STATIC_JWKS_PATH};
pub use keys::JwksKeySet;
pub use verifier::{Claims, JwtVerifier, TokenVerifier};

use crate::context::RequestContext;
use crate::middleware::{BoxFuture, Flow, Middleware};
use crate::types::ResponseSink;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use webtask_config::JwksConfig;
use webtask_core::{ErrorFields, ScopeSet, WebtaskError, WebtaskResult};
use webtask_telemetry::metrics::record_auth_decision;

/// Message of the 403 raised when no scope grants execution.
pub const UNAUTHORIZED_MESSAGE: &str = "UnauthorizedError";

const BAD_FORMAT_MESSAGE: &str = "Format is Authorization: Bearer [token]";

/// Extracts the token from a `Bearer` authorization header.
pub(crate) fn credentials(header: Option<&str>) -> WebtaskResult<&str> {
    let header = header.filter(|h| !h.is_empty()).ok_or_else(|| {
        WebtaskError::authentication("No authorization token was found")
            .with_fields(ErrorFields::new().code("credentials_required"))
    })?;

    let mut parts = header.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(scheme), Some(token), None) if scheme.eq_ignore_ascii_case("bearer") => Ok(token),
        (Some(_), Some(_), None) => Err(WebtaskError::authentication(BAD_FORMAT_MESSAGE)
            .with_fields(ErrorFields::new().code("credentials_bad_scheme"))),
        _ => Err(WebtaskError::authentication(BAD_FORMAT_MESSAGE)
            .with_fields(ErrorFields::new().code("credentials_bad_format"))),
    }
}

struct Authorizer {
    config: JwtAuthConfig,
    verifier: Arc<dyn TokenVerifier>,
}

/// The JWT scope authorization step.
pub struct JwtAuthMiddleware {
    settings: JwksConfig,
    http: reqwest::Client,
    verifier: Option<Arc<dyn TokenVerifier>>,
    authorizer: RwLock<Option<Arc<Authorizer>>>,
}

impl JwtAuthMiddleware {
    /// Creates the step.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the HTTP client cannot be built.
    pub fn new(settings: &JwksConfig) -> WebtaskResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(settings.request_timeout_ms))
            .build()
            .map_err(|e| WebtaskError::configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            settings: settings.clone(),
            http,
            verifier: None,
            authorizer: RwLock::new(None),
        })
    }

    /// Replaces the built-in `jsonwebtoken` verifier.
    ///
    /// Key discovery is skipped; the verifier alone decides whether a token
    /// is genuine. Scope checks still apply.
    #[must_use]
    pub fn with_verifier(mut self, verifier: Arc<dyn TokenVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    async fn authorizer(&self, ctx: &RequestContext) -> WebtaskResult<Arc<Authorizer>> {
        let cached = self.authorizer.read().clone();
        if let Some(authorizer) = cached {
            return Ok(authorizer);
        }

        let config = JwtAuthConfig::from_context(ctx)?;
        let verifier: Arc<dyn TokenVerifier> = match &self.verifier {
            Some(verifier) => Arc::clone(verifier),
            None => Arc::new(JwtVerifier::build(&config, &self.http, &self.settings).await?),
        };
        tracing::debug!(?config, "Derived JWT authorization settings");

        let built = Arc::new(Authorizer { config, verifier });
        Ok(Arc::clone(self.authorizer.write().get_or_insert(built)))
    }
}

impl std::fmt::Debug for JwtAuthMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtAuthMiddleware")
            .field("settings", &self.settings)
            .field("custom_verifier", &self.verifier.is_some())
            .field(
                "config",
                &self.authorizer.read().as_ref().map(|a| a.config.clone()),
            )
            .finish_non_exhaustive()
    }
}

impl Middleware for JwtAuthMiddleware {
    fn name(&self) -> &'static str {
        "jwt-auth"
    }

    fn handle<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        _res: &'a mut ResponseSink,
    ) -> BoxFuture<'a, WebtaskResult<Flow>> {
        Box::pin(async move {
            if !is_enabled(ctx.metadata()) {
                return Ok(Flow::Continue);
            }

            let token = credentials(ctx.authorization())?.to_string();
            jsonwebtoken::decode_header(&token).map_err(|e| verifier::map_jwt_error(&e))?;

            let authorizer = self.authorizer(ctx).await?;
            let claims = authorizer.verifier.verify(&token).await?;

            let allowed = claims
                .get("scope")
                .and_then(ScopeSet::from_claim)
                .is_some_and(|scopes| {
                    scopes.permits(ctx.container(), authorizer.config.required_scope.as_deref())
                });
            record_auth_decision("jwt", allowed);

            tracing::debug!(
                request_id = %ctx.request_id(),
                subject = claims.get("sub").and_then(serde_json::Value::as_str),
                allowed,
                "JWT authorization decision"
            );
            ctx.set_claims(claims);

            if allowed {
                Ok(Flow::Continue)
            } else {
                Err(WebtaskError::authorization(UNAUTHORIZED_MESSAGE))
            }
        })
    }
}

//! Shared-secret bearer authentication.
//!
//! When the webtask has a `wt-auth-secret` secret, callers must present it
//! as `Authorization: Bearer <secret>`. Webtasks without the secret are
//! public.

use crate::context::RequestContext;
use crate::middleware::{BoxFuture, Flow, Middleware};
use crate::types::ResponseSink;
use regex::Regex;
use std::sync::OnceLock;
use webtask_core::{WebtaskError, WebtaskResult};
use webtask_telemetry::metrics::record_auth_decision;

/// Secret holding the expected bearer token.
pub const AUTH_SECRET: &str = "wt-auth-secret";

/// Message of every 401 raised by the token-comparison strategies.
pub const UNAUTHENTICATED_MESSAGE: &str = "Unauthenticated extensibility point";

/// Extracts the token from an `Authorization` header value.
///
/// The scheme is matched case-insensitively after trimming surrounding
/// whitespace.
///
/// ```
/// use webtask_middleware::stages::bearer_token;
///
/// assert_eq!(bearer_token("  BEARER abc "), Some("abc"));
/// assert_eq!(bearer_token("Basic abc"), None);
/// assert_eq!(bearer_token("Bearer "), None);
/// ```
#[must_use]
pub fn bearer_token(header: &str) -> Option<&str> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| Regex::new(r"(?i)^bearer (.+)$").expect("valid regex"));

    pattern
        .captures(header.trim())
        .and_then(|captures| captures.get(1))
        .map(|token| token.as_str())
}

/// Compares the bearer token with the `wt-auth-secret` secret.
#[derive(Debug, Clone, Copy, Default)]
pub struct BearerAuthMiddleware;

impl BearerAuthMiddleware {
    /// Creates the middleware.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Middleware for BearerAuthMiddleware {
    fn name(&self) -> &'static str {
        "bearer-auth"
    }

    fn handle<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        _res: &'a mut ResponseSink,
    ) -> BoxFuture<'a, WebtaskResult<Flow>> {
        Box::pin(async move {
            let Some(secret) = ctx.secret(AUTH_SECRET).filter(|s| !s.is_empty()) else {
                return Ok(Flow::Continue);
            };

            let allowed = ctx.authorization().and_then(bearer_token) == Some(secret);
            record_auth_decision("bearer", allowed);

            if allowed {
                Ok(Flow::Continue)
            } else {
                tracing::debug!(request_id = %ctx.request_id(), "Bearer token mismatch");
                Err(WebtaskError::authentication(UNAUTHENTICATED_MESSAGE))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;

    async fn run(ctx: &mut RequestContext) -> WebtaskResult<Flow> {
        BearerAuthMiddleware::new()
            .handle(ctx, &mut ResponseSink::new())
            .await
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(bearer_token("bearer a b c"), Some("a b c"));
        assert_eq!(bearer_token("\tBeArEr xyz\n"), Some("xyz"));
        assert_eq!(bearer_token("Bearerabc"), None);
        assert_eq!(bearer_token(""), None);
    }

    #[tokio::test]
    async fn test_no_secret_passes_anything() {
        let mut ctx = RequestContext::builder()
            .header("authorization", "Bearer whatever")
            .build();
        assert_eq!(run(&mut ctx).await.unwrap(), Flow::Continue);

        let mut ctx = RequestContext::builder().build();
        assert_eq!(run(&mut ctx).await.unwrap(), Flow::Continue);
    }

    #[tokio::test]
    async fn test_empty_secret_is_unset() {
        let mut ctx = RequestContext::builder().secret(AUTH_SECRET, "").build();
        assert_eq!(run(&mut ctx).await.unwrap(), Flow::Continue);
    }

    #[tokio::test]
    async fn test_matching_token_passes() {
        let mut ctx = RequestContext::builder()
            .secret(AUTH_SECRET, "s3cr3t")
            .header("authorization", "bearer s3cr3t")
            .build();
        assert_eq!(run(&mut ctx).await.unwrap(), Flow::Continue);
    }

    #[tokio::test]
    async fn test_mismatch_and_missing_header_fail() {
        for header in [Some("Bearer wrong"), Some("Basic s3cr3t"), None] {
            let mut builder = RequestContext::builder().secret(AUTH_SECRET, "s3cr3t");
            if let Some(header) = header {
                builder = builder.header("authorization", header);
            }
            let err = run(&mut builder.build()).await.unwrap_err();
            assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
            assert_eq!(err.message(), UNAUTHENTICATED_MESSAGE);
        }
    }
}

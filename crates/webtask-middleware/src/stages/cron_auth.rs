//! Invocation-bound token authentication.
//!
//! Scheduled invocations know the token the platform bound to the job and
//! present it as a bearer token.

use super::bearer_auth::{bearer_token, UNAUTHENTICATED_MESSAGE};
use crate::context::RequestContext;
use crate::middleware::{BoxFuture, Flow, Middleware};
use crate::types::ResponseSink;
use webtask_core::{WebtaskError, WebtaskResult};
use webtask_telemetry::metrics::record_auth_decision;

/// Compares the bearer token with the token bound to the invocation.
#[derive(Debug, Clone, Copy, Default)]
pub struct CronAuthMiddleware;

impl CronAuthMiddleware {
    /// Creates the middleware.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Middleware for CronAuthMiddleware {
    fn name(&self) -> &'static str {
        "cron-auth"
    }

    fn handle<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        _res: &'a mut ResponseSink,
    ) -> BoxFuture<'a, WebtaskResult<Flow>> {
        Box::pin(async move {
            let presented = ctx.authorization().and_then(bearer_token);
            let allowed = matches!(
                (ctx.token(), presented),
                (Some(expected), Some(given)) if expected == given
            );
            record_auth_decision("cron", allowed);

            if allowed {
                Ok(Flow::Continue)
            } else {
                Err(WebtaskError::authentication(UNAUTHENTICATED_MESSAGE))
            }
        })
    }
}

//! Dynamically configured middleware pipeline.
//!
//! A [`Pipeline`] is built once per deployed webtask version from its
//! `wt-middleware` metadata and reused by every request against that
//! version. Each run dispatches the steps strictly in order, then invokes
//! the webtask:
//!
//! ```text
//! step 0 → step 1 → … → step n-1 → webtask
//!    │        │              │         │
//!    └────────┴── error ─────┴─────────┴──→ error responder
//! ```
//!
//! Steps are resolved lazily on first use and memoized in their slot, so a
//! named module's factory runs once per pipeline rather than once per
//! request. Two cold requests racing on the same slot may both resolve it;
//! the first stored result wins.

use crate::context::RequestContext;
use crate::middleware::{Flow, Middleware};
use crate::resolver::SpecResolver;
use crate::responder::error_response;
use crate::spec::MiddlewareSpec;
use crate::terminal;
use crate::types::{Response, ResponseSink};
use futures_util::FutureExt;
use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use webtask_core::{WebtaskError, WebtaskResult};
use webtask_telemetry::metrics::record_pipeline_request;

/// Metadata key listing the pipeline's steps.
pub const MIDDLEWARE_META_KEY: &str = "wt-middleware";

/// One step of a pipeline and its memoized resolution.
pub struct PipelineSlot {
    spec: MiddlewareSpec,
    resolved: RwLock<Option<Arc<dyn Middleware>>>,
}

impl PipelineSlot {
    fn new(spec: MiddlewareSpec) -> Self {
        Self {
            spec,
            resolved: RwLock::new(None),
        }
    }

    /// Returns the spec this slot was configured with.
    #[must_use]
    pub fn spec(&self) -> &MiddlewareSpec {
        &self.spec
    }

    /// Returns `true` once the slot holds a resolved step.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.resolved.read().is_some()
    }

    fn cached(&self) -> Option<Arc<dyn Middleware>> {
        self.resolved.read().clone()
    }

    /// Stores a resolution unless another request got there first.
    fn store(&self, middleware: Arc<dyn Middleware>) -> Arc<dyn Middleware> {
        Arc::clone(self.resolved.write().get_or_insert(middleware))
    }
}

impl std::fmt::Debug for PipelineSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineSlot")
            .field("spec", &self.spec)
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

/// Ordered middleware steps wrapping the webtask.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use webtask_config::EngineConfig;
/// use webtask_middleware::{ModuleRegistry, Pipeline, RequestContext, SpecResolver};
///
/// # async fn run() -> webtask_core::WebtaskResult<()> {
/// let config = EngineConfig::default();
/// let registry = Arc::new(ModuleRegistry::with_builtins(&config));
/// let resolver = Arc::new(SpecResolver::new(registry, &config.resolver)?);
///
/// let pipeline = Pipeline::from_meta("@webtask/bearer-auth-middleware", resolver)?;
///
/// let mut ctx = RequestContext::builder()
///     .header("authorization", "Bearer s3cr3t")
///     .secret("wt-auth-secret", "s3cr3t")
///     .build();
/// let response = pipeline.run(&mut ctx).await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Pipeline {
    slots: Vec<PipelineSlot>,
    resolver: Arc<SpecResolver>,
}

impl Pipeline {
    /// Starts building a pipeline.
    #[must_use]
    pub fn builder(resolver: Arc<SpecResolver>) -> PipelineBuilder {
        PipelineBuilder {
            specs: Vec::new(),
            resolver,
        }
    }

    /// Builds a pipeline from a `wt-middleware` value.
    ///
    /// # Errors
    ///
    /// Fails if the value or any of its entries cannot be parsed.
    pub fn from_meta(text: &str, resolver: Arc<SpecResolver>) -> WebtaskResult<Self> {
        Ok(Self::builder(resolver)
            .specs(MiddlewareSpec::parse_list(text)?)
            .build())
    }

    /// Builds a pipeline from a webtask's metadata.
    ///
    /// A missing `wt-middleware` entry yields a pipeline with no steps.
    ///
    /// # Errors
    ///
    /// Fails if the entry cannot be parsed.
    pub fn from_metadata(
        meta: &HashMap<String, String>,
        resolver: Arc<SpecResolver>,
    ) -> WebtaskResult<Self> {
        match meta.get(MIDDLEWARE_META_KEY) {
            Some(text) => Self::from_meta(text, resolver),
            None => Ok(Self::builder(resolver).build()),
        }
    }

    /// Returns the slots in order.
    #[must_use]
    pub fn slots(&self) -> &[PipelineSlot] {
        &self.slots
    }

    /// Returns the number of steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns `true` if the webtask runs with no steps before it.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Runs one request through the steps and the webtask.
    ///
    /// Always produces exactly one response. Failures are converted by the
    /// error responder.
    pub async fn run(&self, ctx: &mut RequestContext) -> Response {
        let mut sink = ResponseSink::new();
        let outcome = self.dispatch(ctx, &mut sink).await;

        let response = match outcome {
            Ok(()) => sink.take().unwrap_or_else(|| {
                let err = WebtaskError::contract_violation("pipeline finished without a response");
                log_failure(ctx, &err);
                error_response(&err)
            }),
            Err(err) => {
                log_failure(ctx, &err);
                match sink.take() {
                    Some(sent) => {
                        tracing::warn!(
                            request_id = %ctx.request_id(),
                            error = %err,
                            "Error raised after a response was sent; keeping the sent response"
                        );
                        sent
                    }
                    None => error_response(&err),
                }
            }
        };

        record_pipeline_request(response.status().as_u16(), ctx.elapsed());
        response
    }

    async fn dispatch(&self, ctx: &mut RequestContext, sink: &mut ResponseSink) -> WebtaskResult<()> {
        for (index, slot) in self.slots.iter().enumerate() {
            let middleware = self.resolve_slot(slot, ctx).await?;

            tracing::debug!(
                request_id = %ctx.request_id(),
                index,
                spec = %slot.spec().label(),
                step = middleware.name(),
                "Invoking middleware"
            );

            let step = &*middleware;
            let (step_ctx, step_sink) = (&mut *ctx, &mut *sink);
            let flow = guarded(step.name(), move || step.handle(step_ctx, step_sink)).await?;
            if flow == Flow::Halt {
                if sink.is_sent() {
                    return Ok(());
                }
                return Err(WebtaskError::contract_violation(format!(
                    "middleware `{}` halted without sending a response",
                    middleware.name()
                )));
            }
        }

        guarded("webtask", move || terminal::invoke(ctx, sink)).await
    }

    async fn resolve_slot(
        &self,
        slot: &PipelineSlot,
        ctx: &RequestContext,
    ) -> WebtaskResult<Arc<dyn Middleware>> {
        if let Some(middleware) = slot.cached() {
            return Ok(middleware);
        }
        let resolved = self.resolver.resolve(slot.spec(), ctx.compiler()).await?;
        Ok(slot.store(resolved))
    }
}

/// Starts and awaits a step, turning a panic in either phase into an
/// internal error.
async fn guarded<T, F, Fut>(name: &str, start: F) -> WebtaskResult<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = WebtaskResult<T>>,
{
    let fut = match panic::catch_unwind(AssertUnwindSafe(start)) {
        Ok(fut) => fut,
        Err(payload) => return Err(panicked(name, payload.as_ref())),
    };

    AssertUnwindSafe(fut)
        .catch_unwind()
        .await
        .unwrap_or_else(|payload| Err(panicked(name, payload.as_ref())))
}

fn panicked(name: &str, payload: &(dyn Any + Send)) -> WebtaskError {
    WebtaskError::internal(format!("`{name}` panicked: {}", panic_message(payload)))
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

fn log_failure(ctx: &RequestContext, err: &WebtaskError) {
    if err.is_server_error() {
        tracing::error!(
            request_id = %ctx.request_id(),
            error_kind = ?err.kind(),
            status = err.status_code().as_u16(),
            error = %err,
            "Pipeline failed"
        );
    } else {
        tracing::debug!(
            request_id = %ctx.request_id(),
            error_kind = ?err.kind(),
            status = err.status_code().as_u16(),
            error = %err,
            "Pipeline rejected request"
        );
    }
}

/// Builder for [`Pipeline`].
#[derive(Debug)]
pub struct PipelineBuilder {
    specs: Vec<MiddlewareSpec>,
    resolver: Arc<SpecResolver>,
}

impl PipelineBuilder {
    /// Appends a step.
    #[must_use]
    pub fn spec(mut self, spec: MiddlewareSpec) -> Self {
        self.specs.push(spec);
        self
    }

    /// Appends several steps.
    #[must_use]
    pub fn specs(mut self, specs: impl IntoIterator<Item = MiddlewareSpec>) -> Self {
        self.specs.extend(specs);
        self
    }

    /// Appends a host-supplied step.
    #[must_use]
    pub fn middleware<M: Middleware>(self, middleware: M) -> Self {
        self.spec(MiddlewareSpec::inline(middleware))
    }

    /// Builds the pipeline.
    #[must_use]
    pub fn build(self) -> Pipeline {
        Pipeline {
            slots: self.specs.into_iter().map(PipelineSlot::new).collect(),
            resolver: self.resolver,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::CompilerHandle;
    use crate::middleware::FnMiddleware;
    use crate::module::{Module, Webtask};
    use crate::resolver::ModuleRegistry;
    use http::StatusCode;
    use http_body_util::BodyExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use webtask_config::ResolverConfig;

    #[derive(Default)]
    struct Trail(Vec<&'static str>);

    fn recorder(name: &'static str) -> impl Middleware {
        FnMiddleware::new(name, move |ctx, _res| {
            Box::pin(async move {
                let mut trail = ctx.remove_extension::<Trail>().unwrap_or_default();
                trail.0.push(name);
                ctx.set_extension(trail);
                Ok(Flow::Continue)
            })
        })
    }

    fn resolver() -> Arc<SpecResolver> {
        Arc::new(SpecResolver::new(Arc::new(ModuleRegistry::new()), &ResolverConfig::default()).unwrap())
    }

    fn ok_webtask() -> CompilerHandle {
        CompilerHandle::precompiled(Module::webtask(Webtask::callback(|| async { Ok("OK") })))
    }

    async fn body(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_steps_run_in_order_before_webtask() {
        let pipeline = Pipeline::builder(resolver())
            .middleware(recorder("first"))
            .middleware(recorder("second"))
            .middleware(recorder("third"))
            .build();

        let mut ctx = RequestContext::builder().compiler(ok_webtask()).build();
        let response = pipeline.run(&mut ctx).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body(response).await, r#""OK""#);
        assert_eq!(
            ctx.get_extension::<Trail>().unwrap().0,
            vec!["first", "second", "third"]
        );
    }

    #[tokio::test]
    async fn test_error_short_circuits() {
        let pipeline = Pipeline::builder(resolver())
            .middleware(recorder("first"))
            .middleware(FnMiddleware::new("deny", |_ctx, _res| {
                Box::pin(async { Err(WebtaskError::custom(StatusCode::FORBIDDEN, "nope")) })
            }))
            .middleware(recorder("never"))
            .build();

        let mut ctx = RequestContext::builder().compiler(ok_webtask()).build();
        let response = pipeline.run(&mut ctx).await;

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(body(response).await, r#"{"message":"nope","statusCode":403}"#);
        assert_eq!(ctx.get_extension::<Trail>().unwrap().0, vec!["first"]);
    }

    #[tokio::test]
    async fn test_panicking_step_is_masked() {
        let pipeline = Pipeline::builder(resolver())
            .middleware(FnMiddleware::new("explode", |ctx, _res| {
                Box::pin(async move {
                    if ctx.get_extension::<Trail>().is_none() {
                        panic!("secret detail");
                    }
                    Ok(Flow::Continue)
                })
            }))
            .build();

        let mut ctx = RequestContext::builder().compiler(ok_webtask()).build();
        let response = pipeline.run(&mut ctx).await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body(response).await,
            r#"{"message":"Server error","statusCode":500}"#
        );
    }

    struct PanicsOnCall;

    impl Middleware for PanicsOnCall {
        fn name(&self) -> &'static str {
            "panics-on-call"
        }

        fn handle<'a>(
            &'a self,
            _ctx: &'a mut RequestContext,
            _res: &'a mut ResponseSink,
        ) -> crate::middleware::BoxFuture<'a, WebtaskResult<Flow>> {
            panic!("raised before any future exists")
        }
    }

    #[tokio::test]
    async fn test_panic_while_starting_step_is_masked() {
        let pipeline = Pipeline::builder(resolver())
            .middleware(recorder("first"))
            .middleware(PanicsOnCall)
            .middleware(recorder("never"))
            .build();

        let mut ctx = RequestContext::builder().compiler(ok_webtask()).build();
        let response = pipeline.run(&mut ctx).await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body(response).await,
            r#"{"message":"Server error","statusCode":500}"#
        );
        assert_eq!(ctx.get_extension::<Trail>().unwrap().0, vec!["first"]);
    }

    #[tokio::test]
    async fn test_panic_in_closure_before_future_is_masked() {
        let pipeline = Pipeline::builder(resolver())
            .middleware(FnMiddleware::new("eager", |ctx, _res| {
                assert!(ctx.get_extension::<Trail>().is_some(), "no trail yet");
                Box::pin(async { Ok(Flow::Continue) })
            }))
            .build();

        let mut ctx = RequestContext::builder().compiler(ok_webtask()).build();
        let response = pipeline.run(&mut ctx).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_halt_skips_webtask() {
        let invoked = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&invoked);
        let compiler = CompilerHandle::precompiled(Module::webtask(Webtask::callback(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok("OK") }
        })));

        let pipeline = Pipeline::builder(resolver())
            .middleware(FnMiddleware::new("redirect", |_ctx, res| {
                Box::pin(async move {
                    res.send_text(StatusCode::FOUND, "elsewhere")?;
                    Ok(Flow::Halt)
                })
            }))
            .build();

        let mut ctx = RequestContext::builder().compiler(compiler).build();
        let response = pipeline.run(&mut ctx).await;

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_halt_without_response_is_contract_violation() {
        let pipeline = Pipeline::builder(resolver())
            .middleware(FnMiddleware::new("lazy", |_ctx, _res| {
                Box::pin(async { Ok(Flow::Halt) })
            }))
            .build();

        let mut ctx = RequestContext::builder().compiler(ok_webtask()).build();
        let response = pipeline.run(&mut ctx).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_error_after_send_keeps_sent_response() {
        let pipeline = Pipeline::builder(resolver())
            .middleware(FnMiddleware::new("send-then-fail", |_ctx, res| {
                Box::pin(async move {
                    res.send_text(StatusCode::ACCEPTED, "queued")?;
                    Err(WebtaskError::internal("late failure"))
                })
            }))
            .build();

        let mut ctx = RequestContext::builder().compiler(ok_webtask()).build();
        let response = pipeline.run(&mut ctx).await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    #[test]
    fn test_from_metadata_without_key() {
        let pipeline = Pipeline::from_metadata(&HashMap::new(), resolver()).unwrap();
        assert!(pipeline.is_empty());
    }

    #[test]
    fn test_from_meta_parses_eagerly() {
        let pipeline = Pipeline::from_meta("a, b/c", resolver()).unwrap();
        assert_eq!(pipeline.len(), 2);
        assert!(pipeline.slots().iter().all(|slot| !slot.is_resolved()));

        let err = Pipeline::from_meta("a, @broken", resolver()).unwrap_err();
        assert_eq!(err.kind(), webtask_core::ErrorKind::Parse);
    }

    #[tokio::test]
    async fn test_unresolvable_step_fails_request() {
        let pipeline = Pipeline::from_meta("not-registered", resolver()).unwrap();
        let mut ctx = RequestContext::builder().compiler(ok_webtask()).build();

        let response = pipeline.run(&mut ctx).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!pipeline.slots()[0].is_resolved());
    }
}

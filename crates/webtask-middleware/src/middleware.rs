//! Core middleware trait and types.
//!
//! A step receives the mutable [`RequestContext`] and the [`ResponseSink`]
//! and reports how the pipeline should proceed:
//!
//! - `Ok(Flow::Continue)` advances to the next step (or the webtask)
//! - `Ok(Flow::Halt)` ends the run; the step must have written a response
//! - `Err(error)` short-circuits to the error responder
//!
//! # Example
//!
//! ```
//! use webtask_middleware::{BoxFuture, Flow, Middleware, RequestContext, ResponseSink};
//! use webtask_core::WebtaskResult;
//!
//! struct RequireContainer;
//!
//! impl Middleware for RequireContainer {
//!     fn name(&self) -> &'static str {
//!         "require-container"
//!     }
//!
//!     fn handle<'a>(
//!         &'a self,
//!         ctx: &'a mut RequestContext,
//!         _res: &'a mut ResponseSink,
//!     ) -> BoxFuture<'a, WebtaskResult<Flow>> {
//!         Box::pin(async move {
//!             match ctx.container() {
//!                 Some(_) => Ok(Flow::Continue),
//!                 None => Err(webtask_core::WebtaskError::authorization("no container")),
//!             }
//!         })
//!     }
//! }
//! ```

use crate::context::RequestContext;
use crate::types::ResponseSink;
use std::future::Future;
use std::pin::Pin;
use webtask_core::WebtaskResult;

/// A boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What the pipeline does after a step returns successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Advance to the next step.
    Continue,
    /// Stop; the step already wrote the response.
    Halt,
}

/// A pipeline step.
///
/// # Invariants
///
/// - A step is invoked at most once per request
/// - A step returning [`Flow::Halt`] MUST have written to the sink
pub trait Middleware: Send + Sync + 'static {
    /// Returns the name of this step, used for logging.
    fn name(&self) -> &'static str;

    /// Processes the request.
    fn handle<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        res: &'a mut ResponseSink,
    ) -> BoxFuture<'a, WebtaskResult<Flow>>;
}

/// A middleware built from a closure.
///
/// # Example
///
/// ```
/// use webtask_middleware::{Flow, FnMiddleware};
///
/// let tag = FnMiddleware::new("tag", |ctx, _res| {
///     Box::pin(async move {
///         ctx.set_extension("tagged");
///         Ok(Flow::Continue)
///     })
/// });
/// ```
pub struct FnMiddleware<F> {
    name: &'static str,
    func: F,
}

impl<F> FnMiddleware<F> {
    /// Creates a new function-based middleware.
    pub fn new(name: &'static str, func: F) -> Self
    where
        F: for<'a> Fn(
                &'a mut RequestContext,
                &'a mut ResponseSink,
            ) -> BoxFuture<'a, WebtaskResult<Flow>>
            + Send
            + Sync
            + 'static,
    {
        Self { name, func }
    }
}

impl<F> Middleware for FnMiddleware<F>
where
    F: for<'a> Fn(&'a mut RequestContext, &'a mut ResponseSink) -> BoxFuture<'a, WebtaskResult<Flow>>
        + Send
        + Sync
        + 'static,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn handle<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        res: &'a mut ResponseSink,
    ) -> BoxFuture<'a, WebtaskResult<Flow>> {
        (self.func)(ctx, res)
    }
}

//! Loadable module model.
//!
//! A [`Module`] is what the registry holds for a named package and what a
//! [`Compiler`](crate::compiler::Compiler) yields for source text: an
//! optional default export plus named exports.
//!
//! Middleware modules export a zero-argument factory producing a step:
//!
//! ```
//! use webtask_middleware::module::{Callable, Export, Module};
//! use webtask_middleware::stages::BearerAuthMiddleware;
//!
//! let module = Module::new()
//!     .with_default(Export::factory(|| Ok(Callable::middleware(BearerAuthMiddleware::new()))));
//! assert!(module.default_export().is_some());
//! ```
//!
//! Webtask modules export a [`Webtask`] whose calling convention is an
//! explicit tag rather than something inferred from the function shape.

use crate::context::WebtaskContext;
use crate::middleware::{BoxFuture, Middleware};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use webtask_core::{WebtaskError, WebtaskResult};

/// Zero-argument producer of a [`Callable`].
pub type Factory = Arc<dyn Fn() -> WebtaskResult<Callable> + Send + Sync>;

/// Terminal function invoked with no arguments.
pub type CallbackFn = Arc<dyn Fn() -> BoxFuture<'static, WebtaskResult<serde_json::Value>> + Send + Sync>;

/// Terminal function invoked with a context snapshot.
pub type ContextFn =
    Arc<dyn Fn(WebtaskContext) -> BoxFuture<'static, WebtaskResult<serde_json::Value>> + Send + Sync>;

/// A user-deployed function and its calling convention.
#[derive(Clone)]
pub enum Webtask {
    /// `cb => cb(error, result)`: no inputs, produces a JSON result.
    Callback(CallbackFn),
    /// `(ctx, cb) => ...`: receives secrets, metadata and request data.
    WithContext(ContextFn),
    /// `(req, res) => ...`: writes the response itself.
    Raw(Arc<dyn Middleware>),
}

impl Webtask {
    /// Wraps a no-argument function whose result is sent as JSON.
    ///
    /// A result that cannot be represented as JSON fails with a
    /// serialization error.
    pub fn callback<F, Fut, T>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = WebtaskResult<T>> + Send + 'static,
        T: Serialize + Send + 'static,
    {
        Self::Callback(Arc::new(move || -> BoxFuture<'static, WebtaskResult<serde_json::Value>> {
            let fut = f();
            Box::pin(async move { to_json(fut.await?) })
        }))
    }

    /// Wraps a function receiving the webtask context.
    pub fn with_context<F, Fut, T>(f: F) -> Self
    where
        F: Fn(WebtaskContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = WebtaskResult<T>> + Send + 'static,
        T: Serialize + Send + 'static,
    {
        Self::WithContext(Arc::new(
            move |ctx: WebtaskContext| -> BoxFuture<'static, WebtaskResult<serde_json::Value>> {
                let fut = f(ctx);
                Box::pin(async move { to_json(fut.await?) })
            },
        ))
    }

    /// Wraps a step that writes the response itself.
    pub fn raw<M: Middleware>(middleware: M) -> Self {
        Self::Raw(Arc::new(middleware))
    }

    /// Name of the calling convention, for logging.
    #[must_use]
    pub fn convention(&self) -> &'static str {
        match self {
            Self::Callback(_) => "callback",
            Self::WithContext(_) => "with_context",
            Self::Raw(_) => "raw",
        }
    }
}

impl fmt::Debug for Webtask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Webtask::{}", self.convention())
    }
}

fn to_json<T: Serialize>(value: T) -> WebtaskResult<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| WebtaskError::serialization(e.to_string()))
}

/// A value that may be invoked by the pipeline.
#[derive(Clone)]
pub enum Callable {
    /// A three-parameter pipeline step.
    Middleware(Arc<dyn Middleware>),
    /// A terminal webtask.
    Webtask(Webtask),
    /// Plain data; never invocable.
    Value(serde_json::Value),
}

impl Callable {
    /// Wraps a pipeline step.
    pub fn middleware<M: Middleware>(middleware: M) -> Self {
        Self::Middleware(Arc::new(middleware))
    }

    /// Short description of the value's shape, for error messages.
    #[must_use]
    pub fn shape(&self) -> &'static str {
        match self {
            Self::Middleware(_) => "middleware",
            Self::Webtask(_) => "webtask",
            Self::Value(_) => "value",
        }
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Middleware(m) => write!(f, "Callable::Middleware({})", m.name()),
            Self::Webtask(w) => write!(f, "Callable::{w:?}"),
            Self::Value(v) => write!(f, "Callable::Value({v})"),
        }
    }
}

/// One export of a module.
#[derive(Clone)]
pub enum Export {
    /// Zero-argument factory.
    Factory(Factory),
    /// A value exported directly.
    Callable(Callable),
}

impl Export {
    /// Creates a factory export.
    pub fn factory<F>(f: F) -> Self
    where
        F: Fn() -> WebtaskResult<Callable> + Send + Sync + 'static,
    {
        Self::Factory(Arc::new(f))
    }

    /// Exports a webtask directly.
    #[must_use]
    pub fn webtask(webtask: Webtask) -> Self {
        Self::Callable(Callable::Webtask(webtask))
    }

    /// Exports plain data.
    pub fn value(value: impl Into<serde_json::Value>) -> Self {
        Self::Callable(Callable::Value(value.into()))
    }
}

impl fmt::Debug for Export {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Factory(_) => write!(f, "Export::Factory"),
            Self::Callable(c) => write!(f, "Export::{c:?}"),
        }
    }
}

/// A loaded module.
#[derive(Clone, Debug, Default)]
pub struct Module {
    default: Option<Export>,
    named: HashMap<String, Export>,
}

impl Module {
    /// Creates an empty module.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a module whose default export is a middleware factory.
    pub fn middleware<F, M>(factory: F) -> Self
    where
        F: Fn() -> WebtaskResult<M> + Send + Sync + 'static,
        M: Middleware,
    {
        Self::new().with_default(Export::factory(move || factory().map(Callable::middleware)))
    }

    /// Creates a module whose default export is a webtask.
    #[must_use]
    pub fn webtask(webtask: Webtask) -> Self {
        Self::new().with_default(Export::webtask(webtask))
    }

    /// Sets the default export.
    #[must_use]
    pub fn with_default(mut self, export: Export) -> Self {
        self.default = Some(export);
        self
    }

    /// Adds a named export.
    #[must_use]
    pub fn with_export(mut self, name: impl Into<String>, export: Export) -> Self {
        self.named.insert(name.into(), export);
        self
    }

    /// Returns the default export.
    #[must_use]
    pub fn default_export(&self) -> Option<&Export> {
        self.default.as_ref()
    }

    /// Returns a named export.
    #[must_use]
    pub fn export(&self, name: &str) -> Option<&Export> {
        self.named.get(name)
    }
}

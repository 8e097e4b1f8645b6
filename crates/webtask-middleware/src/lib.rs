//! # Webtask Middleware
//!
//! Dynamically configured middleware pipeline for webtasks, with the stock
//! authentication and authorization strategies.
//!
//! A webtask lists its steps in the `wt-middleware` metadata entry. The
//! [`Pipeline`] parses that list once, resolves each step lazily through the
//! [`SpecResolver`], runs the steps in order and finally invokes the webtask
//! itself:
//!
//! ```text
//! wt-middleware: "@webtask/jwt-middleware, https://cdn.example.com/audit.js"
//!
//! Request → jwt-middleware → audit.js → webtask
//!               │               │          │
//!               └──── error ────┴──────────┴──→ {"message", "statusCode"}
//! ```
//!
//! ## Step references
//!
//! | Form | Resolved from |
//! |---|---|
//! | `name`, `@scope/name` | default export of a [`ModuleRegistry`] module |
//! | `name/export` | named export of a registry module |
//! | `https://…` | source fetched over HTTP, compiled by the request's [`Compiler`] |
//!
//! ## Errors
//!
//! Failures become `{"message": ..., "statusCode": ...}` responses. A 500
//! always reads `Server error`; other statuses forward their message and the
//! allow-listed `code`, `errno`, `error`, `error_description` and `data`
//! fields.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use webtask_config::EngineConfig;
//! use webtask_middleware::module::{Module, Webtask};
//! use webtask_middleware::{CompilerHandle, ModuleRegistry, Pipeline, RequestContext, SpecResolver};
//!
//! # async fn serve() -> webtask_core::WebtaskResult<()> {
//! let config = EngineConfig::default();
//! let registry = Arc::new(ModuleRegistry::with_builtins(&config));
//! let resolver = Arc::new(SpecResolver::new(registry, &config.resolver)?);
//!
//! let mut ctx = RequestContext::builder()
//!     .meta("wt-middleware", "@webtask/bearer-auth-middleware")
//!     .secret("wt-auth-secret", "s3cr3t")
//!     .header("authorization", "Bearer s3cr3t")
//!     .compiler(CompilerHandle::precompiled(Module::webtask(Webtask::callback(
//!         || async { Ok("hello") },
//!     ))))
//!     .build();
//!
//! let pipeline = Pipeline::from_metadata(ctx.metadata(), resolver)?;
//! let response = pipeline.run(&mut ctx).await;
//! assert_eq!(response.status(), 200);
//! # Ok(())
//! # }
//! ```

#![doc(html_root_url = "https://docs.rs/webtask-middleware/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod builtins;
pub mod compiler;
pub mod context;
pub mod middleware;
pub mod module;
pub mod pipeline;
pub mod resolver;
pub mod responder;
pub mod spec;
pub mod stages;
mod terminal;
pub mod types;

pub use builtins::register_builtins;
pub use compiler::{Compiler, CompilerHandle, Script};
pub use context::{RequestContext, RequestContextBuilder, WebtaskContext};
pub use middleware::{BoxFuture, Flow, FnMiddleware, Middleware};
pub use module::{Callable, Export, Module, Webtask};
pub use pipeline::{Pipeline, PipelineBuilder, PipelineSlot, MIDDLEWARE_META_KEY};
pub use resolver::{ModuleRegistry, SpecResolver};
pub use responder::{error_response, SERVER_ERROR_MESSAGE};
pub use spec::MiddlewareSpec;
pub use types::{Request, Response, ResponseSink};

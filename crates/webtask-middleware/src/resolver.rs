//! Middleware resolution.
//!
//! Turns a [`MiddlewareSpec`] into a runnable step. Named specs come from the
//! [`ModuleRegistry`] populated at startup; remote specs are fetched over
//! HTTP and compiled with the compiler in effect for the request.

use crate::compiler::CompilerHandle;
use crate::middleware::Middleware;
use crate::module::{Callable, Export, Module};
use crate::spec::MiddlewareSpec;
use reqwest::redirect::Policy;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use webtask_config::{EngineConfig, ResolverConfig};
use webtask_core::{WebtaskError, WebtaskResult};
use webtask_telemetry::metrics::record_resolution;

/// Message used when a factory yields something other than a step.
pub const NOT_A_STEP_MESSAGE: &str = "A Webtask middleware must export a function that returns a function with the signature `function(req, res, next)`";

/// Modules addressable by name from `wt-middleware`.
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    modules: HashMap<String, Module>,
}

impl ModuleRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the stock auth strategies.
    #[must_use]
    pub fn with_builtins(config: &EngineConfig) -> Self {
        let mut registry = Self::new();
        crate::builtins::register_builtins(&mut registry, config);
        registry
    }

    /// Registers a module, replacing any module of the same name.
    pub fn register(&mut self, name: impl Into<String>, module: Module) -> &mut Self {
        self.modules.insert(name.into(), module);
        self
    }

    /// Looks up a module.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Module> {
        self.modules.get(name)
    }

    /// Returns `true` if a module of that name is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    /// Number of registered modules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

/// Resolves specs into steps.
#[derive(Debug)]
pub struct SpecResolver {
    registry: Arc<ModuleRegistry>,
    http: reqwest::Client,
}

impl SpecResolver {
    /// Creates a resolver over `registry`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the HTTP client cannot be built.
    pub fn new(registry: Arc<ModuleRegistry>, config: &ResolverConfig) -> WebtaskResult<Self> {
        let http = reqwest::Client::builder()
            .redirect(Policy::limited(config.max_redirects))
            .timeout(Duration::from_millis(config.fetch_timeout_ms))
            .build()
            .map_err(|e| WebtaskError::configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { registry, http })
    }

    /// Returns the registry.
    #[must_use]
    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    /// Resolves `spec` into a step.
    ///
    /// # Errors
    ///
    /// - resolution error for a missing module or export, a failed
    ///   compilation, or a factory that fails or panics
    /// - fetch error for a remote source that cannot be downloaded
    /// - contract violation when the export is not a factory or the factory
    ///   does not produce a step
    pub async fn resolve(
        &self,
        spec: &MiddlewareSpec,
        compiler: &CompilerHandle,
    ) -> WebtaskResult<Arc<dyn Middleware>> {
        let result = match spec {
            MiddlewareSpec::Inline(middleware) => Ok(Arc::clone(middleware)),
            MiddlewareSpec::Named { module, export } => self.resolve_named(module, export.as_deref()),
            MiddlewareSpec::Remote { url } => self.resolve_remote(url, compiler).await,
        };

        record_resolution(spec.kind(), result.is_ok());
        match &result {
            Ok(middleware) => {
                tracing::debug!(spec = %spec.label(), step = middleware.name(), "Resolved middleware");
            }
            Err(e) => {
                tracing::debug!(spec = %spec.label(), error = %e, "Middleware resolution failed");
            }
        }
        result
    }

    fn resolve_named(&self, name: &str, export: Option<&str>) -> WebtaskResult<Arc<dyn Middleware>> {
        let module = self
            .registry
            .get(name)
            .ok_or_else(|| WebtaskError::resolution(format!("module `{name}` is not registered")))?;

        let selected = match export {
            Some(export) => module.export(export).ok_or_else(|| {
                WebtaskError::resolution(format!("module `{name}` has no export `{export}`"))
            })?,
            None => module.default_export().ok_or_else(|| {
                WebtaskError::resolution(format!("module `{name}` has no default export"))
            })?,
        };

        instantiate(selected, name)
    }

    async fn resolve_remote(
        &self,
        url: &reqwest::Url,
        compiler: &CompilerHandle,
    ) -> WebtaskResult<Arc<dyn Middleware>> {
        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|e| WebtaskError::fetch(url.as_str(), e.to_string(), None))?;

        let status = response.status();
        if !status.is_success() {
            return Err(WebtaskError::fetch(
                url.as_str(),
                format!("unexpected status {status}"),
                Some(status.as_u16()),
            ));
        }

        let source = response
            .text()
            .await
            .map_err(|e| WebtaskError::fetch(url.as_str(), e.to_string(), Some(status.as_u16())))?;

        let module = compiler
            .compile_source(&source)
            .await
            .map_err(|e| WebtaskError::resolution_with_source(format!("failed to compile `{url}`"), e))?;

        let export = module.default_export().ok_or_else(|| {
            WebtaskError::resolution(format!("code loaded from `{url}` has no default export"))
        })?;

        instantiate(export, url.as_str())
    }
}

/// Invokes a factory export and checks that it produced a step.
fn instantiate(export: &Export, label: &str) -> WebtaskResult<Arc<dyn Middleware>> {
    let Export::Factory(factory) = export else {
        return Err(WebtaskError::contract_violation(NOT_A_STEP_MESSAGE));
    };

    let produced = panic::catch_unwind(AssertUnwindSafe(|| factory())).map_err(|_| {
        WebtaskError::resolution(format!("middleware factory for `{label}` panicked"))
    })?;

    match produced {
        Ok(Callable::Middleware(middleware)) => Ok(middleware),
        Ok(other) => {
            tracing::debug!(spec = label, shape = other.shape(), "Factory produced a non-step value");
            Err(WebtaskError::contract_violation(NOT_A_STEP_MESSAGE))
        }
        Err(e) => Err(WebtaskError::resolution_with_source(
            format!("middleware factory for `{label}` failed"),
            e,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::{Flow, FnMiddleware};
    use crate::module::Webtask;
    use webtask_core::ErrorKind;

    fn noop() -> impl Middleware {
        FnMiddleware::new("noop", |_ctx, _res| Box::pin(async { Ok(Flow::Continue) }))
    }

    fn resolver(registry: ModuleRegistry) -> SpecResolver {
        SpecResolver::new(Arc::new(registry), &ResolverConfig::default()).unwrap()
    }

    async fn resolve(resolver: &SpecResolver, text: &str) -> WebtaskResult<Arc<dyn Middleware>> {
        let spec = MiddlewareSpec::parse(text).unwrap();
        resolver.resolve(&spec, &CompilerHandle::default()).await
    }

    #[tokio::test]
    async fn test_resolves_default_and_named_exports() {
        let mut registry = ModuleRegistry::new();
        registry.register(
            "pkg",
            Module::middleware(|| Ok(noop())).with_export(
                "other",
                Export::factory(|| Ok(Callable::middleware(noop()))),
            ),
        );
        let resolver = resolver(registry);

        assert_eq!(resolve(&resolver, "pkg").await.unwrap().name(), "noop");
        assert_eq!(resolve(&resolver, "pkg/other").await.unwrap().name(), "noop");
    }

    #[tokio::test]
    async fn test_inline_is_returned_unchanged() {
        let resolver = resolver(ModuleRegistry::new());
        let spec = MiddlewareSpec::inline(noop());
        let MiddlewareSpec::Inline(original) = &spec else {
            unreachable!()
        };

        let resolved = resolver.resolve(&spec, &CompilerHandle::default()).await.unwrap();
        assert!(Arc::ptr_eq(original, &resolved));
    }

    #[tokio::test]
    async fn test_missing_module_and_export() {
        let mut registry = ModuleRegistry::new();
        registry.register("pkg", Module::new());
        let resolver = resolver(registry);

        let err = resolve(&resolver, "missing").await.err().expect("expected error");
        assert_eq!(err.kind(), ErrorKind::Resolution);

        let err = resolve(&resolver, "pkg").await.err().expect("expected error");
        assert_eq!(err.kind(), ErrorKind::Resolution);

        let err = resolve(&resolver, "pkg/nope").await.err().expect("expected error");
        assert_eq!(err.kind(), ErrorKind::Resolution);
    }

    #[tokio::test]
    async fn test_factory_must_produce_a_step() {
        let mut registry = ModuleRegistry::new();
        registry.register(
            "webtask-not-step",
            Module::new().with_default(Export::factory(|| {
                Ok(Callable::Webtask(Webtask::callback(|| async { Ok(1) })))
            })),
        );
        registry.register("plain-value", Module::new().with_default(Export::value(42)));
        let resolver = resolver(registry);

        let err = resolve(&resolver, "webtask-not-step").await.err().expect("expected error");
        assert_eq!(err.kind(), ErrorKind::ContractViolation);
        assert_eq!(err.message(), NOT_A_STEP_MESSAGE);

        let err = resolve(&resolver, "plain-value").await.err().expect("expected error");
        assert_eq!(err.kind(), ErrorKind::ContractViolation);
    }

    #[tokio::test]
    async fn test_factory_failure_and_panic() {
        let mut registry = ModuleRegistry::new();
        registry.register(
            "failing",
            Module::new().with_default(Export::factory(|| {
                Err(WebtaskError::internal("boom"))
            })),
        );
        registry.register(
            "panicking",
            Module::new().with_default(Export::factory(|| panic!("factory exploded"))),
        );
        let resolver = resolver(registry);

        let err = resolve(&resolver, "failing").await.err().expect("expected error");
        assert_eq!(err.kind(), ErrorKind::Resolution);

        let err = resolve(&resolver, "panicking").await.err().expect("expected error");
        assert_eq!(err.kind(), ErrorKind::Resolution);
        assert!(err.message().contains("panicked"));
    }

    #[test]
    fn test_builtin_registry() {
        let registry = ModuleRegistry::with_builtins(&EngineConfig::default());
        assert!(registry.contains("@webtask/bearer-auth-middleware"));
        assert!(registry.contains("@webtask/cron-auth-middleware"));
        assert!(registry.contains("@webtask/jwt-middleware"));
        assert!(registry.contains("@webtask/auth0-auth-middleware"));
        assert_eq!(registry.len(), 4);
    }
}

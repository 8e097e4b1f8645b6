//! Registration of the stock strategies.

use crate::module::Module;
use crate::resolver::ModuleRegistry;
use crate::stages::{
    Auth0AuthMiddleware, BearerAuthMiddleware, CronAuthMiddleware, JwtAuthMiddleware,
};
use webtask_config::EngineConfig;

/// Package name of the shared-secret strategy.
pub const BEARER_AUTH_MODULE: &str = "@webtask/bearer-auth-middleware";
/// Package name of the invocation-token strategy.
pub const CRON_AUTH_MODULE: &str = "@webtask/cron-auth-middleware";
/// Package name of the JWT scope strategy.
pub const JWT_MODULE: &str = "@webtask/jwt-middleware";
/// Package name of the Auth0 API strategy.
pub const AUTH0_MODULE: &str = "@webtask/auth0-auth-middleware";

/// Adds the stock strategies to `registry`.
///
/// Each pipeline slot naming one of these gets its own step instance, so
/// the JWT and Auth0 steps' settings and key caches are per slot.
pub fn register_builtins(registry: &mut ModuleRegistry, config: &EngineConfig) {
    let jwks = config.jwks.clone();
    let auth0_jwks = config.jwks.clone();

    registry
        .register(BEARER_AUTH_MODULE, Module::middleware(|| Ok(BearerAuthMiddleware::new())))
        .register(CRON_AUTH_MODULE, Module::middleware(|| Ok(CronAuthMiddleware::new())))
        .register(JWT_MODULE, Module::middleware(move || JwtAuthMiddleware::new(&jwks)))
        .register(
            AUTH0_MODULE,
            Module::middleware(move || Auth0AuthMiddleware::new(&auth0_jwks)),
        );
}

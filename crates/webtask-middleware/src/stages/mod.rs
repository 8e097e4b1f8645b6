//! Stock authorization steps.
//!
//! | Package | Step | Checks |
//! |---|---|---|
//! | `@webtask/bearer-auth-middleware` | [`BearerAuthMiddleware`] | bearer token equals the `wt-auth-secret` secret |
//! | `@webtask/cron-auth-middleware` | [`CronAuthMiddleware`] | bearer token equals the invocation's bound token |
//! | `@webtask/jwt-middleware` | [`JwtAuthMiddleware`] | signed JWT with a scope granting execution |
//! | `@webtask/auth0-auth-middleware` | [`Auth0AuthMiddleware`] | JWT issued by the Auth0 tenant for the API audience |

pub mod auth0;
pub mod bearer_auth;
pub mod cron_auth;
pub mod jwt;

pub use auth0::{Auth0AuthMiddleware, Auth0Config, Auth0Keys};
pub use bearer_auth::{bearer_token, BearerAuthMiddleware, AUTH_SECRET, UNAUTHENTICATED_MESSAGE};
pub use cron_auth::CronAuthMiddleware;
pub use jwt::{JwtAuthMiddleware, TokenVerifier, UNAUTHORIZED_MESSAGE};

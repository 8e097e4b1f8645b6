//! # Webtask Core
//!
//! Core types shared by every crate of the webtask middleware engine.
//!
//! This crate provides:
//!
//! - [`WebtaskError`] - the failure taxonomy of the pipeline and its auth
//!   strategies, with HTTP status mapping and allow-listed extra fields
//! - [`ErrorFields`] - the extra fields an error may forward to clients
//! - [`RequestId`] - time-ordered request identifiers (UUID v7)
//! - [`ScopeSet`] - normalized token scopes with exact-token matching
//!
//! ## Example
//!
//! ```
//! use webtask_core::{ScopeSet, WebtaskError};
//!
//! let scopes = ScopeSet::parse("wt:owner:acme read:logs");
//! assert!(scopes.permits(Some("acme"), None));
//!
//! let err = WebtaskError::authorization("UnauthorizedError");
//! assert_eq!(err.status_code().as_u16(), 403);
//! ```

#![doc(html_root_url = "https://docs.rs/webtask-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod error;
pub mod request_id;
pub mod scope;

pub use error::{ErrorFields, ErrorKind, WebtaskError, WebtaskResult};
pub use request_id::RequestId;
pub use scope::{owner_scope, ScopeSet, ADMIN_SCOPE};

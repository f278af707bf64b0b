//! Shared plumbing for the oidc-rp relying-party implementation: the HTTP
//! transport abstraction and session buckets.

#![warn(missing_docs)]
pub use smol_str;

pub mod error;
/// HTTP client abstraction used by oidc-rp crates.
pub mod http_client;
/// Server-side session buckets.
pub mod session;

pub use session::Session;

/// Boxed error type used at pluggable seams.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

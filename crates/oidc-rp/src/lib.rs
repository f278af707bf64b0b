//! OpenID Connect relying party for the authorization code flow.
//!
//! [`Strategy`] drives both halves of a login: it redirects the user agent to
//! the provider with a session-bound `state` (and optional `nonce`), then, on
//! the way back, exchanges the code, checks the ID token claims, optionally
//! fetches the UserInfo resource and hands the resulting [`Profile`] to the
//! application's [`Verify`] callback.
//!
//! Transport comes from [`oidc_rp_common::http_client::HttpClient`]; session
//! storage is whatever the host framework attaches to an [`AuthRequest`].

pub mod claims;
pub mod config;
pub mod error;
pub mod inbound;
pub mod profile;
pub mod request;
pub mod state;
pub mod strategy;
pub mod types;
pub mod utils;
pub mod validate;
pub mod verify;

pub use config::{Scope, StrategyConfig};
pub use error::{AuthError, ConfigError};
pub use inbound::{AuthRequest, RequestHead};
pub use profile::Profile;
pub use request::{OAuth2Client, TokenEndpointAuth, TokenExchange};
pub use state::{SessionStateStore, StateStore};
pub use strategy::{AuthenticateOptions, Outcome, Strategy};
pub use verify::{Info, LoadProfile, Verified, Verify, VerifyArgs, VerifyCall, VerifyShape};

use miette::Diagnostic;
use oidc_rp_common::BoxError;
use thiserror::Error;

use crate::{
    claims::ClaimsError, request::RequestError, state::StateStoreError,
    types::ProviderErrorBody,
};

/// Errors raised while constructing a [`Strategy`](crate::strategy::Strategy).
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    /// A mandatory option is absent or empty
    #[error("OpenID Connect strategy requires a {0} option")]
    #[diagnostic(
        code(oidc_rp::config::missing),
        help("issuer, authorization_url, token_url and client_id are mandatory")
    )]
    Missing(&'static str),
    /// An endpoint option is not an absolute URL
    #[error("{field} is not a valid absolute URL")]
    #[diagnostic(code(oidc_rp::config::url))]
    InvalidUrl {
        field: &'static str,
        #[source]
        source: url::ParseError,
    },
    /// The authorization URL has no host to derive a session key from
    #[error("authorization_url has no host")]
    #[diagnostic(
        code(oidc_rp::config::no_host),
        help("use an absolute http(s) URL or set session_key explicitly")
    )]
    NoHost,
    /// Configuration document could not be parsed
    #[error(transparent)]
    #[diagnostic(code(oidc_rp::config::json))]
    Json(#[from] serde_json::Error),
}

/// Error reported by the provider on the authorization redirect.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
#[diagnostic(
    code(oidc_rp::authorization),
    help("the provider refused the authorization request; see error_description")
)]
pub struct AuthorizationError(pub ProviderErrorBody);

impl std::fmt::Display for AuthorizationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "authorization error: {}", self.0)
    }
}

/// Error reported by the provider's token endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
#[diagnostic(
    code(oidc_rp::token),
    help("check client credentials, redirect_uri and that the code was not already used")
)]
pub struct TokenError(pub ProviderErrorBody);

impl std::fmt::Display for TokenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "token error: {}", self.0)
    }
}

/// Fatal errors from [`Strategy::authenticate`](crate::strategy::Strategy::authenticate).
///
/// Expected protocol violations (bad state, invalid ID token claims) are not
/// errors; they surface as [`Outcome::Failure`](crate::strategy::Outcome::Failure).
#[derive(Debug, Error, Diagnostic)]
pub enum AuthError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Authorization(#[from] AuthorizationError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Token(#[from] TokenError),

    #[error("failed to obtain access token")]
    #[diagnostic(code(oidc_rp::token_exchange))]
    TokenExchange(#[source] RequestError),

    #[error("state store error")]
    #[diagnostic(code(oidc_rp::state_store))]
    StateStore(#[from] StateStoreError),

    #[error("state store did not yield state for authentication")]
    #[diagnostic(
        code(oidc_rp::state_store::no_handle),
        help("custom state stores must return a handle from store()")
    )]
    NoStateHandle,

    #[error("ID token not present in token response")]
    #[diagnostic(code(oidc_rp::id_token::missing))]
    MissingIdToken,

    #[error("malformed ID token")]
    #[diagnostic(code(oidc_rp::id_token::malformed))]
    IdToken(#[from] ClaimsError),

    #[error("failed to fetch user profile")]
    #[diagnostic(code(oidc_rp::userinfo::fetch))]
    UserInfo(#[source] RequestError),

    #[error("failed to parse user profile")]
    #[diagnostic(code(oidc_rp::userinfo::parse))]
    UserInfoJson(#[source] serde_json::Error),

    #[error("user profile policy failed")]
    #[diagnostic(code(oidc_rp::userinfo::policy))]
    ProfilePolicy(#[source] BoxError),

    #[error("verify callback failed")]
    #[diagnostic(code(oidc_rp::verify))]
    Verify(#[source] BoxError),

    #[error("invalid callback URL")]
    #[diagnostic(
        code(oidc_rp::callback::url),
        help("relative callback URLs need a Host header on the request")
    )]
    CallbackUrl(#[from] url::ParseError),
}

pub type Result<T> = core::result::Result<T, AuthError>;

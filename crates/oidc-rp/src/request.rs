use std::future::Future;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use http::{Method, Request, StatusCode, header};
use oidc_rp_common::{BoxError, error::HttpError, http_client::HttpClient};
use percent_encoding::utf8_percent_encode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use smol_str::SmolStr;
use url::Url;

use crate::types::{
    ProviderErrorBody, QUERY_COMPONENT, TokenGrantType, TokenRequestParameters, TokenResponse,
};

/// Transport-level error from the token or UserInfo endpoint
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
#[error("{kind}")]
pub struct RequestError {
    #[diagnostic_source]
    kind: RequestErrorKind,
    #[source]
    source: Option<BoxError>,
    #[help]
    help: Option<SmolStr>,
    context: Option<SmolStr>,
    url: Option<SmolStr>,
}

/// Error categories for provider requests
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum RequestErrorKind {
    /// Provider answered with an RFC 6749 error body
    #[error("provider error: {0}")]
    #[diagnostic(
        code(oidc_rp::request::provider),
        help("the provider rejected the request; inspect `error` and `error_description`")
    )]
    Provider(ProviderErrorBody),

    /// Unexpected HTTP status without a structured error body
    #[error("http status: {0}")]
    #[diagnostic(
        code(oidc_rp::request::http_status),
        help("see server response for details")
    )]
    HttpStatus(StatusCode),

    /// The HTTP client failed to deliver the request
    #[error("transport error")]
    #[diagnostic(code(oidc_rp::request::transport))]
    Transport,

    /// Request could not be assembled
    #[error("http build error")]
    #[diagnostic(code(oidc_rp::request::http_build))]
    HttpBuild,

    /// Form serialization error
    #[error("form serialization error")]
    #[diagnostic(code(oidc_rp::request::serde_form))]
    SerdeHtmlForm,

    /// JSON error
    #[error("json error")]
    #[diagnostic(code(oidc_rp::request::serde_json))]
    SerdeJson,

    /// Token endpoint answered 2xx without an access token
    #[error("token response has no access_token")]
    #[diagnostic(code(oidc_rp::request::token_response))]
    TokenResponse,

    /// Response body is not UTF-8
    #[error("response body is not valid UTF-8")]
    #[diagnostic(code(oidc_rp::request::body))]
    Body,
}

impl RequestError {
    pub fn new(kind: RequestErrorKind, source: Option<BoxError>) -> Self {
        Self {
            kind,
            source,
            help: None,
            context: None,
            url: None,
        }
    }

    pub fn kind(&self) -> &RequestErrorKind {
        &self.kind
    }

    pub fn source_err(&self) -> Option<&BoxError> {
        self.source.as_ref()
    }

    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    /// The provider's error body, if the request failed with one.
    pub fn provider_error(&self) -> Option<&ProviderErrorBody> {
        match &self.kind {
            RequestErrorKind::Provider(body) => Some(body),
            _ => None,
        }
    }

    pub fn with_help(mut self, help: impl Into<SmolStr>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<SmolStr>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<SmolStr>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn provider(body: ProviderErrorBody) -> Self {
        Self::new(RequestErrorKind::Provider(body), None)
    }

    pub fn http_status(response: &http::Response<Vec<u8>>) -> Self {
        Self::new(
            RequestErrorKind::HttpStatus(response.status()),
            Some(Box::new(HttpError::from_response(response))),
        )
    }

    pub fn transport(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::new(RequestErrorKind::Transport, Some(Box::new(source)))
            .with_help("check connectivity to the provider")
    }

    pub fn token_response() -> Self {
        Self::new(RequestErrorKind::TokenResponse, None)
    }

    pub fn body(source: std::string::FromUtf8Error) -> Self {
        Self::new(RequestErrorKind::Body, Some(Box::new(source)))
    }
}

impl From<http::Error> for RequestError {
    fn from(e: http::Error) -> Self {
        let msg = smol_str::format_smolstr!("{:?}", e);
        Self::new(RequestErrorKind::HttpBuild, Some(Box::new(e)))
            .with_context(msg)
            .with_help("verify endpoint URLs and header values are valid")
    }
}

impl From<serde_html_form::ser::Error> for RequestError {
    fn from(e: serde_html_form::ser::Error) -> Self {
        let msg = smol_str::format_smolstr!("{:?}", e);
        Self::new(RequestErrorKind::SerdeHtmlForm, Some(Box::new(e)))
            .with_context(msg)
            .with_help("check token request parameters are serializable")
    }
}

impl From<serde_json::Error> for RequestError {
    fn from(e: serde_json::Error) -> Self {
        let msg = smol_str::format_smolstr!("{:?}", e);
        Self::new(RequestErrorKind::SerdeJson, Some(Box::new(e)))
            .with_context(msg)
            .with_help("verify the provider response body is valid JSON")
    }
}

pub type Result<T> = core::result::Result<T, RequestError>;

/// How the client authenticates itself to the token endpoint.
// https://openid.net/specs/openid-connect-core-1_0.html#ClientAuthentication
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TokenEndpointAuth {
    /// `client_id` and `client_secret` in the form body
    #[default]
    ClientSecretPost,
    /// HTTP Basic with the form-encoded credentials
    ClientSecretBasic,
}

/// The OAuth 2.0 calls a relying party makes after the redirect comes back.
#[cfg_attr(not(target_arch = "wasm32"), trait_variant::make(Send))]
pub trait TokenExchange {
    /// Redeem an authorization code at the token endpoint.
    fn exchange_code(
        &self,
        code: &str,
        redirect_uri: Option<&str>,
    ) -> impl Future<Output = Result<TokenResponse>>;

    /// GET a protected resource with the access token as a bearer credential,
    /// returning the raw body.
    fn get_resource(&self, url: &Url, access_token: &str) -> impl Future<Output = Result<String>>;
}

#[derive(Serialize)]
struct TokenRequestPayload<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    client_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    client_secret: Option<&'a str>,
    #[serde(flatten)]
    parameters: TokenRequestParameters,
}

/// Token endpoint client bound to one provider and one set of credentials.
#[derive(Clone)]
pub struct OAuth2Client<C> {
    http: C,
    token_url: Url,
    client_id: SmolStr,
    client_secret: Option<SmolStr>,
    auth: TokenEndpointAuth,
}

impl<C> std::fmt::Debug for OAuth2Client<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuth2Client")
            .field("token_url", &self.token_url.as_str())
            .field("client_id", &self.client_id)
            .field("auth", &self.auth)
            .finish_non_exhaustive()
    }
}

impl<C: HttpClient> OAuth2Client<C> {
    pub fn new(
        http: C,
        token_url: Url,
        client_id: impl Into<SmolStr>,
        client_secret: Option<SmolStr>,
        auth: TokenEndpointAuth,
    ) -> Self {
        Self {
            http,
            token_url,
            client_id: client_id.into(),
            client_secret,
            auth,
        }
    }

    pub fn http(&self) -> &C {
        &self.http
    }

    fn token_request(&self, parameters: TokenRequestParameters) -> Result<Request<Vec<u8>>> {
        let mut builder = Request::builder()
            .uri(self.token_url.as_str())
            .method(Method::POST)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(header::ACCEPT, "application/json");

        let payload = match (self.auth, &self.client_secret) {
            (TokenEndpointAuth::ClientSecretBasic, Some(secret)) => {
                // https://datatracker.ietf.org/doc/html/rfc6749#section-2.3.1
                let credentials = format!(
                    "{}:{}",
                    utf8_percent_encode(&self.client_id, QUERY_COMPONENT),
                    utf8_percent_encode(secret, QUERY_COMPONENT)
                );
                builder = builder.header(
                    header::AUTHORIZATION,
                    format!("Basic {}", STANDARD.encode(credentials)),
                );
                TokenRequestPayload {
                    client_id: None,
                    client_secret: None,
                    parameters,
                }
            }
            (_, secret) => TokenRequestPayload {
                client_id: Some(self.client_id.as_str()),
                client_secret: secret.as_deref(),
                parameters,
            },
        };

        let body = serde_html_form::to_string(payload)?;
        Ok(builder.body(body.into_bytes())?)
    }
}

fn provider_error(body: &[u8]) -> Option<ProviderErrorBody> {
    serde_json::from_slice(body).ok()
}

impl<C> TokenExchange for OAuth2Client<C>
where
    C: HttpClient + Sync,
{
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all, fields(url = %self.token_url)))]
    async fn exchange_code(&self, code: &str, redirect_uri: Option<&str>) -> Result<TokenResponse> {
        let req = self.token_request(TokenRequestParameters {
            grant_type: TokenGrantType::AuthorizationCode,
            code: code.into(),
            redirect_uri: redirect_uri.map(SmolStr::new),
        })?;
        let res = self
            .http
            .send_http(req)
            .await
            .map_err(|e| RequestError::transport(e).with_url(self.token_url.as_str()))?;

        if !res.status().is_success() {
            return Err(match provider_error(res.body()) {
                Some(body) => RequestError::provider(body),
                None => RequestError::http_status(&res),
            }
            .with_url(self.token_url.as_str()));
        }

        let params = match serde_json::from_slice::<Value>(res.body())? {
            Value::Object(params) => params,
            _ => return Err(RequestError::token_response()),
        };
        // Some providers report errors with a 200.
        if params.contains_key("error") {
            if let Some(body) = provider_error(res.body()) {
                return Err(RequestError::provider(body));
            }
        }
        TokenResponse::from_params(params).ok_or_else(RequestError::token_response)
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all, fields(url = %url)))]
    async fn get_resource(&self, url: &Url, access_token: &str) -> Result<String> {
        let req = Request::builder()
            .uri(url.as_str())
            .method(Method::GET)
            .header(header::AUTHORIZATION, format!("Bearer {access_token}"))
            .header(header::ACCEPT, "application/json")
            .body(Vec::new())?;
        let res = self
            .http
            .send_http(req)
            .await
            .map_err(|e| RequestError::transport(e).with_url(url.as_str()))?;

        if !res.status().is_success() {
            return Err(RequestError::http_status(&res).with_url(url.as_str()));
        }
        String::from_utf8(res.into_body()).map_err(RequestError::body)
    }
}

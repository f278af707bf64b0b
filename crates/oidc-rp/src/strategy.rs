//! The authorization code flow, from redirect to verified user.

use std::sync::Arc;

use bon::Builder;
use chrono::Utc;
use http::StatusCode;
use oidc_rp_common::http_client::HttpClient;
use serde_json::Value;
use smol_str::SmolStr;
use url::Url;

use crate::{
    claims::decode_id_token,
    config::{Endpoints, Scope, StrategyConfig},
    error::{AuthError, AuthorizationError, ConfigError, Result, TokenError},
    inbound::AuthRequest,
    profile::Profile,
    request::{OAuth2Client, RequestError, TokenExchange},
    state::{
        RequestContext, SessionStateStore, StateMetadata, StateStore, StateVerification,
    },
    types::{AuthorizationRequestParameters, CallbackParams, ProviderErrorBody},
    utils::generate_nonce,
    validate::{Expected, validate_id_token},
    verify::{Info, LoadProfile, Verified, Verify, VerifyArgs, VerifyCall, VerifyInput},
};

/// Per-call overrides of the configured authorization request.
#[derive(Debug, Clone, Default, Builder)]
#[builder(start_fn = new)]
pub struct AuthenticateOptions {
    #[builder(into)]
    pub callback_url: Option<String>,
    #[builder(into)]
    pub scope: Option<Scope>,
    /// Application state, handed back on success as `info.state`
    pub state: Option<Value>,
    #[builder(into)]
    pub prompt: Option<SmolStr>,
    #[builder(into)]
    pub display: Option<SmolStr>,
    #[builder(into)]
    pub ui_locales: Option<SmolStr>,
    #[builder(into)]
    pub login_hint: Option<SmolStr>,
    pub max_age: Option<u64>,
    #[builder(into)]
    pub acr_values: Option<SmolStr>,
    #[builder(into)]
    pub id_token_hint: Option<SmolStr>,
    pub nonce: Option<bool>,
    pub claims: Option<Value>,
}

/// Result of one [`Strategy::authenticate`] call.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<U> {
    /// Send the user agent here.
    Redirect(Url),
    Success { user: U, info: Info },
    /// The attempt was refused. `status` is set for protocol violations.
    Failure {
        info: Info,
        status: Option<StatusCode>,
    },
}

impl<U> Outcome<U> {
    fn forbidden(message: impl Into<SmolStr>) -> Self {
        Self::Failure {
            info: Info::message(message),
            status: Some(StatusCode::FORBIDDEN),
        }
    }
}

/// OpenID Connect relying party using the authorization code flow.
pub struct Strategy<T, U> {
    config: StrategyConfig,
    endpoints: Endpoints,
    exchange: T,
    state_store: Arc<dyn StateStore>,
    verify: Arc<dyn Verify<U>>,
    load_profile: LoadProfile,
}

impl<C, U> Strategy<OAuth2Client<C>, U>
where
    C: HttpClient + Sync,
{
    /// Validate `config` and bind a token client to its endpoints.
    pub fn new(
        config: StrategyConfig,
        http: C,
        verify: impl Verify<U> + 'static,
    ) -> core::result::Result<Self, ConfigError> {
        let endpoints = config.validate()?;
        let exchange = OAuth2Client::new(
            http,
            endpoints.token.clone(),
            config.client_id.as_str(),
            config.client_secret.clone(),
            config.token_endpoint_auth,
        );
        Ok(Self::assemble(config, endpoints, exchange, Arc::new(verify)))
    }
}

impl<T, U> Strategy<T, U>
where
    T: TokenExchange,
{
    /// Like [`new`](Strategy::new), with a caller-supplied token client.
    pub fn with_exchange(
        config: StrategyConfig,
        exchange: T,
        verify: impl Verify<U> + 'static,
    ) -> core::result::Result<Self, ConfigError> {
        let endpoints = config.validate()?;
        Ok(Self::assemble(config, endpoints, exchange, Arc::new(verify)))
    }

    fn assemble(
        config: StrategyConfig,
        endpoints: Endpoints,
        exchange: T,
        verify: Arc<dyn Verify<U>>,
    ) -> Self {
        let state_store = Arc::new(SessionStateStore::new(config.session_key()));
        let load_profile = LoadProfile::from(!config.skip_user_profile);
        Self {
            config,
            endpoints,
            exchange,
            state_store,
            verify,
            load_profile,
        }
    }

    /// Replace the session-backed state store.
    pub fn with_state_store(mut self, store: impl StateStore + 'static) -> Self {
        self.state_store = Arc::new(store);
        self
    }

    pub fn with_load_profile(mut self, policy: impl Into<LoadProfile>) -> Self {
        self.load_profile = policy.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    pub fn exchange(&self) -> &T {
        &self.exchange
    }

    /// Drive one step of the flow.
    ///
    /// Without a `code` in the query this starts a new attempt and returns
    /// [`Outcome::Redirect`]; with one it completes the attempt. Session
    /// changes are made on `request` and must be persisted by the caller.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all, fields(strategy = %self.config.name)))]
    pub async fn authenticate(
        &self,
        request: &mut AuthRequest,
        options: &AuthenticateOptions,
    ) -> Result<Outcome<U>> {
        let params = CallbackParams::from_query(request.query());

        if let Some(error) = params.error {
            if error == "access_denied" {
                #[cfg(feature = "tracing")]
                tracing::debug!("user denied authorization");
                return Ok(Outcome::Failure {
                    info: Info {
                        message: params.error_description,
                        ..Default::default()
                    },
                    status: None,
                });
            }
            return Err(AuthorizationError(ProviderErrorBody {
                error,
                error_description: params.error_description,
                error_uri: params.error_uri,
            })
            .into());
        }

        let callback_url = self.callback_url(request, options)?;

        match params.code {
            Some(code) => {
                let handle = params.state.unwrap_or_default();
                self.complete(request, &code, &handle, callback_url).await
            }
            None => self.initiate(request, options, callback_url).await,
        }
    }

    fn callback_url(
        &self,
        request: &AuthRequest,
        options: &AuthenticateOptions,
    ) -> Result<Option<Url>> {
        let Some(callback) = options
            .callback_url
            .as_deref()
            .or(self.config.callback_url.as_deref())
        else {
            return Ok(None);
        };
        match Url::parse(callback) {
            Ok(url) => Ok(Some(url)),
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let base = request.original_url(self.config.trust_proxy)?;
                Ok(Some(base.join(callback)?))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn initiate(
        &self,
        request: &mut AuthRequest,
        options: &AuthenticateOptions,
        callback_url: Option<Url>,
    ) -> Result<Outcome<U>> {
        let config = &self.config;
        let scope = Scope::with_openid(options.scope.as_ref().or(config.scope.as_ref()));
        let pick = |call: &Option<SmolStr>, configured: &Option<SmolStr>| {
            call.clone().or_else(|| configured.clone())
        };

        let mut params = AuthorizationRequestParameters::new(config.client_id.as_str(), scope);
        params.response_mode = config.response_mode.clone();
        params.redirect_uri = callback_url.as_ref().map(|url| SmolStr::new(url.as_str()));
        params.prompt = pick(&options.prompt, &config.prompt);
        params.display = pick(&options.display, &config.display);
        params.ui_locales = pick(&options.ui_locales, &config.ui_locales);
        params.login_hint = pick(&options.login_hint, &config.login_hint);
        params.max_age = options.max_age.or(config.max_age);
        params.acr_values = pick(&options.acr_values, &config.acr_values);
        params.id_token_hint = pick(&options.id_token_hint, &config.id_token_hint);
        if options.nonce.unwrap_or(config.nonce) {
            params.nonce = Some(generate_nonce());
        }
        params.claims = options
            .claims
            .as_ref()
            .or(config.claims.as_ref())
            .map(Value::to_string);

        let context = RequestContext {
            max_age: params.max_age,
            nonce: params.nonce.clone(),
            issued: params.max_age.map(|_| Utc::now()),
        };
        let meta = StateMetadata {
            issuer: config.issuer.as_str().into(),
            authorization_url: self.endpoints.authorization.clone(),
            token_url: self.endpoints.token.clone(),
            client_id: config.client_id.as_str().into(),
            callback_url,
            params: params.clone(),
        };

        let handle = self
            .state_store
            .store(request, &context, options.state.as_ref(), &meta)
            .await?
            .ok_or(AuthError::NoStateHandle)?;
        params.state = Some(handle);

        #[cfg(feature = "tracing")]
        tracing::debug!(scope = %params.scope, nonce = params.nonce.is_some(), "redirecting to provider");
        Ok(Outcome::Redirect(params.to_url(&self.endpoints.authorization)))
    }

    async fn complete(
        &self,
        request: &mut AuthRequest,
        code: &str,
        handle: &str,
        callback_url: Option<Url>,
    ) -> Result<Outcome<U>> {
        let (context, app_state) = match self.state_store.verify(request, handle).await? {
            StateVerification::Verified { context, state } => (context, state),
            StateVerification::Rejected { message } => {
                #[cfg(feature = "tracing")]
                tracing::warn!("state verification failed: {}", message);
                return Ok(Outcome::forbidden(message));
            }
        };

        let tokens = self
            .exchange
            .exchange_code(code, callback_url.as_ref().map(Url::as_str))
            .await
            .map_err(token_error)?;
        let id_token = tokens.id_token.clone().ok_or(AuthError::MissingIdToken)?;
        let claims = decode_id_token(&id_token)?;

        let expected = Expected {
            issuer: &self.config.issuer,
            client_id: &self.config.client_id,
        };
        if let Err(failure) = validate_id_token(&claims, expected, &context, Utc::now()) {
            #[cfg(feature = "tracing")]
            tracing::warn!("ID token rejected: {}", failure);
            return Ok(Outcome::forbidden(failure.to_string()));
        }

        let id_token_profile = Profile::from_claims(&claims.to_json());
        let mut profile = id_token_profile.clone();
        if let Some(user_info_url) = &self.endpoints.user_info {
            let load = self
                .load_profile
                .resolve(&request.request_head(), &claims)
                .await
                .map_err(AuthError::ProfilePolicy)?;
            if load {
                let body = self
                    .exchange
                    .get_resource(user_info_url, &tokens.access_token)
                    .await
                    .map_err(AuthError::UserInfo)?;
                let userinfo = Profile::from_userinfo(&body).map_err(AuthError::UserInfoJson)?;
                // https://openid.net/specs/openid-connect-core-1_0.html#UserInfoResponse
                if userinfo.id.as_ref().is_some_and(|sub| *sub != claims.sub) {
                    #[cfg(feature = "tracing")]
                    tracing::warn!("UserInfo subject does not match ID token");
                    return Ok(Outcome::forbidden(
                        "UserInfo subject does not match ID token",
                    ));
                }
                profile = profile.merge(userinfo);
            }
        }

        let input = VerifyInput {
            issuer: claims.iss.clone(),
            profile,
            id_token_profile,
            context: claims.auth_context(),
            id_token,
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            params: tokens.params,
        };
        let call = VerifyCall {
            request: self.config.pass_request.then(|| request.request_head()),
            args: VerifyArgs::build(self.config.verify_shape, input),
        };

        match self.verify.verify(call).await.map_err(AuthError::Verify)? {
            Verified::Accept { user, mut info } => {
                if app_state.is_some() {
                    info.state = app_state;
                }
                #[cfg(feature = "tracing")]
                tracing::debug!(sub = %claims.sub, "authentication succeeded");
                Ok(Outcome::Success { user, info })
            }
            Verified::Reject { info } => Ok(Outcome::Failure { info, status: None }),
        }
    }
}

fn token_error(err: RequestError) -> AuthError {
    match err.provider_error() {
        Some(body) => TokenError(body.clone()).into(),
        None => AuthError::TokenExchange(err),
    }
}

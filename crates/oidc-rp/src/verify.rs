//! The application callback that turns a verified identity into a user.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use oidc_rp_common::BoxError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use smol_str::SmolStr;

use crate::{
    claims::{AuthContext, IdTokenClaims},
    inbound::RequestHead,
    profile::Profile,
};

/// Which arguments the verify callback is handed.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VerifyShape {
    Minimal,
    WithContext,
    WithIdToken,
    WithTokens,
    #[default]
    Full,
}

/// Arguments for one verify invocation, one variant per [`VerifyShape`].
///
/// Outside of `Full`, `profile` is the ID token profile merged with the
/// UserInfo response.
#[derive(Debug, Clone)]
pub enum VerifyArgs {
    Minimal {
        issuer: SmolStr,
        profile: Profile,
    },
    WithContext {
        issuer: SmolStr,
        profile: Profile,
        context: AuthContext,
    },
    WithIdToken {
        issuer: SmolStr,
        profile: Profile,
        context: AuthContext,
        id_token: SmolStr,
    },
    WithTokens {
        issuer: SmolStr,
        profile: Profile,
        context: AuthContext,
        id_token: SmolStr,
        access_token: SmolStr,
        refresh_token: Option<SmolStr>,
    },
    Full {
        issuer: SmolStr,
        /// Merged profile, carrying `_raw`/`_json` when UserInfo was fetched
        profile: Profile,
        /// Profile built from the ID token claims alone
        id_token_profile: Profile,
        context: AuthContext,
        id_token: SmolStr,
        access_token: SmolStr,
        refresh_token: Option<SmolStr>,
        /// Token endpoint response, verbatim
        params: Map<String, Value>,
    },
}

/// Everything the verify step needs to build [`VerifyArgs`].
#[derive(Debug, Clone)]
pub(crate) struct VerifyInput {
    pub issuer: SmolStr,
    pub profile: Profile,
    pub id_token_profile: Profile,
    pub context: AuthContext,
    pub id_token: SmolStr,
    pub access_token: SmolStr,
    pub refresh_token: Option<SmolStr>,
    pub params: Map<String, Value>,
}

impl VerifyArgs {
    pub(crate) fn build(shape: VerifyShape, input: VerifyInput) -> Self {
        let VerifyInput {
            issuer,
            profile,
            id_token_profile,
            context,
            id_token,
            access_token,
            refresh_token,
            params,
        } = input;
        match shape {
            VerifyShape::Minimal => Self::Minimal { issuer, profile },
            VerifyShape::WithContext => Self::WithContext {
                issuer,
                profile,
                context,
            },
            VerifyShape::WithIdToken => Self::WithIdToken {
                issuer,
                profile,
                context,
                id_token,
            },
            VerifyShape::WithTokens => Self::WithTokens {
                issuer,
                profile,
                context,
                id_token,
                access_token,
                refresh_token,
            },
            VerifyShape::Full => Self::Full {
                issuer,
                profile,
                id_token_profile,
                context,
                id_token,
                access_token,
                refresh_token,
                params,
            },
        }
    }

    pub fn shape(&self) -> VerifyShape {
        match self {
            Self::Minimal { .. } => VerifyShape::Minimal,
            Self::WithContext { .. } => VerifyShape::WithContext,
            Self::WithIdToken { .. } => VerifyShape::WithIdToken,
            Self::WithTokens { .. } => VerifyShape::WithTokens,
            Self::Full { .. } => VerifyShape::Full,
        }
    }

    pub fn issuer(&self) -> &str {
        match self {
            Self::Minimal { issuer, .. }
            | Self::WithContext { issuer, .. }
            | Self::WithIdToken { issuer, .. }
            | Self::WithTokens { issuer, .. }
            | Self::Full { issuer, .. } => issuer,
        }
    }

    pub fn profile(&self) -> &Profile {
        match self {
            Self::Minimal { profile, .. }
            | Self::WithContext { profile, .. }
            | Self::WithIdToken { profile, .. }
            | Self::WithTokens { profile, .. }
            | Self::Full { profile, .. } => profile,
        }
    }
}

/// One call into the verify callback.
#[derive(Debug, Clone)]
pub struct VerifyCall {
    /// Present only when the strategy is configured with `pass_request`
    pub request: Option<RequestHead>,
    pub args: VerifyArgs,
}

/// Extra information attached to a success or failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Info {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<SmolStr>,
    /// Application state supplied when the attempt started
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Info {
    pub fn message(message: impl Into<SmolStr>) -> Self {
        Self {
            message: Some(message.into()),
            ..Default::default()
        }
    }
}

/// What the verify callback decided.
#[derive(Debug, Clone, PartialEq)]
pub enum Verified<U> {
    Accept { user: U, info: Info },
    /// No user for this identity; the attempt ends as a login failure.
    Reject { info: Info },
}

impl<U> Verified<U> {
    pub fn accept(user: U) -> Self {
        Self::Accept {
            user,
            info: Info::default(),
        }
    }

    pub fn reject(message: impl Into<SmolStr>) -> Self {
        Self::Reject {
            info: Info::message(message),
        }
    }
}

/// Application hook mapping a verified identity to a local user.
///
/// Implemented for any `Fn(VerifyCall) -> impl Future<Output = Result<Verified<U>, BoxError>>`.
#[async_trait]
pub trait Verify<U>: Send + Sync {
    async fn verify(&self, call: VerifyCall) -> Result<Verified<U>, BoxError>;
}

#[async_trait]
impl<U, F, Fut> Verify<U> for F
where
    F: Fn(VerifyCall) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Verified<U>, BoxError>> + Send + 'static,
    U: Send + 'static,
{
    async fn verify(&self, call: VerifyCall) -> Result<Verified<U>, BoxError> {
        (self)(call).await
    }
}

/// Asynchronous decision on whether to fetch the UserInfo resource.
#[async_trait]
pub trait ProfilePredicate: Send + Sync {
    async fn should_load(
        &self,
        request: &RequestHead,
        claims: &IdTokenClaims,
    ) -> Result<bool, BoxError>;
}

type SyncPredicate = dyn Fn(&RequestHead, &IdTokenClaims) -> bool + Send + Sync;

/// Policy for fetching the UserInfo resource after the ID token checks out.
///
/// Irrelevant when no UserInfo endpoint is configured: it is never called.
#[derive(Clone, Default)]
pub enum LoadProfile {
    #[default]
    Always,
    Never,
    Predicate(Arc<SyncPredicate>),
    Async(Arc<dyn ProfilePredicate>),
}

impl LoadProfile {
    pub fn predicate(
        f: impl Fn(&RequestHead, &IdTokenClaims) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self::Predicate(Arc::new(f))
    }

    pub fn with_async(predicate: impl ProfilePredicate + 'static) -> Self {
        Self::Async(Arc::new(predicate))
    }

    pub async fn resolve(
        &self,
        request: &RequestHead,
        claims: &IdTokenClaims,
    ) -> Result<bool, BoxError> {
        match self {
            Self::Always => Ok(true),
            Self::Never => Ok(false),
            Self::Predicate(f) => Ok(f(request, claims)),
            Self::Async(predicate) => predicate.should_load(request, claims).await,
        }
    }
}

impl From<bool> for LoadProfile {
    fn from(load: bool) -> Self {
        if load { Self::Always } else { Self::Never }
    }
}

impl std::fmt::Debug for LoadProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Always => f.write_str("Always"),
            Self::Never => f.write_str("Never"),
            Self::Predicate(_) => f.write_str("Predicate(..)"),
            Self::Async(_) => f.write_str("Async(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn input() -> VerifyInput {
        VerifyInput {
            issuer: "https://op.example".into(),
            profile: Profile::from_claims(&json!({"sub": "1234", "name": "john"})),
            id_token_profile: Profile::from_claims(&json!({"sub": "1234"})),
            context: AuthContext::default(),
            id_token: "a.b.c".into(),
            access_token: "at".into(),
            refresh_token: None,
            params: Map::new(),
        }
    }

    fn head() -> RequestHead {
        RequestHead {
            method: http::Method::GET,
            uri: "/cb".parse().unwrap(),
            headers: http::HeaderMap::new(),
        }
    }

    #[test]
    fn build_follows_shape() {
        for shape in [
            VerifyShape::Minimal,
            VerifyShape::WithContext,
            VerifyShape::WithIdToken,
            VerifyShape::WithTokens,
            VerifyShape::Full,
        ] {
            let args = VerifyArgs::build(shape, input());
            assert_eq!(args.shape(), shape);
            assert_eq!(args.issuer(), "https://op.example");
            assert_eq!(args.profile().display_name.as_deref(), Some("john"));
        }
    }

    #[test]
    fn shape_from_config_names() {
        let shape: VerifyShape = serde_json::from_value(json!("with_tokens")).unwrap();
        assert_eq!(shape, VerifyShape::WithTokens);
        assert_eq!(VerifyShape::default(), VerifyShape::Full);
    }

    #[test]
    fn info_flattens_extra() {
        let mut info = Info::message("welcome");
        info.extra.insert("scope".into(), json!("read"));
        assert_eq!(
            serde_json::to_value(&info).unwrap(),
            json!({"message": "welcome", "scope": "read"})
        );
    }

    #[tokio::test]
    async fn closures_are_verifiers() {
        let verify = |call: VerifyCall| async move {
            Ok::<_, BoxError>(Verified::accept(call.args.profile().id.clone()))
        };
        let call = VerifyCall {
            request: None,
            args: VerifyArgs::build(VerifyShape::Minimal, input()),
        };
        let verified = Verify::verify(&verify, call).await.unwrap();
        assert_eq!(verified, Verified::accept(Some("1234".into())));
    }

    struct OnlyWithoutEmail;

    #[async_trait]
    impl ProfilePredicate for OnlyWithoutEmail {
        async fn should_load(
            &self,
            _request: &RequestHead,
            claims: &IdTokenClaims,
        ) -> Result<bool, BoxError> {
            Ok(!claims.other.contains_key("email"))
        }
    }

    #[tokio::test]
    async fn load_profile_policies() {
        let claims = IdTokenClaims::from_json(json!({
            "iss": "i", "sub": "s", "aud": "a", "exp": 1, "iat": 1, "email": "e@x"
        }))
        .unwrap();
        let head = head();

        assert!(LoadProfile::default().resolve(&head, &claims).await.unwrap());
        assert!(!LoadProfile::from(false).resolve(&head, &claims).await.unwrap());
        let by_sub = LoadProfile::predicate(|_, claims| claims.sub == "s");
        assert!(by_sub.resolve(&head, &claims).await.unwrap());
        let by_email = LoadProfile::with_async(OnlyWithoutEmail);
        assert!(!by_email.resolve(&head, &claims).await.unwrap());
    }
}

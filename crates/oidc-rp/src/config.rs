use bon::Builder;
use serde::Deserialize;
use serde_json::Value;
use smol_str::{SmolStr, format_smolstr};
use url::Url;

use crate::{error::ConfigError, request::TokenEndpointAuth, verify::VerifyShape};

pub const DEFAULT_NAME: &str = "openidconnect";
const OPENID_SCOPE: &str = "openid";

/// Requested scope: one space-separated string or a list of values.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum Scope {
    One(SmolStr),
    Many(Vec<SmolStr>),
}

impl Scope {
    /// The `scope` parameter: `openid` first, then the requested values in
    /// order. A requested `openid` is not repeated.
    pub fn with_openid(scope: Option<&Scope>) -> SmolStr {
        let mut values = vec![OPENID_SCOPE];
        match scope {
            Some(Scope::One(s)) => values.extend(s.split_whitespace()),
            Some(Scope::Many(v)) => values.extend(v.iter().flat_map(|s| s.split_whitespace())),
            None => {}
        }
        let mut seen_openid = false;
        values.retain(|value| {
            let first = *value != OPENID_SCOPE || !seen_openid;
            seen_openid |= *value == OPENID_SCOPE;
            first
        });
        values.join(" ").into()
    }
}

impl From<&str> for Scope {
    fn from(scope: &str) -> Self {
        Self::One(scope.into())
    }
}

impl<S: Into<SmolStr>> From<Vec<S>> for Scope {
    fn from(scope: Vec<S>) -> Self {
        Self::Many(scope.into_iter().map(Into::into).collect())
    }
}

/// Strategy configuration.
///
/// Every option has a fixed meaning and default. Field names follow Rust
/// conventions; the camelCase spellings used by other OpenID Connect client
/// libraries are accepted as aliases when deserializing.
#[derive(Deserialize, Debug, Clone, Builder)]
#[builder(start_fn = new)]
pub struct StrategyConfig {
    /// Strategy name, used in the default session key
    #[serde(default = "default_name")]
    #[builder(into, default = SmolStr::new_static(DEFAULT_NAME))]
    pub name: SmolStr,
    /// Expected `iss` of every ID token
    #[serde(default)]
    #[builder(into)]
    pub issuer: String,
    #[serde(default, alias = "authorizationURL")]
    #[builder(into)]
    pub authorization_url: String,
    #[serde(default, alias = "tokenURL")]
    #[builder(into)]
    pub token_url: String,
    /// UserInfo endpoint; without one the profile comes from the ID token only
    #[serde(alias = "userInfoURL")]
    #[builder(into)]
    pub user_info_url: Option<String>,
    #[serde(default, alias = "clientID")]
    #[builder(into)]
    pub client_id: String,
    #[serde(alias = "clientSecret")]
    #[builder(into)]
    pub client_secret: Option<SmolStr>,
    #[serde(default)]
    #[builder(default)]
    pub token_endpoint_auth: TokenEndpointAuth,
    /// Default redirect URI; relative values resolve against the request URL
    #[serde(alias = "callbackURL")]
    #[builder(into)]
    pub callback_url: Option<String>,
    #[builder(into)]
    pub scope: Option<Scope>,
    #[serde(alias = "responseMode")]
    #[builder(into)]
    pub response_mode: Option<SmolStr>,
    #[builder(into)]
    pub prompt: Option<SmolStr>,
    #[builder(into)]
    pub display: Option<SmolStr>,
    #[serde(alias = "uiLocales")]
    #[builder(into)]
    pub ui_locales: Option<SmolStr>,
    #[serde(alias = "loginHint")]
    #[builder(into)]
    pub login_hint: Option<SmolStr>,
    /// Maximum authentication age in seconds
    #[serde(alias = "maxAge")]
    pub max_age: Option<u64>,
    #[serde(alias = "acrValues")]
    #[builder(into)]
    pub acr_values: Option<SmolStr>,
    #[serde(alias = "idTokenHint")]
    #[builder(into)]
    pub id_token_hint: Option<SmolStr>,
    /// Send a fresh `nonce` with every authorization request
    #[serde(default)]
    #[builder(default)]
    pub nonce: bool,
    /// Claims request object, serialized into the `claims` parameter
    pub claims: Option<Value>,
    /// Session bucket for the default state store
    #[serde(alias = "sessionKey")]
    #[builder(into)]
    pub session_key: Option<SmolStr>,
    /// Hand the request head to the verify callback
    #[serde(default, alias = "passReqToCallback")]
    #[builder(default)]
    pub pass_request: bool,
    /// Trust `X-Forwarded-Proto` and `X-Forwarded-Host`
    #[serde(default, alias = "proxy")]
    #[builder(default)]
    pub trust_proxy: bool,
    #[serde(default)]
    #[builder(default)]
    pub verify_shape: VerifyShape,
    /// Never fetch UserInfo; the profile comes from the ID token only.
    /// A predicate set with `Strategy::with_load_profile` takes over from this.
    #[serde(default, alias = "skipUserProfile")]
    #[builder(default)]
    pub skip_user_profile: bool,
}

fn default_name() -> SmolStr {
    SmolStr::new_static(DEFAULT_NAME)
}

/// Endpoint URLs parsed out of a validated configuration.
#[derive(Debug, Clone)]
pub(crate) struct Endpoints {
    pub authorization: Url,
    pub token: Url,
    pub user_info: Option<Url>,
}

fn parse_endpoint(field: &'static str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(value).map_err(|source| ConfigError::InvalidUrl { field, source })
}

impl StrategyConfig {
    /// Parse a JSON document and validate it.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub(crate) fn validate(&self) -> Result<Endpoints, ConfigError> {
        for (field, value) in [
            ("issuer", &self.issuer),
            ("authorization_url", &self.authorization_url),
            ("token_url", &self.token_url),
            ("client_id", &self.client_id),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Missing(field));
            }
        }

        let authorization = parse_endpoint("authorization_url", &self.authorization_url)?;
        let token = parse_endpoint("token_url", &self.token_url)?;
        let user_info = self
            .user_info_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .map(|url| parse_endpoint("user_info_url", url))
            .transpose()?;

        if self.session_key.is_none() && authorization.host_str().is_none() {
            return Err(ConfigError::NoHost);
        }

        Ok(Endpoints {
            authorization,
            token,
            user_info,
        })
    }

    /// Session bucket used by the default state store.
    pub fn session_key(&self) -> SmolStr {
        if let Some(key) = &self.session_key {
            return key.clone();
        }
        let host = Url::parse(&self.authorization_url)
            .ok()
            .and_then(|url| url.host_str().map(SmolStr::new))
            .unwrap_or_default();
        format_smolstr!("{}:{}", self.name, host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> StrategyConfig {
        StrategyConfig::new()
            .issuer("https://op.example")
            .authorization_url("https://op.example/authorize")
            .token_url("https://op.example/token")
            .client_id("client")
            .build()
    }

    #[test]
    fn builder_defaults() {
        let config = config();
        assert_eq!(config.name, "openidconnect");
        assert!(!config.nonce);
        assert!(!config.pass_request);
        assert!(!config.trust_proxy);
        assert!(!config.skip_user_profile);
        assert_eq!(config.verify_shape, VerifyShape::Full);
        assert_eq!(config.token_endpoint_auth, TokenEndpointAuth::ClientSecretPost);
        assert!(config.validate().is_ok());
        assert_eq!(config.session_key(), "openidconnect:op.example");
    }

    #[test]
    fn each_mandatory_field_is_checked() {
        let mut c = config();
        c.issuer.clear();
        assert!(matches!(c.validate(), Err(ConfigError::Missing("issuer"))));

        let mut c = config();
        c.authorization_url.clear();
        assert!(matches!(
            c.validate(),
            Err(ConfigError::Missing("authorization_url"))
        ));

        let mut c = config();
        c.token_url = "  ".into();
        assert!(matches!(c.validate(), Err(ConfigError::Missing("token_url"))));

        let mut c = config();
        c.client_id.clear();
        assert!(matches!(c.validate(), Err(ConfigError::Missing("client_id"))));
    }

    #[test]
    fn endpoints_must_be_absolute() {
        let mut c = config();
        c.token_url = "/token".into();
        assert!(matches!(
            c.validate(),
            Err(ConfigError::InvalidUrl {
                field: "token_url",
                ..
            })
        ));

        let mut c = config();
        c.user_info_url = Some("not a url".into());
        assert!(matches!(
            c.validate(),
            Err(ConfigError::InvalidUrl {
                field: "user_info_url",
                ..
            })
        ));
    }

    #[test]
    fn hostless_authorization_url_needs_session_key() {
        let mut c = config();
        c.authorization_url = "urn:example:authorize".into();
        assert!(matches!(c.validate(), Err(ConfigError::NoHost)));
        c.session_key = Some("custom".into());
        assert!(c.validate().is_ok());
        assert_eq!(c.session_key(), "custom");
    }

    #[test]
    fn from_json_accepts_aliases() {
        let config = StrategyConfig::from_json(
            r#"{
                "name": "corp",
                "issuer": "https://op.example",
                "authorizationURL": "https://op.example/authorize",
                "tokenURL": "https://op.example/token",
                "userInfoURL": "https://op.example/userinfo",
                "clientID": "client",
                "clientSecret": "secret",
                "scope": ["profile", "email"],
                "maxAge": 60,
                "nonce": true,
                "verify_shape": "minimal",
                "token_endpoint_auth": "client_secret_basic",
                "skipUserProfile": true
            }"#,
        )
        .unwrap();
        assert_eq!(config.session_key(), "corp:op.example");
        assert_eq!(config.max_age, Some(60));
        assert_eq!(config.verify_shape, VerifyShape::Minimal);
        assert_eq!(
            config.token_endpoint_auth,
            TokenEndpointAuth::ClientSecretBasic
        );
        assert_eq!(config.scope, Some(Scope::from(vec!["profile", "email"])));
        assert!(config.skip_user_profile);
    }

    #[test]
    fn from_json_reports_missing_fields() {
        let err = StrategyConfig::from_json(r#"{"issuer": "https://op.example"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("authorization_url")));
        assert!(matches!(
            StrategyConfig::from_json("{"),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn scope_composition() {
        let expected = "openid profile email";
        assert_eq!(Scope::with_openid(Some(&"profile email".into())), expected);
        assert_eq!(
            Scope::with_openid(Some(&vec!["profile", "email"].into())),
            expected
        );
        assert_eq!(
            Scope::with_openid(Some(&"openid profile email".into())),
            expected
        );
        assert_eq!(Scope::with_openid(None), "openid");
        assert_eq!(Scope::with_openid(Some(&"".into())), "openid");
    }
}

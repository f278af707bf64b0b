use std::borrow::Cow;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use url::Url;

// Same set as ECMAScript encodeURIComponent: a space becomes `%20`, never `+`.
pub(crate) const QUERY_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationResponseType {
    Code,
}

impl AuthorizationResponseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Code => "code",
        }
    }
}

/// Parameters of the authorization request, serialized in wire order.
// https://openid.net/specs/openid-connect-core-1_0.html#AuthRequest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRequestParameters {
    pub response_type: AuthorizationResponseType,
    pub response_mode: Option<SmolStr>,
    pub client_id: SmolStr,
    pub redirect_uri: Option<SmolStr>,
    pub scope: SmolStr,
    pub prompt: Option<SmolStr>,
    pub display: Option<SmolStr>,
    pub ui_locales: Option<SmolStr>,
    pub login_hint: Option<SmolStr>,
    pub max_age: Option<u64>,
    pub acr_values: Option<SmolStr>,
    pub id_token_hint: Option<SmolStr>,
    pub nonce: Option<SmolStr>,
    /// JSON-serialized claims request object
    pub claims: Option<String>,
    pub state: Option<SmolStr>,
}

impl AuthorizationRequestParameters {
    pub fn new(client_id: impl Into<SmolStr>, scope: impl Into<SmolStr>) -> Self {
        Self {
            response_type: AuthorizationResponseType::Code,
            response_mode: None,
            client_id: client_id.into(),
            redirect_uri: None,
            scope: scope.into(),
            prompt: None,
            display: None,
            ui_locales: None,
            login_hint: None,
            max_age: None,
            acr_values: None,
            id_token_hint: None,
            nonce: None,
            claims: None,
            state: None,
        }
    }

    /// Name/value pairs of every parameter that is set.
    pub fn pairs(&self) -> Vec<(&'static str, Cow<'_, str>)> {
        fn borrowed(value: &Option<SmolStr>) -> Option<Cow<'_, str>> {
            value.as_deref().map(Cow::Borrowed)
        }
        let fields = [
            ("response_type", Some(Cow::Borrowed(self.response_type.as_str()))),
            ("response_mode", borrowed(&self.response_mode)),
            ("client_id", Some(Cow::Borrowed(self.client_id.as_str()))),
            ("redirect_uri", borrowed(&self.redirect_uri)),
            ("scope", Some(Cow::Borrowed(self.scope.as_str()))),
            ("prompt", borrowed(&self.prompt)),
            ("display", borrowed(&self.display)),
            ("ui_locales", borrowed(&self.ui_locales)),
            ("login_hint", borrowed(&self.login_hint)),
            ("max_age", self.max_age.map(|v| Cow::Owned(v.to_string()))),
            ("acr_values", borrowed(&self.acr_values)),
            ("id_token_hint", borrowed(&self.id_token_hint)),
            ("nonce", borrowed(&self.nonce)),
            ("claims", self.claims.as_deref().map(Cow::Borrowed)),
            ("state", borrowed(&self.state)),
        ];
        fields
            .into_iter()
            .filter_map(|(name, value)| value.map(|value| (name, value)))
            .collect()
    }

    /// Append these parameters to `endpoint`'s query string.
    ///
    /// Parameters already present on the endpoint are kept unless this request
    /// sets a parameter of the same name.
    pub fn to_url(&self, endpoint: &Url) -> Url {
        let pairs = self.pairs();
        let mut url = endpoint.clone();
        let existing: Vec<(String, String)> = endpoint
            .query_pairs()
            .filter(|(k, _)| !pairs.iter().any(|(name, _)| *name == k.as_ref()))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        let query = existing
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .chain(pairs.iter().map(|(k, v)| (*k, v.as_ref())))
            .map(|(k, v)| {
                format!(
                    "{}={}",
                    utf8_percent_encode(k, QUERY_COMPONENT),
                    utf8_percent_encode(v, QUERY_COMPONENT)
                )
            })
            .collect::<Vec<_>>()
            .join("&");
        url.set_query(Some(&query));
        url
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TokenGrantType {
    AuthorizationCode,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TokenRequestParameters {
    // https://datatracker.ietf.org/doc/html/rfc6749#section-4.1.3
    pub grant_type: TokenGrantType,
    pub code: SmolStr,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<SmolStr>,
}

/// Query parameters of the redirect back from the provider.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: Option<SmolStr>,
    pub state: Option<SmolStr>,
    pub error: Option<SmolStr>,
    pub error_description: Option<SmolStr>,
    pub error_uri: Option<SmolStr>,
}

impl CallbackParams {
    /// Parse the callback query. A repeated parameter keeps its first value.
    pub fn from_query(query: Option<&str>) -> Self {
        let mut params = Self::default();
        let Some(query) = query else {
            return params;
        };
        for (name, value) in url::form_urlencoded::parse(query.as_bytes()) {
            let slot = match name.as_ref() {
                "code" => &mut params.code,
                "state" => &mut params.state,
                "error" => &mut params.error,
                "error_description" => &mut params.error_description,
                "error_uri" => &mut params.error_uri,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(SmolStr::new(value));
            }
        }
        params
    }
}

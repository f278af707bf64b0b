use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use smol_str::SmolStr;

/// Error body defined by RFC 6749 for both the authorization redirect and the
/// token endpoint.
// https://datatracker.ietf.org/doc/html/rfc6749#section-5.2
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ProviderErrorBody {
    pub error: SmolStr,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_uri: Option<SmolStr>,
}

impl std::fmt::Display for ProviderErrorBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.error_description {
            Some(description) => write!(f, "{description} ({})", self.error),
            None => f.write_str(&self.error),
        }
    }
}

/// Successful token endpoint response.
///
/// `params` holds the complete JSON object as returned by the provider, so
/// non-standard fields reach the application untouched.
// https://datatracker.ietf.org/doc/html/rfc6749#section-5.1
#[derive(Debug, Clone, PartialEq)]
pub struct TokenResponse {
    pub access_token: SmolStr,
    pub refresh_token: Option<SmolStr>,
    pub id_token: Option<SmolStr>,
    pub params: Map<String, Value>,
}

impl TokenResponse {
    pub fn from_params(params: Map<String, Value>) -> Option<Self> {
        let string = |key: &str| params.get(key).and_then(Value::as_str).map(SmolStr::new);
        let access_token = string("access_token")?;
        let refresh_token = string("refresh_token");
        let id_token = string("id_token");
        Some(Self {
            access_token,
            refresh_token,
            id_token,
            params,
        })
    }
}

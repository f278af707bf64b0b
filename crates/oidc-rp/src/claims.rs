//! ID token payload decoding.
//!
//! Only the payload segment is read. The token arrives directly from the
//! token endpoint over TLS, so its signature is not checked here.

use base64::Engine;
use base64::alphabet::URL_SAFE;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use smol_str::SmolStr;
use thiserror::Error;

const PAYLOAD_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Debug, Error, Diagnostic)]
pub enum ClaimsError {
    #[error("ID token is not a three-part compact JWT")]
    #[diagnostic(code(oidc_rp::claims::format))]
    Format,
    #[error("ID token payload is not valid base64url")]
    #[diagnostic(code(oidc_rp::claims::base64))]
    Base64(#[from] base64::DecodeError),
    #[error("ID token payload is not valid UTF-8")]
    #[diagnostic(code(oidc_rp::claims::utf8))]
    Utf8(#[from] std::str::Utf8Error),
    #[error("ID token payload is not a valid claims object")]
    #[diagnostic(code(oidc_rp::claims::json))]
    Json(#[from] serde_json::Error),
    #[error("ID token is missing required claim `{0}`")]
    #[diagnostic(
        code(oidc_rp::claims::missing),
        help("iss, sub, aud, exp and iat are required by OpenID Connect Core")
    )]
    MissingClaim(&'static str),
    #[error("ID token `aud` claim must be a string or an array of strings")]
    #[diagnostic(code(oidc_rp::claims::audience))]
    InvalidAudience,
}

/// The `aud` claim, which may be a single value or a list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    Single(SmolStr),
    Multiple(Vec<SmolStr>),
}

impl Audience {
    fn from_value(value: Value) -> Result<Self, ClaimsError> {
        match value {
            Value::String(s) => Ok(Self::Single(s.into())),
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::String(s) => Ok(SmolStr::from(s)),
                    _ => Err(ClaimsError::InvalidAudience),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Self::Multiple),
            _ => Err(ClaimsError::InvalidAudience),
        }
    }

    pub fn contains(&self, client_id: &str) -> bool {
        match self {
            Self::Single(aud) => aud == client_id,
            Self::Multiple(auds) => auds.iter().any(|aud| aud == client_id),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Multiple(auds) => auds.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Claims carried by an ID token.
// https://openid.net/specs/openid-connect-core-1_0.html#IDToken
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct IdTokenClaims {
    pub iss: SmolStr,
    pub sub: SmolStr,
    pub aud: Audience,
    /// NumericDate, seconds since the epoch; may carry a fraction.
    pub exp: f64,
    pub iat: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acr: Option<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amr: Option<Vec<SmolStr>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub azp: Option<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<SmolStr>,
    /// Every other claim, including standard profile claims.
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

#[derive(Deserialize)]
struct RawClaims {
    iss: Option<SmolStr>,
    sub: Option<SmolStr>,
    aud: Option<Value>,
    exp: Option<f64>,
    iat: Option<f64>,
    acr: Option<SmolStr>,
    amr: Option<AuthMethods>,
    auth_time: Option<f64>,
    azp: Option<SmolStr>,
    nonce: Option<SmolStr>,
    #[serde(flatten)]
    other: Map<String, Value>,
}

/// `amr` as sent on the wire; some providers send a bare string.
#[derive(Deserialize)]
#[serde(untagged)]
enum AuthMethods {
    One(SmolStr),
    Many(Vec<SmolStr>),
}

impl From<AuthMethods> for Vec<SmolStr> {
    fn from(methods: AuthMethods) -> Self {
        match methods {
            AuthMethods::One(method) => vec![method],
            AuthMethods::Many(methods) => methods,
        }
    }
}

impl IdTokenClaims {
    /// Build claims from a decoded payload object, enforcing the mandatory set.
    pub fn from_json(value: Value) -> Result<Self, ClaimsError> {
        let raw: RawClaims = serde_json::from_value(value)?;
        let iss = raw.iss.ok_or(ClaimsError::MissingClaim("iss"))?;
        let sub = raw.sub.ok_or(ClaimsError::MissingClaim("sub"))?;
        let aud = raw.aud.ok_or(ClaimsError::MissingClaim("aud"))?;
        let exp = raw.exp.ok_or(ClaimsError::MissingClaim("exp"))?;
        let iat = raw.iat.ok_or(ClaimsError::MissingClaim("iat"))?;
        Ok(Self {
            iss,
            sub,
            aud: Audience::from_value(aud)?,
            exp,
            iat,
            acr: raw.acr,
            amr: raw.amr.map(Into::into),
            auth_time: raw.auth_time,
            azp: raw.azp,
            nonce: raw.nonce,
            other: raw.other,
        })
    }

    /// Authentication context asserted by the provider.
    pub fn auth_context(&self) -> AuthContext {
        AuthContext {
            acr: self.acr.clone(),
            amr: self.amr.clone(),
            auth_time: self.auth_time,
        }
    }

    /// Claims as a single JSON object, suitable for profile normalisation.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// How the end user was authenticated, as reported in the ID token.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acr: Option<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amr: Option<Vec<SmolStr>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_time: Option<f64>,
}

/// Decode the payload of a compact-serialized ID token.
pub fn decode_id_token(id_token: &str) -> Result<IdTokenClaims, ClaimsError> {
    let mut segments = id_token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(ClaimsError::Format);
    };
    let bytes = PAYLOAD_ENGINE.decode(payload)?;
    let json = std::str::from_utf8(&bytes)?;
    IdTokenClaims::from_json(serde_json::from_str(json)?)
}

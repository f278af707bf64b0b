//! Normalised user profile built from ID token claims or a UserInfo response.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use smol_str::SmolStr;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Name {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family_name: Option<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub given_name: Option<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub middle_name: Option<SmolStr>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Email {
    pub value: SmolStr,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: Option<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<Name>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emails: Option<Vec<Email>>,
    /// Raw response body the profile was parsed from
    #[serde(rename = "_raw", skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
    /// Parsed response body the profile was built from
    #[serde(rename = "_json", skip_serializing_if = "Option::is_none")]
    pub json: Option<Value>,
}

impl Profile {
    /// Normalise OpenID standard claims.
    ///
    /// `sub` is preferred for the identifier, with the legacy `user_id` as a
    /// fallback.
    pub fn from_claims(json: &Value) -> Self {
        let string = |key: &str| json.get(key).and_then(Value::as_str).map(SmolStr::new);

        let family_name = string("family_name");
        let given_name = string("given_name");
        let middle_name = string("middle_name");
        let name = (family_name.is_some() || given_name.is_some() || middle_name.is_some()).then(
            || Name {
                family_name,
                given_name,
                middle_name,
            },
        );

        Self {
            id: string("sub").or_else(|| string("user_id")),
            display_name: string("name"),
            username: string("preferred_username"),
            name,
            emails: string("email").map(|value| vec![Email { value }]),
            raw: None,
            json: None,
        }
    }

    /// Parse a UserInfo response body, keeping the raw and parsed forms.
    pub fn from_userinfo(body: &str) -> Result<Self, serde_json::Error> {
        let json: Value = serde_json::from_str(body)?;
        let mut profile = Self::from_claims(&json);
        profile.raw = Some(body.to_owned());
        profile.json = Some(json);
        Ok(profile)
    }

    /// Overlay `other` on top of `self`; fields set on `other` win.
    pub fn merge(self, other: Profile) -> Profile {
        Profile {
            id: other.id.or(self.id),
            display_name: other.display_name.or(self.display_name),
            username: other.username.or(self.username),
            name: other.name.or(self.name),
            emails: other.emails.or(self.emails),
            raw: other.raw.or(self.raw),
            json: other.json.or(self.json),
        }
    }
}

//! ID token claim checks for the authorization code flow.
//!
//! No clock skew allowance is applied: a token whose `exp` equals the current
//! instant is already expired, and the `max_age` window is enforced exactly.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{claims::IdTokenClaims, state::RequestContext};

/// Why an otherwise well-formed ID token was refused.
///
/// These are login failures, not errors: the user agent may simply retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationFailure {
    #[error("ID token not issued by expected OpenID provider")]
    Issuer,
    #[error("ID token not intended for this relying party")]
    Audience,
    #[error("ID token has multiple audiences but no authorized party")]
    MissingAuthorizedParty,
    #[error("ID token not issued to this relying party")]
    AuthorizedParty,
    #[error("ID token has expired")]
    Expired,
    #[error("too much time has elapsed since last authentication")]
    MaxAge,
    #[error("invalid nonce in ID token")]
    Nonce,
}

/// Expected values an ID token is checked against.
#[derive(Debug, Clone, Copy)]
pub struct Expected<'a> {
    pub issuer: &'a str,
    pub client_id: &'a str,
}

/// Run the checklist in order; the first failing rule wins.
// https://openid.net/specs/openid-connect-basic-1_0.html#IDTokenValidation
pub fn validate_id_token(
    claims: &IdTokenClaims,
    expected: Expected<'_>,
    context: &RequestContext,
    now: DateTime<Utc>,
) -> Result<(), ValidationFailure> {
    if claims.iss != expected.issuer {
        return Err(ValidationFailure::Issuer);
    }

    if !claims.aud.contains(expected.client_id) {
        return Err(ValidationFailure::Audience);
    }
    if claims.aud.len() > 1 && claims.azp.is_none() {
        return Err(ValidationFailure::MissingAuthorizedParty);
    }
    if claims
        .azp
        .as_ref()
        .is_some_and(|azp| azp != expected.client_id)
    {
        return Err(ValidationFailure::AuthorizedParty);
    }

    let now_ms = now.timestamp_millis() as f64;
    if claims.exp * 1000.0 <= now_ms {
        return Err(ValidationFailure::Expired);
    }

    if let Some(max_age) = context.max_age {
        let Some(auth_time) = claims.auth_time else {
            return Err(ValidationFailure::MaxAge);
        };
        let issued = context.issued.unwrap_or(now).timestamp_millis() as f64;
        let max_age_ms = max_age as f64 * 1000.0;
        if issued - max_age_ms > auth_time * 1000.0 {
            return Err(ValidationFailure::MaxAge);
        }
    }

    if let Some(nonce) = &context.nonce {
        if claims.nonce.as_ref() != Some(nonce) {
            return Err(ValidationFailure::Nonce);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::IdTokenClaims;
    use chrono::TimeDelta;
    use serde_json::{Value, json};

    const EXPECTED: Expected<'static> = Expected {
        issuer: "https://op.example",
        client_id: "client",
    };

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn claims(extra: Value) -> IdTokenClaims {
        let mut value = json!({
            "iss": "https://op.example",
            "sub": "1234",
            "aud": "client",
            "exp": now().timestamp() + 300,
            "iat": now().timestamp()
        });
        if let (Some(base), Value::Object(extra)) = (value.as_object_mut(), extra) {
            base.extend(extra);
        }
        IdTokenClaims::from_json(value).unwrap()
    }

    fn check(claims: &IdTokenClaims, context: &RequestContext) -> Result<(), ValidationFailure> {
        validate_id_token(claims, EXPECTED, context, now())
    }

    #[test]
    fn accepts_minimal_valid_token() {
        assert_eq!(check(&claims(json!({})), &RequestContext::default()), Ok(()));
    }

    #[test]
    fn issuer_must_match_exactly() {
        let token = claims(json!({"iss": "https://op.example/"}));
        assert_eq!(
            check(&token, &RequestContext::default()),
            Err(ValidationFailure::Issuer)
        );
    }

    #[test]
    fn audience_rules() {
        let ctx = RequestContext::default();
        assert_eq!(
            check(&claims(json!({"aud": "someone-else"})), &ctx),
            Err(ValidationFailure::Audience)
        );
        assert_eq!(
            check(&claims(json!({"aud": ["X", "client"]})), &ctx),
            Err(ValidationFailure::MissingAuthorizedParty)
        );
        assert_eq!(
            check(&claims(json!({"aud": ["X", "client"], "azp": "client"})), &ctx),
            Ok(())
        );
        assert_eq!(
            check(&claims(json!({"aud": ["X", "client"], "azp": "X"})), &ctx),
            Err(ValidationFailure::AuthorizedParty)
        );
        assert_eq!(
            check(&claims(json!({"azp": "X"})), &ctx),
            Err(ValidationFailure::AuthorizedParty)
        );
        // single-element array needs no azp
        assert_eq!(check(&claims(json!({"aud": ["client"]})), &ctx), Ok(()));
    }

    #[test]
    fn expiry_is_strict() {
        let ctx = RequestContext::default();
        let past = now().timestamp() - 1;
        let future = now().timestamp() + 1;
        assert_eq!(
            check(&claims(json!({"exp": past})), &ctx),
            Err(ValidationFailure::Expired)
        );
        assert_eq!(
            check(&claims(json!({"exp": now().timestamp()})), &ctx),
            Err(ValidationFailure::Expired)
        );
        assert_eq!(check(&claims(json!({"exp": future})), &ctx), Ok(()));
    }

    #[test]
    fn fractional_expiry_compared_in_millis() {
        let ctx = RequestContext::default();
        let just_after = now().timestamp() as f64 + 0.5;
        let just_before = now().timestamp() as f64 - 0.5;
        assert_eq!(check(&claims(json!({"exp": just_after, "iat": 1.25})), &ctx), Ok(()));
        assert_eq!(
            check(&claims(json!({"exp": just_before})), &ctx),
            Err(ValidationFailure::Expired)
        );
    }

    #[test]
    fn max_age_needs_recent_auth_time() {
        let issued = now() - TimeDelta::seconds(10);
        let ctx = RequestContext {
            max_age: Some(60),
            nonce: None,
            issued: Some(issued),
        };
        assert_eq!(
            check(&claims(json!({})), &ctx),
            Err(ValidationFailure::MaxAge)
        );

        let fresh = issued.timestamp() - 60;
        assert_eq!(check(&claims(json!({"auth_time": fresh})), &ctx), Ok(()));

        let stale = issued.timestamp() - 61;
        assert_eq!(
            check(&claims(json!({"auth_time": stale})), &ctx),
            Err(ValidationFailure::MaxAge)
        );

        let fractional = issued.timestamp() as f64 - 60.5;
        assert_eq!(
            check(&claims(json!({"auth_time": fractional})), &ctx),
            Err(ValidationFailure::MaxAge)
        );
    }

    #[test]
    fn nonce_binding() {
        let ctx = RequestContext {
            nonce: Some("n1".into()),
            ..Default::default()
        };
        assert_eq!(
            check(&claims(json!({})), &ctx),
            Err(ValidationFailure::Nonce)
        );
        assert_eq!(
            check(&claims(json!({"nonce": "n2"})), &ctx),
            Err(ValidationFailure::Nonce)
        );
        assert_eq!(check(&claims(json!({"nonce": "n1"})), &ctx), Ok(()));
        // a nonce in the token is ignored when none was sent
        assert_eq!(
            check(&claims(json!({"nonce": "n1"})), &RequestContext::default()),
            Ok(())
        );
    }

    #[test]
    fn first_failure_wins() {
        let token = claims(json!({"iss": "https://evil.example", "aud": "x", "exp": 0}));
        assert_eq!(
            check(&token, &RequestContext::default()),
            Err(ValidationFailure::Issuer)
        );
    }
}

//! Binding of the authorization request to the user agent's session.
//!
//! A record is written when the user is redirected to the provider and
//! consumed exactly once when the provider redirects back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use miette::Diagnostic;
use oidc_rp_common::BoxError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use smol_str::SmolStr;
use thiserror::Error;
use url::Url;

use crate::{
    inbound::AuthRequest, types::AuthorizationRequestParameters, utils::generate_handle,
};

const STATE_FIELD: &str = "state";

/// Authentication context carried across the redirect round trip.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_age: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<SmolStr>,
    /// When the authorization request was issued; set iff `max_age` is.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issued: Option<DateTime<Utc>>,
}

/// What the session-backed store persists for one in-flight attempt.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateRecord {
    pub handle: SmolStr,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer: Option<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_age: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issued: Option<DateTime<Utc>>,
    /// Application state supplied when the attempt started
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<Value>,
}

/// Details of the authorization request handed to [`StateStore::store`].
#[derive(Clone, Debug)]
pub struct StateMetadata {
    pub issuer: SmolStr,
    pub authorization_url: Url,
    pub token_url: Url,
    pub client_id: SmolStr,
    pub callback_url: Option<Url>,
    pub params: AuthorizationRequestParameters,
}

/// Result of checking a returned `state` against the stored record.
#[derive(Clone, Debug, PartialEq)]
pub enum StateVerification {
    Verified {
        context: RequestContext,
        state: Option<Value>,
    },
    /// The attempt cannot be trusted; `message` explains why.
    Rejected { message: SmolStr },
}

#[derive(Debug, Error, Diagnostic)]
pub enum StateStoreError {
    #[error("OpenID Connect authentication requires session support")]
    #[diagnostic(
        code(oidc_rp::state::no_session),
        help("attach a session to the request, or configure a custom state store")
    )]
    NoSession,
    #[error("stored state record is malformed")]
    #[diagnostic(code(oidc_rp::state::serde))]
    Serde(#[from] serde_json::Error),
    #[error(transparent)]
    #[diagnostic(code(oidc_rp::state::other))]
    Other(#[from] BoxError),
}

/// Pluggable persistence for authorization request state.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Persist `context` for a new attempt and return the handle to send as
    /// the `state` parameter.
    async fn store(
        &self,
        request: &mut AuthRequest,
        context: &RequestContext,
        app_state: Option<&Value>,
        meta: &StateMetadata,
    ) -> Result<Option<SmolStr>, StateStoreError>;

    /// Check `handle` against the stored attempt and consume it.
    async fn verify(
        &self,
        request: &mut AuthRequest,
        handle: &str,
    ) -> Result<StateVerification, StateStoreError>;
}

/// Default store: keeps the record at `session[key].state`.
#[derive(Clone, Debug)]
pub struct SessionStateStore {
    key: SmolStr,
}

impl SessionStateStore {
    pub fn new(key: impl Into<SmolStr>) -> Self {
        Self { key: key.into() }
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

#[async_trait]
impl StateStore for SessionStateStore {
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all, fields(key = %self.key)))]
    async fn store(
        &self,
        request: &mut AuthRequest,
        context: &RequestContext,
        app_state: Option<&Value>,
        meta: &StateMetadata,
    ) -> Result<Option<SmolStr>, StateStoreError> {
        let session = request.session_mut().ok_or(StateStoreError::NoSession)?;

        let handle = generate_handle();
        let record = StateRecord {
            handle: handle.clone(),
            issuer: Some(meta.issuer.clone()),
            max_age: context.max_age,
            nonce: context.nonce.clone(),
            issued: context.issued,
            state: app_state.cloned(),
        };
        session
            .bucket_mut(&self.key)
            .insert(STATE_FIELD.to_owned(), serde_json::to_value(&record)?);
        Ok(Some(handle))
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all, fields(key = %self.key)))]
    async fn verify(
        &self,
        request: &mut AuthRequest,
        handle: &str,
    ) -> Result<StateVerification, StateStoreError> {
        let session = request.session_mut().ok_or(StateStoreError::NoSession)?;

        // Consumed before anything else happens: single use whatever the outcome.
        let Some(stored) = session.take(&self.key, STATE_FIELD) else {
            return Ok(StateVerification::Rejected {
                message: "Unable to verify authorization request state.".into(),
            });
        };
        let record: StateRecord = serde_json::from_value(stored)?;

        if record.handle != handle {
            return Ok(StateVerification::Rejected {
                message: "Invalid authorization request state.".into(),
            });
        }

        Ok(StateVerification::Verified {
            context: RequestContext {
                max_age: record.max_age,
                nonce: record.nonce,
                issued: record.issued,
            },
            state: record.state,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oidc_rp_common::Session;
    use serde_json::json;

    fn meta() -> StateMetadata {
        StateMetadata {
            issuer: "https://op.example".into(),
            authorization_url: Url::parse("https://op.example/authorize").unwrap(),
            token_url: Url::parse("https://op.example/token").unwrap(),
            client_id: "client".into(),
            callback_url: None,
            params: AuthorizationRequestParameters::new("client", "openid"),
        }
    }

    fn request_with_session() -> AuthRequest {
        AuthRequest::new(http::Request::new(())).with_session(Session::new())
    }

    #[tokio::test]
    async fn round_trip_consumes_record() {
        let store = SessionStateStore::new("openidconnect:op.example");
        let mut req = request_with_session();
        let issued = Utc::now();
        let context = RequestContext {
            max_age: Some(60),
            nonce: Some("abc".into()),
            issued: Some(issued),
        };

        let handle = store
            .store(&mut req, &context, Some(&json!({"returnTo": "/home"})), &meta())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(handle.len(), 24);

        let outcome = store.verify(&mut req, &handle).await.unwrap();
        let StateVerification::Verified { context, state } = outcome else {
            panic!("expected verified state, got {outcome:?}");
        };
        assert_eq!(context.nonce.as_deref(), Some("abc"));
        assert_eq!(context.max_age, Some(60));
        assert_eq!(context.issued, Some(issued));
        assert_eq!(state, Some(json!({"returnTo": "/home"})));
        assert!(req.session().unwrap().get("openidconnect:op.example").is_none());
    }

    #[tokio::test]
    async fn record_shape_in_session() {
        let store = SessionStateStore::new("k");
        let mut req = request_with_session();
        let handle = store
            .store(&mut req, &RequestContext::default(), None, &meta())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            req.session().unwrap().get("k"),
            Some(&json!({"state": {"handle": handle.as_str(), "issuer": "https://op.example"}}))
        );
    }

    #[tokio::test]
    async fn store_preserves_sibling_keys() {
        let store = SessionStateStore::new("k");
        let mut session = Session::new();
        session.bucket_mut("k").insert("other".into(), json!("keep me"));
        let mut req = AuthRequest::new(http::Request::new(())).with_session(session);

        let handle = store
            .store(&mut req, &RequestContext::default(), None, &meta())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            req.session().unwrap().bucket("k").unwrap().get("other"),
            Some(&json!("keep me"))
        );

        store.verify(&mut req, &handle).await.unwrap();
        assert_eq!(
            req.session().unwrap().get("k"),
            Some(&json!({"other": "keep me"}))
        );
    }

    #[tokio::test]
    async fn mismatched_handle_is_rejected_and_consumed() {
        let store = SessionStateStore::new("k");
        let mut req = request_with_session();
        let handle = store
            .store(&mut req, &RequestContext::default(), None, &meta())
            .await
            .unwrap()
            .unwrap();

        let outcome = store.verify(&mut req, "not-the-handle").await.unwrap();
        assert_eq!(
            outcome,
            StateVerification::Rejected {
                message: "Invalid authorization request state.".into()
            }
        );

        // the real handle no longer works either
        let outcome = store.verify(&mut req, &handle).await.unwrap();
        assert_eq!(
            outcome,
            StateVerification::Rejected {
                message: "Unable to verify authorization request state.".into()
            }
        );
    }

    #[tokio::test]
    async fn new_attempt_overwrites_stale_record() {
        let store = SessionStateStore::new("k");
        let mut req = request_with_session();
        let first = store
            .store(&mut req, &RequestContext::default(), None, &meta())
            .await
            .unwrap()
            .unwrap();
        let second = store
            .store(&mut req, &RequestContext::default(), None, &meta())
            .await
            .unwrap()
            .unwrap();
        assert_ne!(first, second);
        assert!(matches!(
            store.verify(&mut req, &second).await.unwrap(),
            StateVerification::Verified { .. }
        ));
    }

    #[tokio::test]
    async fn missing_session_is_fatal() {
        let store = SessionStateStore::new("k");
        let mut req = AuthRequest::new(http::Request::new(()));
        let err = store
            .store(&mut req, &RequestContext::default(), None, &meta())
            .await
            .unwrap_err();
        assert!(matches!(err, StateStoreError::NoSession));
        let err = store.verify(&mut req, "h").await.unwrap_err();
        assert!(matches!(err, StateStoreError::NoSession));
    }
}

//! The inbound HTTP request as seen by the strategy.

use http::{HeaderMap, Method, Uri, request::Parts};
use oidc_rp_common::Session;
use url::Url;

use crate::utils;

/// An inbound request plus the session attached to it by the host framework.
///
/// Only the head of the request is kept; the strategy never reads a body.
#[derive(Debug)]
pub struct AuthRequest {
    head: Parts,
    session: Option<Session>,
    tls: bool,
}

impl AuthRequest {
    /// Wrap an `http::Request`. The connection is assumed to be TLS only when
    /// the request URI says so; use [`with_tls`](Self::with_tls) otherwise.
    pub fn new<B>(request: http::Request<B>) -> Self {
        let (head, _body) = request.into_parts();
        Self::from_parts(head)
    }

    pub fn from_parts(head: Parts) -> Self {
        let tls = head.uri.scheme_str() == Some("https");
        Self {
            head,
            session: None,
            tls,
        }
    }

    pub fn with_session(mut self, session: Session) -> Self {
        self.session = Some(session);
        self
    }

    pub fn with_tls(mut self, tls: bool) -> Self {
        self.tls = tls;
        self
    }

    pub fn head(&self) -> &Parts {
        &self.head
    }

    pub fn query(&self) -> Option<&str> {
        self.head.uri.query()
    }

    pub fn is_tls(&self) -> bool {
        self.tls
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn session_mut(&mut self) -> Option<&mut Session> {
        self.session.as_mut()
    }

    /// Hand the (possibly modified) session back to the host for persistence.
    pub fn into_session(self) -> Option<Session> {
        self.session
    }

    /// Absolute URL the user agent used for this request.
    pub fn original_url(&self, trust_proxy: bool) -> Result<Url, url::ParseError> {
        utils::original_url(&self.head.uri, &self.head.headers, self.tls, trust_proxy)
    }

    /// Cloneable copy of the request line and headers.
    pub fn request_head(&self) -> RequestHead {
        RequestHead {
            method: self.head.method.clone(),
            uri: self.head.uri.clone(),
            headers: self.head.headers.clone(),
        }
    }
}

/// Request line and headers, handed to application callbacks.
#[derive(Debug, Clone)]
pub struct RequestHead {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tls_follows_uri_scheme_by_default() {
        let req = AuthRequest::new(
            http::Request::get("https://rp.example/login")
                .body(())
                .unwrap(),
        );
        assert!(req.is_tls());

        let req = AuthRequest::new(http::Request::get("/login").body(()).unwrap());
        assert!(!req.is_tls());
        assert!(req.with_tls(true).is_tls());
    }

    #[test]
    fn query_and_original_url() {
        let req = AuthRequest::new(
            http::Request::get("/cb?code=abc&state=xyz")
                .header("host", "rp.example")
                .body(())
                .unwrap(),
        );
        assert_eq!(req.query(), Some("code=abc&state=xyz"));
        assert_eq!(
            req.original_url(false).unwrap().as_str(),
            "http://rp.example/cb?code=abc&state=xyz"
        );
        let head = req.request_head();
        assert_eq!(head.method, Method::GET);
        assert_eq!(head.headers["host"], "rp.example");
    }

    #[test]
    fn session_round_trip() {
        let mut session = Session::new();
        session.insert("k", serde_json::json!(1));
        let req = AuthRequest::new(http::Request::new(())).with_session(session.clone());
        assert_eq!(req.session(), Some(&session));
        assert_eq!(req.into_session(), Some(session));
    }
}

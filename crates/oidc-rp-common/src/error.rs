//! Error types for HTTP responses that did not meet expectations

use bytes::Bytes;

/// HTTP error response (unexpected status code)
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
#[diagnostic(code(oidc_rp_common::http))]
pub struct HttpError {
    /// HTTP status code
    pub status: http::StatusCode,
    /// Response body if available
    pub body: Option<Bytes>,
}

impl HttpError {
    /// Capture status and body of a response.
    pub fn from_response(response: &http::Response<Vec<u8>>) -> Self {
        let body = response.body();
        Self {
            status: response.status(),
            body: (!body.is_empty()).then(|| Bytes::copy_from_slice(body)),
        }
    }
}

impl std::fmt::Display for HttpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "HTTP {}", self.status)?;
        if let Some(body) = &self.body {
            if let Ok(s) = std::str::from_utf8(body) {
                write!(f, ":\n{}", s)?;
            }
        }
        Ok(())
    }
}

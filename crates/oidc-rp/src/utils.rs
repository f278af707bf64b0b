use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use http::HeaderMap;
use rand::distributions::Alphanumeric;
use rand::{CryptoRng, Rng, RngCore, rngs::ThreadRng};
use smol_str::SmolStr;
use url::Url;

pub const STATE_HANDLE_LEN: usize = 24;

/// Opaque, session-bound correlation handle for the `state` parameter.
pub fn generate_handle() -> SmolStr {
    ThreadRng::default()
        .sample_iter(&Alphanumeric)
        .take(STATE_HANDLE_LEN)
        .map(char::from)
        .collect()
}

pub fn generate_nonce() -> SmolStr {
    URL_SAFE_NO_PAD
        .encode(get_random_values::<_, 16>(&mut ThreadRng::default()))
        .into()
}

pub fn get_random_values<R, const LEN: usize>(rng: &mut R) -> [u8; LEN]
where
    R: RngCore + CryptoRng,
{
    let mut bytes = [0u8; LEN];
    rng.fill_bytes(&mut bytes);
    bytes
}

/// Reconstruct the absolute URL the client used to reach this request.
///
/// With `trust_proxy`, `X-Forwarded-Proto` (first value) and
/// `X-Forwarded-Host` override what the connection itself reports.
pub fn original_url(
    uri: &http::Uri,
    headers: &HeaderMap,
    tls: bool,
    trust_proxy: bool,
) -> Result<Url, url::ParseError> {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    let forwarded_https = trust_proxy
        && header("x-forwarded-proto")
            .and_then(|proto| proto.split(',').next())
            .is_some_and(|proto| proto.trim().eq_ignore_ascii_case("https"));
    let scheme = if tls || forwarded_https || uri.scheme_str() == Some("https") {
        "https"
    } else {
        "http"
    };

    let host = trust_proxy
        .then(|| header("x-forwarded-host"))
        .flatten()
        .or_else(|| header(http::header::HOST.as_str()))
        .or_else(|| uri.authority().map(|a| a.as_str()))
        .ok_or(url::ParseError::EmptyHost)?;

    let path = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    Url::parse(&format!("{scheme}://{host}{path}"))
}

use axum::http::{HeaderMap, HeaderValue, header};

pub const ALLOW_ORIGIN: &str = "*";
pub const ALLOW_METHODS: &str = "GET, HEAD, POST, OPTIONS";
pub const ALLOW_HEADERS: &str = "*";
/// preflight results are cached by the browser for a day
pub const PREFLIGHT_MAX_AGE: &str = "86400";

/// the three headers every proxied response carries so browser players can read it
pub fn cors_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    apply_cors_headers(&mut headers);
    headers
}

pub fn apply_cors_headers(headers: &mut HeaderMap) {
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static(ALLOW_ORIGIN),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOW_METHODS),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(ALLOW_HEADERS),
    );
}

/// cors headers plus max-age, used by the global preflight handler
pub fn preflight_headers() -> HeaderMap {
    let mut headers = cors_headers();
    headers.insert(
        header::ACCESS_CONTROL_MAX_AGE,
        HeaderValue::from_static(PREFLIGHT_MAX_AGE),
    );
    headers
}

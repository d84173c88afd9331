use tracing::debug;

/// route prefix every proxied path lives under
pub const PROXY_PREFIX: &str = "/proxy/";

/// true for strings that start with an http(s) scheme, case insensitive
pub fn looks_like_http_url(candidate: &str) -> bool {
    let lower = candidate
        .get(..8)
        .unwrap_or(candidate)
        .to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// http(s) prefix and a url that actually parses with a host
fn is_valid_target(candidate: &str) -> bool {
    looks_like_http_url(candidate)
        && url::Url::parse(candidate)
            .map(|u| matches!(u.scheme(), "http" | "https") && u.has_host())
            .unwrap_or(false)
}

/// pull the target url out of `/proxy/<percent encoded url>`
///
/// callers that forget to encode still work as long as the raw remainder is an absolute url
pub fn decode_target(path: &str) -> Option<String> {
    let encoded = path
        .strip_prefix(PROXY_PREFIX)
        .or_else(|| path.strip_prefix(PROXY_PREFIX.trim_start_matches('/')))
        .unwrap_or(path);

    if encoded.is_empty() {
        return None;
    }

    let decoded = match urlencoding::decode(encoded) {
        Ok(decoded) => decoded.into_owned(),
        Err(e) => {
            debug!("failed to decode target {}: {}", encoded, e);
            return None;
        }
    };

    if is_valid_target(&decoded) {
        return Some(decoded);
    }

    if looks_like_http_url(encoded) && url::Url::parse(encoded).is_ok() {
        debug!("path was not encoded but looks like a url: {}", encoded);
        return Some(encoded.to_string());
    }

    debug!("invalid target url after decoding: {}", decoded);
    None
}

/// `/proxy/<percent encoded url>`, the inverse of `decode_target`
pub fn encode_target(url: &str) -> String {
    format!("{}{}", PROXY_PREFIX, urlencoding::encode(url))
}

/// a reference that already routes through this proxy
pub fn is_proxied_path(reference: &str) -> bool {
    reference.starts_with(PROXY_PREFIX) && decode_target(reference).is_some()
}

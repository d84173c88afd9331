use tracing::debug;
use url::Url;

use super::target_codec::{encode_target, looks_like_http_url};

/// origin plus the path without its last segment, always ending in `/`
pub fn base_of(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) => {
            let origin = parsed.origin().ascii_serialization();
            let path = parsed.path();
            if path.is_empty() || path == "/" {
                return format!("{}/", origin);
            }
            let dir = &path[..path.rfind('/').unwrap_or(0)];
            format!("{}{}/", origin, dir)
        }
        Err(e) => {
            debug!("failed to parse base url {}: {}", url, e);
            let scheme_end = url.find("://").map(|i| i + 3).unwrap_or(0);
            match url.rfind('/') {
                Some(last_slash) if last_slash >= scheme_end => url[..=last_slash].to_string(),
                _ => format!("{}/", url),
            }
        }
    }
}

/// turn a playlist reference into an absolute url relative to `base`
pub fn resolve(base: &str, reference: &str) -> String {
    if looks_like_http_url(reference) {
        return reference.to_string();
    }

    match Url::parse(base).and_then(|b| b.join(reference)) {
        Ok(resolved) => resolved.to_string(),
        Err(e) => {
            debug!(
                "failed to resolve url: base={}, reference={}, error={}",
                base, reference, e
            );
            if reference.starts_with('/') {
                let origin = Url::parse(base)
                    .map(|b| b.origin().ascii_serialization())
                    .unwrap_or_else(|_| base.trim_end_matches('/').to_string());
                return format!("{}{}", origin, reference);
            }
            let dir = match base.rfind('/') {
                Some(i) => &base[..=i],
                None => base,
            };
            format!("{}{}", dir, reference)
        }
    }
}

pub fn to_proxy_path(absolute_url: &str) -> String {
    encode_target(absolute_url)
}

use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::header::{ACCEPT_ENCODING, ACCEPT_LANGUAGE, HeaderName, REFERER};
use axum::http::request::Parts;
use tracing::debug;

/// the bits of the inbound request that get forwarded upstream or shape the response
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub accept_language: Option<String>,
    pub referer: Option<String>,
    pub accept_encoding: Option<String>,
}

impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: HeaderName| {
            parts
                .headers
                .get(name)
                .and_then(|h| h.to_str().ok())
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string())
        };

        let context = RequestContext {
            accept_language: header(ACCEPT_LANGUAGE),
            referer: header(REFERER),
            accept_encoding: header(ACCEPT_ENCODING),
        };
        debug!("request context: {:?}", context);

        Ok(context)
    }
}

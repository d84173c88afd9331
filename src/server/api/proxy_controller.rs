use axum::{
    Extension, Router,
    extract::OriginalUri,
    http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use tracing::{debug, error};

use crate::server::{
    error::{AppResult, Error},
    extractors::RequestContext,
    services::ProxyServices,
    utils::{
        cors_utils::{apply_cors_headers, cors_headers, preflight_headers},
        encoding_utils::ContentEncoding,
        playlist_utils::{MANIFEST_CONTENT_TYPE, is_manifest},
        target_codec::{PROXY_PREFIX, decode_target},
    },
};

/// upstream headers that stop being true once we've decoded and re-framed the body
const HOP_HEADERS: [&str; 5] = [
    "content-encoding",
    "content-length",
    "transfer-encoding",
    "connection",
    "keep-alive",
];

const INVALID_TARGET: &str = "Invalid proxy request. The path should be /proxy/<percent encoded url>";

pub struct ProxyController;

impl ProxyController {
    pub fn app() -> Router {
        Router::new()
            .route(
                "/proxy/{*target}",
                get(Self::proxy)
                    .options(Self::proxy_options)
                    .fallback(Self::proxy),
            )
            .fallback(Self::fallback)
    }

    /// manifest response with the playlist type, public caching and optional compression
    fn build_m3u8_response(
        processed_body: &str,
        services: &ProxyServices,
        context: &RequestContext,
    ) -> AppResult<Response> {
        let encoding = ContentEncoding::from_accept_encoding(context.accept_encoding.as_deref());

        let mut response_headers = cors_headers();
        response_headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(MANIFEST_CONTENT_TYPE),
        );
        response_headers.insert(
            header::CACHE_CONTROL,
            Self::header_value(&services.settings.cache_control())?,
        );

        let response_body = encoding.compress(processed_body.as_bytes()).map_err(|e| {
            error!("Failed to compress response with {:?}: {}", encoding, e);
            Error::InternalServerErrorWithContext("Failed to compress response".to_string())
        })?;

        if let Some(enc_header) = encoding.as_header_value() {
            debug!(
                "Compressed M3U8 with {:?} from {} to {} bytes",
                encoding,
                processed_body.len(),
                response_body.len()
            );
            response_headers.insert(header::CONTENT_ENCODING, HeaderValue::from_static(enc_header));
        }

        response_headers.insert(
            header::CONTENT_LENGTH,
            Self::header_value(&response_body.len().to_string())?,
        );

        Ok((StatusCode::OK, response_headers, response_body).into_response())
    }

    /// original bytes with upstream headers, minus the ones that no longer apply
    fn build_passthrough_response(
        body: Vec<u8>,
        upstream_headers: &[(String, String)],
        cache_control: Option<&str>,
    ) -> AppResult<Response> {
        let mut response_headers = HeaderMap::new();

        for (name, value) in upstream_headers {
            let lower = name.to_ascii_lowercase();
            if HOP_HEADERS.contains(&lower.as_str()) || lower.starts_with("access-control-") {
                continue;
            }
            if cache_control.is_some() && lower == "cache-control" {
                continue;
            }
            match (
                HeaderName::from_bytes(lower.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    response_headers.append(name, value);
                }
                _ => debug!("dropping unrepresentable upstream header {}", name),
            }
        }

        if let Some(cache_control) = cache_control {
            response_headers.insert(header::CACHE_CONTROL, Self::header_value(cache_control)?);
        }
        apply_cors_headers(&mut response_headers);

        Ok((StatusCode::OK, response_headers, body).into_response())
    }

    fn header_value(value: &str) -> AppResult<HeaderValue> {
        HeaderValue::from_str(value).map_err(|e| {
            Error::InternalServerErrorWithContext(format!("invalid header value {}: {}", value, e))
        })
    }

    async fn proxy(
        Extension(services): Extension<ProxyServices>,
        OriginalUri(uri): OriginalUri,
        context: RequestContext,
    ) -> AppResult<Response> {
        let target_url = decode_target(uri.path()).ok_or_else(|| {
            debug!("invalid proxy request path: {}", uri.path());
            Error::BadRequest(INVALID_TARGET.to_string())
        })?;

        debug!("Proxying: {}", target_url);

        // manifests are re-resolved even on a hit since variant selection may need fresh fetches
        if let Some(entry) = services.cache.get_raw(&target_url).await {
            let content_type = entry.header("content-type").unwrap_or("").to_string();
            let text = String::from_utf8_lossy(&entry.body).into_owned();

            if is_manifest(&text, &content_type) {
                debug!("cached content is a manifest, reprocessing: {}", target_url);
                let processed = services
                    .manifests
                    .process(&target_url, &text, 0, &context)
                    .await?;
                return Self::build_m3u8_response(&processed, &services, &context);
            }

            debug!("serving non-manifest content from cache: {}", target_url);
            return Self::build_passthrough_response(entry.body, &entry.headers, None);
        }

        let fetched = services.fetcher.fetch(&target_url, &context).await?;

        services
            .cache
            .put_raw(&target_url, fetched.body.clone(), fetched.headers.clone());

        let text = fetched.text();
        if is_manifest(&text, &fetched.content_type) {
            debug!("content is a manifest, processing: {}", target_url);
            let processed = services
                .manifests
                .process(&target_url, &text, 0, &context)
                .await?;
            debug!("Processed M3U8, {} bytes", processed.len());
            return Self::build_m3u8_response(&processed, &services, &context);
        }

        debug!(
            "content is not a manifest (type: {}), passing through: {}",
            fetched.content_type, target_url
        );
        let cache_control = services.settings.cache_control();
        Self::build_passthrough_response(fetched.body, &fetched.headers, Some(&cache_control))
    }

    async fn proxy_options() -> impl IntoResponse {
        (StatusCode::NO_CONTENT, cors_headers())
    }

    /// global preflight plus the error for anything outside the proxy route
    async fn fallback(method: Method, OriginalUri(uri): OriginalUri) -> Response {
        if method == Method::OPTIONS {
            return (StatusCode::NO_CONTENT, preflight_headers()).into_response();
        }

        let path = uri.path();
        if path == PROXY_PREFIX.trim_end_matches('/') || path.starts_with(PROXY_PREFIX) {
            return Error::BadRequest(INVALID_TARGET.to_string()).into_response();
        }

        (StatusCode::NOT_FOUND, cors_headers(), "Not found").into_response()
    }
}

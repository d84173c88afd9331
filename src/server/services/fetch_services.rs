use std::sync::Arc;

use axum::http::header;
use rand::seq::IndexedRandom;
use tracing::{debug, error};

use crate::config::{DEFAULT_USER_AGENT, ProxySettings};
use crate::server::{
    error::{AppResult, Error},
    extractors::RequestContext,
    utils::encoding_utils::decode_body,
};

pub const DEFAULT_ACCEPT_LANGUAGE: &str = "zh-CN,zh;q=0.9,en;q=0.8";

/// how much of an upstream error page ends up in our error message
const ERROR_BODY_PREVIEW: usize = 150;

/// one upstream response, read fully and decoded
#[derive(Debug, Clone, Default)]
pub struct FetchResult {
    pub body: Vec<u8>,
    pub content_type: String,
    /// lower case names in the order upstream sent them
    pub headers: Vec<(String, String)>,
}

impl FetchResult {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

pub type DynContentFetcher = Arc<dyn ContentFetcher + Send + Sync>;

#[async_trait::async_trait]
pub trait ContentFetcher {
    /// GET the target, anything but a success status is an error, no retries here
    async fn fetch(&self, url: &str, context: &RequestContext) -> AppResult<FetchResult>;
}

pub struct HttpContentFetcher {
    http: reqwest::Client,
    user_agents: Vec<String>,
}

impl HttpContentFetcher {
    pub fn new(http: reqwest::Client, settings: &ProxySettings) -> Self {
        Self {
            http,
            user_agents: settings.user_agents.clone(),
        }
    }

    fn random_user_agent(&self) -> &str {
        self.user_agents
            .choose(&mut rand::rng())
            .map(String::as_str)
            .unwrap_or(DEFAULT_USER_AGENT)
    }

    /// the target's own origin, used when the browser didn't send a referer
    fn origin_of(url: &str) -> String {
        url::Url::parse(url)
            .map(|u| u.origin().ascii_serialization())
            .unwrap_or_else(|_| url.to_string())
    }
}

#[async_trait::async_trait]
impl ContentFetcher for HttpContentFetcher {
    async fn fetch(&self, url: &str, context: &RequestContext) -> AppResult<FetchResult> {
        let referer = context
            .referer
            .clone()
            .unwrap_or_else(|| Self::origin_of(url));
        let accept_language = context
            .accept_language
            .as_deref()
            .unwrap_or(DEFAULT_ACCEPT_LANGUAGE);

        debug!("fetching upstream: {}", url);

        // redirects are followed by the client itself
        let response = self
            .http
            .get(url)
            .header(header::USER_AGENT, self.random_user_agent())
            .header(header::ACCEPT, "*/*")
            .header(header::ACCEPT_LANGUAGE, accept_language)
            .header(header::REFERER, referer)
            .send()
            .await
            .map_err(|e| {
                error!("request failed: {} - {}", url, e);
                Error::Transport {
                    url: url.to_string(),
                    message: e.to_string(),
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            // often a cloudflare html page, only keep the start of it
            let preview: String = response
                .text()
                .await
                .unwrap_or_default()
                .chars()
                .take(ERROR_BODY_PREVIEW)
                .collect();
            error!("upstream returned {} for {}", status, url);
            return Err(Error::Upstream {
                status: status.as_u16(),
                url: url.to_string(),
                body: preview,
            });
        }

        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let content_encoding = response
            .headers()
            .get(header::CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_ascii_lowercase());

        let bytes = response.bytes().await.map_err(|e| {
            error!("failed to read response from {}: {}", url, e);
            Error::Transport {
                url: url.to_string(),
                message: format!("failed to read response: {}", e),
            }
        })?;

        let body = decode_body(content_encoding.as_deref(), &bytes).map_err(|e| {
            error!("failed to decompress {:?} body from {}: {}", content_encoding, url, e);
            Error::Transport {
                url: url.to_string(),
                message: "failed to decompress response".to_string(),
            }
        })?;

        debug!(
            "fetched {}, Content-Type: {}, {} bytes",
            url,
            content_type,
            body.len()
        );

        Ok(FetchResult {
            body,
            content_type,
            headers,
        })
    }
}

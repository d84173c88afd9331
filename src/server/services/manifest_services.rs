use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use tracing::{debug, error};

use crate::config::ProxySettings;
use crate::server::{
    error::{AppResult, Error},
    extractors::RequestContext,
    services::{cache_services::ProxyCache, fetch_services::DynContentFetcher},
    utils::{
        playlist_utils::{
            first_nested_manifest, is_manifest, is_master, parse_variants,
            rewrite_media_playlist, select_variant,
        },
        url_resolver::{base_of, resolve},
    },
};

/// walks master playlists down to a single media playlist and rewrites it
pub struct ManifestProcessor {
    settings: Arc<ProxySettings>,
    fetcher: DynContentFetcher,
    cache: Arc<ProxyCache>,
}

impl ManifestProcessor {
    pub fn new(
        settings: Arc<ProxySettings>,
        fetcher: DynContentFetcher,
        cache: Arc<ProxyCache>,
    ) -> Self {
        Self {
            settings,
            fetcher,
            cache,
        }
    }

    /// entry point for any manifest body, `depth` counts master hops taken so far
    pub fn process<'a>(
        &'a self,
        url: &'a str,
        content: &'a str,
        depth: u32,
        context: &'a RequestContext,
    ) -> BoxFuture<'a, AppResult<String>> {
        async move {
            if is_master(content) {
                debug!("master playlist detected: {}", url);
                self.process_master(url, content, depth, context).await
            } else {
                debug!("media playlist detected: {}", url);
                Ok(rewrite_media_playlist(url, content))
            }
        }
        .boxed()
    }

    async fn process_master(
        &self,
        url: &str,
        content: &str,
        depth: u32,
        context: &RequestContext,
    ) -> AppResult<String> {
        let limit = self.settings.max_recursion;
        if depth > limit {
            error!("too many nested master playlists ({}): {}", limit, url);
            return Err(Error::RecursionLimit {
                limit,
                url: url.to_string(),
            });
        }

        let Some(variant_url) = Self::choose_variant(url, content) else {
            debug!(
                "no usable variant in {}, treating the master as a media playlist",
                url
            );
            return Ok(rewrite_media_playlist(url, content));
        };

        if let Some(cached) = self.cache.get_processed(&variant_url).await {
            return Ok(cached);
        }

        let fetched = self.fetcher.fetch(&variant_url, context).await?;
        let variant_content = fetched.text();

        if !is_manifest(&variant_content, &fetched.content_type) {
            debug!(
                "variant {} is not a manifest (type: {}), rewriting it as media anyway",
                variant_url, fetched.content_type
            );
            return Ok(rewrite_media_playlist(&variant_url, &variant_content));
        }

        let processed = self
            .process(&variant_url, &variant_content, depth + 1, context)
            .await?;

        self.cache.put_processed(&variant_url, &processed);

        Ok(processed)
    }

    /// best variant by bandwidth, else the first nested playlist reference
    fn choose_variant(url: &str, content: &str) -> Option<String> {
        let base_url = base_of(url);

        let variants = parse_variants(content);
        if let Some(best) = select_variant(&variants) {
            let resolved = resolve(&base_url, &best.uri);
            debug!("selected variant (bandwidth {}): {}", best.bandwidth, resolved);
            return Some(resolved);
        }

        debug!("no stream-inf in {}, looking for a nested playlist", url);
        first_nested_manifest(content).map(|reference| {
            let resolved = resolve(&base_url, reference);
            debug!("fallback nested playlist: {}", resolved);
            resolved
        })
    }
}

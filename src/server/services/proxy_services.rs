use std::sync::Arc;

use tracing::info;

use crate::{
    config::{AppConfig, ProxySettings},
    database::RedisDatabase,
};

use super::{
    cache_services::{DynCacheStore, ProxyCache, RedisCacheStore},
    fetch_services::{DynContentFetcher, HttpContentFetcher},
    manifest_services::ManifestProcessor,
};

/// everything a proxy request needs, cloned into every handler through an extension
#[derive(Clone)]
pub struct ProxyServices {
    pub settings: Arc<ProxySettings>,
    pub fetcher: DynContentFetcher,
    pub cache: Arc<ProxyCache>,
    pub manifests: Arc<ManifestProcessor>,
}

impl ProxyServices {
    pub fn new(config: &AppConfig, redis_db: Option<RedisDatabase>) -> Self {
        info!("starting proxy services...");

        let settings = Arc::new(config.proxy_settings());
        info!(
            "cache ttl {}s, max recursion {}, {} user agent(s)",
            settings.cache_ttl,
            settings.max_recursion,
            settings.user_agents.len()
        );

        let http = reqwest::Client::new();
        let fetcher =
            Arc::new(HttpContentFetcher::new(http, &settings)) as DynContentFetcher;

        let store = redis_db
            .map(|db| Arc::new(RedisCacheStore::new(Arc::new(db))) as DynCacheStore);

        Self::from_parts(settings, fetcher, store)
    }

    /// wire the services from already built pieces, the fetcher and store are swappable
    pub fn from_parts(
        settings: Arc<ProxySettings>,
        fetcher: DynContentFetcher,
        store: Option<DynCacheStore>,
    ) -> Self {
        let cache = Arc::new(ProxyCache::new(store, settings.cache_ttl));
        let manifests = Arc::new(ManifestProcessor::new(
            settings.clone(),
            fetcher.clone(),
            cache.clone(),
        ));

        Self {
            settings,
            fetcher,
            cache,
            manifests,
        }
    }
}

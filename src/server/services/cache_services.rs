use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, error, warn};

use crate::database::RedisDatabase;

/// bumped whenever the stored envelope changes shape, older entries become misses
pub const CACHE_ENTRY_VERSION: u8 = 1;

const RAW_PREFIX: &str = "proxy_raw";
const PROCESSED_PREFIX: &str = "m3u8_processed";

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("malformed cache entry: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("unsupported cache entry version {0}")]
    UnsupportedVersion(u8),
}

pub type DynCacheStore = Arc<dyn CacheStore + Send + Sync>;

/// plain key/value byte store, expiry is the store's problem
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait CacheStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    async fn put(&self, key: &str, value: Vec<u8>, ttl_seconds: u64) -> Result<(), CacheError>;
}

pub struct RedisCacheStore {
    redis: Arc<RedisDatabase>,
}

impl RedisCacheStore {
    pub fn new(redis: Arc<RedisDatabase>) -> Self {
        Self { redis }
    }
}

#[async_trait::async_trait]
impl CacheStore for RedisCacheStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut conn = self.redis.connection.clone();
        Ok(conn.get(key).await?)
    }

    async fn put(&self, key: &str, value: Vec<u8>, ttl_seconds: u64) -> Result<(), CacheError> {
        let mut conn = self.redis.connection.clone();
        let _: () = conn.set_ex(key, value, ttl_seconds).await?;
        Ok(())
    }
}

/// what actually lands in the store, one envelope for both namespaces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub version: u8,
    #[serde(with = "base64_body")]
    pub body: Vec<u8>,
    pub headers: Vec<(String, String)>,
    pub inserted_at: DateTime<Utc>,
    pub ttl: u64,
}

impl CacheEntry {
    pub fn new(body: Vec<u8>, headers: Vec<(String, String)>, ttl: u64) -> Self {
        Self {
            version: CACHE_ENTRY_VERSION,
            body,
            headers,
            inserted_at: Utc::now(),
            ttl,
        }
    }

    /// first header with this name, names are stored lower case
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn encode(&self) -> Result<Vec<u8>, CacheError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CacheError> {
        let entry: Self = serde_json::from_slice(bytes)?;
        if entry.version != CACHE_ENTRY_VERSION {
            return Err(CacheError::UnsupportedVersion(entry.version));
        }
        Ok(entry)
    }
}

mod base64_body {
    use super::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

/// the proxy's view of the cache: raw fetch bodies and processed playlists
///
/// every failure in here is logged and treated as a miss, the request never sees it
pub struct ProxyCache {
    store: Option<DynCacheStore>,
    ttl: u64,
}

impl ProxyCache {
    pub fn new(store: Option<DynCacheStore>, ttl: u64) -> Self {
        if store.is_none() {
            warn!("no cache store bound, every request will go upstream");
        }
        Self { store, ttl }
    }

    pub fn disabled() -> Self {
        Self {
            store: None,
            ttl: 0,
        }
    }

    fn hash_url(url: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(url.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn raw_key(url: &str) -> String {
        format!("{}:{}", RAW_PREFIX, Self::hash_url(url))
    }

    pub fn processed_key(url: &str) -> String {
        format!("{}:{}", PROCESSED_PREFIX, Self::hash_url(url))
    }

    async fn read(&self, key: &str) -> Option<CacheEntry> {
        let store = self.store.as_ref()?;

        let bytes = match store.get(key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                error!("proxy cache GET failed for {}: {}", key, e);
                return None;
            }
        };

        match CacheEntry::decode(&bytes) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("ignoring cache entry {}: {}", key, e);
                None
            }
        }
    }

    /// scheduled on the runtime, the response never waits for it
    fn write(&self, key: String, entry: CacheEntry) {
        let Some(store) = self.store.clone() else {
            return;
        };

        let value = match entry.encode() {
            Ok(value) => value,
            Err(e) => {
                error!("failed to encode cache entry {}: {}", key, e);
                return;
            }
        };
        let ttl = self.ttl;

        tokio::spawn(async move {
            match store.put(&key, value, ttl).await {
                Ok(()) => debug!("cached {} (TTL {}s)", key, ttl),
                Err(e) => error!("failed to write cache entry {}: {}", key, e),
            }
        });
    }

    pub async fn get_raw(&self, url: &str) -> Option<CacheEntry> {
        let entry = self.read(&Self::raw_key(url)).await;
        match entry {
            Some(_) => debug!("[cache hit] raw content: {}", url),
            None => debug!("[cache miss] raw content: {}", url),
        }
        entry
    }

    pub fn put_raw(&self, url: &str, body: Vec<u8>, headers: Vec<(String, String)>) {
        self.write(Self::raw_key(url), CacheEntry::new(body, headers, self.ttl));
    }

    pub async fn get_processed(&self, variant_url: &str) -> Option<String> {
        let entry = self.read(&Self::processed_key(variant_url)).await?;
        debug!("[cache hit] processed playlist: {}", variant_url);
        Some(String::from_utf8_lossy(&entry.body).into_owned())
    }

    pub fn put_processed(&self, variant_url: &str, playlist: &str) {
        self.write(
            Self::processed_key(variant_url),
            CacheEntry::new(playlist.as_bytes().to_vec(), Vec::new(), self.ttl),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_survives_the_envelope() {
        let entry = CacheEntry::new(
            vec![0x47, 0x00, 0xff, 0x10],
            vec![("content-type".into(), "video/mp2t".into())],
            60,
        );
        let decoded = CacheEntry::decode(&entry.encode().unwrap()).unwrap();
        assert_eq!(decoded, entry);
        assert_eq!(decoded.header("Content-Type"), Some("video/mp2t"));
    }

    #[test]
    fn garbage_and_old_versions_are_rejected() {
        assert!(matches!(
            CacheEntry::decode(b"{not json"),
            Err(CacheError::Malformed(_))
        ));

        let mut entry = CacheEntry::new(b"x".to_vec(), Vec::new(), 1);
        entry.version = 0;
        let bytes = serde_json::to_vec(&entry).unwrap();
        assert!(matches!(
            CacheEntry::decode(&bytes),
            Err(CacheError::UnsupportedVersion(0))
        ));
    }

    #[test]
    fn namespaces_do_not_collide() {
        let url = "https://x.test/a.m3u8";
        assert_ne!(ProxyCache::raw_key(url), ProxyCache::processed_key(url));
        assert!(ProxyCache::raw_key(url).starts_with("proxy_raw:"));
    }

    #[tokio::test]
    async fn read_errors_are_misses() {
        let mut store = MockCacheStore::new();
        store.expect_get().returning(|_| {
            Err(CacheError::Redis(redis::RedisError::from((
                redis::ErrorKind::IoError,
                "connection reset",
            ))))
        });

        let cache = ProxyCache::new(Some(Arc::new(store) as DynCacheStore), 60);
        assert!(cache.get_raw("https://x.test/a.m3u8").await.is_none());
    }

    #[tokio::test]
    async fn malformed_entries_are_misses() {
        let mut store = MockCacheStore::new();
        store
            .expect_get()
            .returning(|_| Ok(Some(b"{\"body\": 1}".to_vec())));

        let cache = ProxyCache::new(Some(Arc::new(store) as DynCacheStore), 60);
        assert!(cache.get_processed("https://x.test/b.m3u8").await.is_none());
    }

    #[tokio::test]
    async fn processed_playlists_are_read_back_as_text() {
        let url = "https://x.test/b.m3u8";
        let stored = CacheEntry::new(b"#EXTM3U\n".to_vec(), Vec::new(), 60)
            .encode()
            .unwrap();

        let expected_key = ProxyCache::processed_key(url);

        let mut store = MockCacheStore::new();
        store
            .expect_get()
            .withf(move |key| key.to_string() == expected_key)
            .returning(move |_| Ok(Some(stored.clone())));

        let cache = ProxyCache::new(Some(Arc::new(store) as DynCacheStore), 60);
        assert_eq!(cache.get_processed(url).await.as_deref(), Some("#EXTM3U\n"));
    }

    #[tokio::test]
    async fn disabled_cache_never_touches_a_store() {
        let cache = ProxyCache::disabled();
        assert!(cache.get_raw("https://x.test/a.m3u8").await.is_none());
        cache.put_processed("https://x.test/a.m3u8", "#EXTM3U");
    }
}

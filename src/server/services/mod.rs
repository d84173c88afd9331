pub mod cache_services;
pub mod fetch_services;
pub mod manifest_services;
pub mod proxy_services;

pub use cache_services::DynCacheStore;
pub use fetch_services::DynContentFetcher;
pub use proxy_services::ProxyServices;

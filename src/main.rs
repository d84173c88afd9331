use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use dotenvy::dotenv;

use tracing::{info, warn};

use m3u8_proxy::{AppConfig, Logger, ProxyApplicationServer, RedisDatabase};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let config = Arc::new(AppConfig::parse());

    // guards are kept alive to flush logs and maintain sentry connection
    let _guards = Logger::init(&config);

    info!("logger and env prepped...");

    // the cache is optional, without it every request goes upstream
    let redis_db = match config.redis_url.as_deref() {
        Some(redis_url) => {
            info!("connecting to redis...");
            match RedisDatabase::connect(redis_url).await {
                Ok(db) => Some(db),
                Err(e) => {
                    warn!("redis unavailable, proxy cache disabled: {:#}", e);
                    None
                }
            }
        }
        None => {
            warn!("REDIS_URL not set, proxy cache disabled");
            None
        }
    };

    info!("starting proxy server...");

    ProxyApplicationServer::serve(config, redis_db)
        .await
        .context("proxy server failed to start")?;

    Ok(())
}

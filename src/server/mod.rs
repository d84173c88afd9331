pub mod api;
pub mod error;
pub mod extractors;
pub mod services;
pub mod utils;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::{Extension, Router};
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::{config::AppConfig, database::RedisDatabase};

use self::{api::ProxyController, services::ProxyServices};

pub struct ProxyApplicationServer;

impl ProxyApplicationServer {
    /// the full app, exposed so it can be driven without binding a socket
    pub fn router(services: ProxyServices) -> Router {
        ProxyController::app()
            .layer(Extension(services))
            .layer(TraceLayer::new_for_http())
    }

    pub async fn serve(config: Arc<AppConfig>, redis_db: Option<RedisDatabase>) -> anyhow::Result<()> {
        let services = ProxyServices::new(&config, redis_db);
        let router = Self::router(services);

        let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {}", addr))?;

        info!("proxy listening on {}", addr);

        axum::serve(listener, router)
            .with_graceful_shutdown(Self::shutdown_signal())
            .await
            .context("error while running server")?;

        Ok(())
    }

    async fn shutdown_signal() {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                error!("failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut terminate) => {
                    terminate.recv().await;
                }
                Err(e) => {
                    error!("failed to listen for SIGTERM: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }

        info!("shutdown signal received, draining connections...");
    }
}

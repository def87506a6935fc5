use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;

use crate::api::{self, AppState};
use crate::cache::{LinkCache, MemoryCache, RedisCache};
use crate::config::{CacheBackend, Config};
use crate::engine::Engine;
use crate::fetch::{FetchOptions, Fetcher};
use crate::provider::LinkProvider;

pub async fn run() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("wikiracer=info")),
        )
        .init();

    let config = Config::from_env().context("loading configuration")?;

    let cache: Arc<dyn LinkCache> = match config.cache_backend {
        CacheBackend::Memory => Arc::new(MemoryCache::new()),
        CacheBackend::Redis => Arc::new(
            RedisCache::connect(config.redis_port)
                .await
                .context("connecting to redis cache backend")?,
        ),
    };

    let fetcher = Arc::new(Fetcher::new(FetchOptions::default()).context("building HTTP client")?);
    let provider = Arc::new(LinkProvider::new(cache, fetcher.clone()));
    let engine = Arc::new(Engine::new(fetcher, provider));

    let state = AppState {
        engine,
        request_timeout: config.request_timeout,
    };

    let addr = format!("0.0.0.0:{}", config.listen_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;
    tracing::info!(%addr, "listening");

    axum::serve(listener, api::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}

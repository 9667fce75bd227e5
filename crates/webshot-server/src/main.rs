//! Webshot - screenshot service with a two-tier render cache
//!
//! Renders web pages to images through headless Chrome and keeps the
//! results in memory and on disk so repeat requests skip the browser.

mod config;
mod error;
mod server;
mod service;
mod types;
mod warmer;

use crate::config::Config;
use crate::error::{Result, ServerError};
use crate::server::{start_server, ServerState, SharedState};
use crate::service::ScreenshotService;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{prelude::*, EnvFilter};
use webshot_cache::CacheStore;
use webshot_render::{ChromeEngine, Renderer};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let env_filter = EnvFilter::from_default_env()
        .add_directive("webshot_server=info".parse()?)
        .add_directive("webshot_cache=info".parse()?)
        .add_directive("webshot_render=info".parse()?);

    // Use JSON format for GCP Cloud Logging when LOG_FORMAT=json
    if std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false)
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    };

    info!("Starting Webshot...");

    let config = Config::from_env()?;
    info!("Port: {}", config.port);
    info!("Cache dir: {:?}", config.cache_dir);
    info!("Cache TTL: {} seconds", config.cache_ttl_secs);
    info!(
        "Memory cache limit: {} MB",
        config.memory_cache_max_bytes / (1024 * 1024)
    );
    info!(
        "Viewport: {}x{} @{} ({})",
        config.viewport_width,
        config.viewport_height,
        config.device_scale_factor,
        config.image_format
    );

    let cache = CacheStore::open(config.cache_config()).await?;
    cache.start_sweeper(config.cleanup_interval()).await;

    let engine = Arc::new(ChromeEngine::new(config.chrome_options()));
    let renderer = Arc::new(Renderer::new(engine, config.max_concurrent_renders));
    let service = ScreenshotService::new(cache.clone(), renderer, config.render_defaults());

    let state: SharedState = Arc::new(ServerState::new(service));

    // Serve until SIGINT/SIGTERM
    let served = start_server(state, config.port)
        .await
        .map_err(ServerError::from);

    cache.shutdown().await;
    info!("Shutdown complete");
    served
}

mod admin;
mod assets;
mod blobs;
mod catalog;
mod compositor;
mod config;
mod copywriter;
mod descriptors;
mod drafts;
mod error;
mod fetcher;
mod gemini;
mod models;
mod normalizer;
mod orchestrator;
mod payload;
mod progress;
mod routes;
mod speculative;
mod synthesizer;
#[cfg(test)]
mod test_support;

use parking_lot::RwLock;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tracing_subscriber::{fmt, EnvFilter};

use crate::blobs::BlobStore;
use crate::catalog::TemplateCatalog;
use crate::config::Config;
use crate::drafts::DraftStore;
use crate::fetcher::{ReqwestGet, RemoteFetcher};
use crate::gemini::GeminiClient;
use crate::orchestrator::Studio;
use crate::routes::{router, AppState};

const DRAFT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let config = Arc::new(Config::from_env()?);
    if config.demo_mode() {
        tracing::warn!("🧪 GEMINI_API_KEY not set, running in demo mode");
    } else {
        let key = &config.gemini_api_key;
        tracing::info!("Using API key: {}...", &key[..key.len().min(6)]);
    }

    let catalog = Arc::new(RwLock::new(TemplateCatalog::load(&config.templates_file)));
    let blobs = BlobStore::new(&config.upload_dir);
    let http = Arc::new(ReqwestGet::new(Duration::from_secs(config.fetch_timeout_secs))?);
    let fetcher = RemoteFetcher::new(http, blobs.clone(), config.cors_proxy_url.clone());
    let model = Arc::new(GeminiClient::new(&config));

    let studio = Studio::new(config.clone(), model, fetcher, blobs, catalog);
    tracing::info!(templates = studio.templates().len(), "📚 Template catalog ready");
    let drafts = DraftStore::from_config(&config);
    let sweeper = drafts.clone();
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(DRAFT_SWEEP_INTERVAL);
        loop {
            tick.tick().await;
            sweeper.prune();
        }
    });
    let app = router(AppState { studio, drafts });

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tracing::info!(%addr, "Starting server");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("👋 Shutting down");
}

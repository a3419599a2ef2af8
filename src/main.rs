//! Feedwarden — Binary Entrypoint
//! Boots the scheduler loop and the Axum admin/metrics server.

use std::sync::Arc;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use feedwarden::api::{self, AppState};
use feedwarden::backlog::{MemoryEditorialBacklog, RecordingEditorialDispatcher};
use feedwarden::clock::SystemClock;
use feedwarden::config::EngineConfig;
use feedwarden::engine::Engine;
use feedwarden::fetchers::{rss::RssFetcher, FetcherRegistry};
use feedwarden::items::{BasicCanonicalizer, MemoryItemSink};
use feedwarden::metrics::Metrics;
use feedwarden::scheduler;
use feedwarden::source::SourceKind;

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("feedwarden=info,warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let config = EngineConfig::load_default()?;
    tracing::info!(?config, "starting feedwarden");

    let metrics = Metrics::init(config.serp_api_monthly_limit);

    let mut fetchers = FetcherRegistry::new();
    fetchers.register(SourceKind::Rss, Arc::new(RssFetcher::over_http()));

    // The persistence/dedup service and the AI routine are platform
    // collaborators; the in-memory stand-ins let the engine run standalone.
    let bind_addr = config.bind_addr.clone();
    let engine = Arc::new(Engine::new(
        config,
        Arc::new(SystemClock),
        fetchers,
        Arc::new(MemoryItemSink::new()),
        Arc::new(BasicCanonicalizer),
        Arc::new(MemoryEditorialBacklog::new()),
        Arc::new(RecordingEditorialDispatcher::new()),
    ));

    let _scheduler = scheduler::spawn_scheduler(engine.clone());

    let app = api::router(AppState {
        engine: engine.clone(),
    })
    .merge(metrics.router());

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "admin surface listening");
    axum::serve(listener, app).await?;
    Ok(())
}

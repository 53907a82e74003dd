use std::sync::Arc;

use anyhow::Context;
use tower_http::cors::CorsLayer;

use face_queue::config::ServerConfig;
use face_queue::jobs::{HttpRecognizer, JobExecutor, JobQueue, search_routes};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = ServerConfig::from_env();
    config.validate()?;

    eprintln!("🔎 face-queue v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Search API: http://{}/api/search", config.bind_addr);
    eprintln!("   Search WS: ws://{}/ws/search", config.bind_addr);
    eprintln!("   Recognizer: {}", config.upstream_url);
    eprintln!(
        "   Timeout: {}s, top_k: {} (max {})\n",
        config.upstream_timeout.as_secs(),
        config.default_top_k,
        config.max_top_k
    );

    // ── Scheduler ───────────────────────────────────────────────────────
    let recognizer = Arc::new(HttpRecognizer::new(
        config.upstream_url.clone(),
        config.upstream_token.clone(),
    ));
    let executor = Arc::new(JobExecutor::new(recognizer, config.upstream_timeout));
    let queue = JobQueue::with_retention(executor, config.finished_retention);

    // ── HTTP ────────────────────────────────────────────────────────────
    let bind_addr = config.bind_addr;
    let app = search_routes(queue, Arc::new(config)).layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("Failed to bind {bind_addr}"))?;
    tracing::info!(addr = %bind_addr, "face-queue server started");
    axum::serve(listener, app).await?;

    Ok(())
}

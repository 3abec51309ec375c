//! OpenAQ API Server
//!
//! Usage:
//!   cargo run --bin openaq_api
//!
//! Environment:
//!   DATABASE_READ_USER, DATABASE_READ_PASSWORD, DATABASE_DB,
//!   DATABASE_HOST, DATABASE_PORT  - Postgres connection (required)
//!   API_CACHE_TIMEOUT             - Query cache TTL in seconds (default: 900)
//!   RATE_LIMITING, REDIS_HOST, REDIS_PORT - API key limiting
//!   EXPLORER_API_KEY              - Key exempt from limiting
//!   API_HOST / API_PORT (or PORT) - Bind address (default: 0.0.0.0:8888)
//!   LOG_LEVEL                     - tracing filter (default: INFO)

use openaq_api::api::{create_router, AppState};
use openaq_api::models::BaseLog;
use openaq_api::{Db, RateLimiter, RedisStore, Settings};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const REDIS_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let settings = Settings::from_env()?;

    // Initialize logging
    let filter = EnvFilter::try_new(&settings.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    info!("🌍 OpenAQ API v{}", env!("CARGO_PKG_VERSION"));

    let db = Db::connect_lazy(&settings.database_read_url(), settings.cache_ttl())?
        .with_website(settings.website());

    let limiter = match settings.redis_url() {
        Some(url) => match RedisStore::connect(&url, REDIS_CONNECT_TIMEOUT).await {
            Ok(store) => {
                info!("🚦 Rate limiting enabled");
                Some(RateLimiter::new(Arc::new(store)))
            }
            Err(e) => {
                error!(
                    "{}",
                    BaseLog::infrastructure_error(format!("failed to connect to redis: {}", e))
                        .to_json()
                );
                None
            }
        },
        None => {
            warn!("⚠️ Rate limiting disabled");
            None
        }
    };

    let addr: SocketAddr = settings.bind_addr().parse()?;
    let state = Arc::new(AppState::new(settings, db, limiter));

    let cleanup = state.spawn_cache_cleanup();
    info!("🧹 Background cache cleanup started");

    let app = create_router(state.clone());

    info!("🚀 OpenAQ API starting on http://{}", addr);
    info!("Endpoints:");
    info!("  GET  /ping         - Liveness");
    info!("  GET  /health       - Pool and cache status");
    info!("Press Ctrl+C for graceful shutdown");

    let listener = TcpListener::bind(addr).await?;

    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    info!("🛑 Shutdown signal received, cleaning up...");
    cleanup.abort();

    let stats = state.db.cache_stats();
    info!(
        "   Cache: {} entries, {} hits, {} misses",
        stats.entries, stats.hits, stats.misses
    );
    info!("   Requests served: {}", state.request_count());
    state.db.close().await;

    info!("👋 OpenAQ API shutdown complete");
    Ok(())
}

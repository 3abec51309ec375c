//! API Request Handlers

use axum::{extract::State, response::Redirect, Json};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

use super::types::*;
use crate::config::Settings;
use crate::db::Db;
use crate::limiter::RateLimiter;

pub const FAVICON_URL: &str = "https://openaq.org/assets/graphics/meta/favicon.png";

/// How often expired query results are purged
const CACHE_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// Shared application state
pub struct AppState {
    pub settings: Settings,
    pub db: Db,
    /// `None` when rate limiting is off or redis is unreachable
    pub limiter: Option<RateLimiter>,
    pub start_time: Instant,
    counter: AtomicU64,
}

impl AppState {
    pub fn new(settings: Settings, db: Db, limiter: Option<RateLimiter>) -> Self {
        Self {
            settings,
            db,
            limiter,
            start_time: Instant::now(),
            counter: AtomicU64::new(0),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Counts a handled request and returns the new total
    pub fn increment_counter(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn request_count(&self) -> u64 {
        self.counter.load(Ordering::Relaxed)
    }

    /// Background task: purge expired cache entries every 60 seconds
    pub fn spawn_cache_cleanup(&self) -> tokio::task::JoinHandle<()> {
        let cache = self.db.cache().clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(CACHE_CLEANUP_INTERVAL);
            loop {
                interval.tick().await;
                cache.cleanup_expired();
            }
        })
    }
}

// ============================================
// Service endpoints
// ============================================

pub async fn ping() -> Json<PingResponse> {
    Json(PingResponse::default())
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<ApiResponse<HealthData>> {
    let start = Instant::now();

    let data = HealthData {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime_seconds(),
        requests: state.request_count(),
        rate_limiting: state.limiter.is_some(),
        database: state.db.pool_status(),
        cache: state.db.cache_stats(),
    };

    Json(ApiResponse::success(
        data,
        start.elapsed().as_secs_f64() * 1000.0,
    ))
}

pub async fn favicon() -> Redirect {
    info!("favicon requested");
    Redirect::temporary(FAVICON_URL)
}

//! API-key rate limiting
//!
//! Each key gets a counter per UTC minute. The counter is incremented and
//! given its expiry in one atomic store operation, so concurrent requests
//! can never leave a bucket without a TTL or lose an increment.

pub mod memory_store;
pub mod redis_store;

pub use memory_store::MemoryStore;
pub use redis_store::RedisStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::models::{AppError, AppResult, ErrorCode};

/// Requests per minute for keys without a configured rate
pub const DEFAULT_RATE_LIMIT: i64 = 60;
/// Bucket length
pub const WINDOW_SECS: i64 = 60;

/// Backing store for keys, per-key rates and window counters
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Whether `api_key` is a registered key
    async fn is_member(&self, api_key: &str) -> AppResult<bool>;

    /// The key's configured `rate`, unparsed
    async fn key_rate(&self, api_key: &str) -> AppResult<Option<String>>;

    /// Increments `bucket`, setting its expiry on the first increment.
    /// Returns the new count and the remaining TTL in seconds (negative when
    /// the bucket has none).
    async fn incr_window(&self, bucket: &str, window_secs: i64) -> AppResult<(i64, i64)>;
}

/// Outcome of one rate limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub limit: i64,
    pub remaining: i64,
    pub used: i64,
    /// Seconds until the current bucket expires
    pub reset: i64,
    pub limited: bool,
}

impl RateLimitDecision {
    fn new(limit: i64, count: i64, ttl: i64) -> Self {
        Self {
            limit,
            remaining: (limit - count).max(0),
            used: count.min(limit),
            reset: if ttl < 0 { WINDOW_SECS } else { ttl },
            limited: count > limit,
        }
    }

    /// `x-ratelimit-*` response headers
    pub fn headers(&self) -> [(&'static str, i64); 4] {
        [
            ("x-ratelimit-limit", self.limit),
            ("x-ratelimit-remaining", self.remaining),
            ("x-ratelimit-used", self.used),
            ("x-ratelimit-reset", self.reset),
        ]
    }

    /// `key/limit/remaining`, as written to request logs
    pub fn summary(&self, api_key: &str) -> String {
        format!("{}/{}/{}", api_key, self.limit, self.remaining)
    }
}

/// `"{api_key}:{YYYYMMDDHHMM}"`
pub fn bucket_key(api_key: &str, now: DateTime<Utc>) -> String {
    format!("{}:{}", api_key, now.format("%Y%m%d%H%M"))
}

/// Parses a stored rate, falling back to [`DEFAULT_RATE_LIMIT`]
pub fn parse_rate(raw: Option<&str>) -> i64 {
    raw.and_then(|r| r.trim().parse::<i64>().ok())
        .unwrap_or(DEFAULT_RATE_LIMIT)
}

#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter").finish_non_exhaustive()
    }
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>) -> Self {
        Self { store }
    }

    /// Counts one request for `api_key` in the minute containing `now`.
    ///
    /// Unknown keys are `API_UNAUTHORIZED`; store failures surface as
    /// `REDIS_ERROR` so the caller can decide to fail open.
    pub async fn check(&self, api_key: &str, now: DateTime<Utc>) -> AppResult<RateLimitDecision> {
        if !self.store.is_member(api_key).await? {
            return Err(AppError::new(ErrorCode::ApiUnauthorized, "api key not found"));
        }
        let limit = parse_rate(self.store.key_rate(api_key).await?.as_deref());
        let bucket = bucket_key(api_key, now);
        let (count, ttl) = self.store.incr_window(&bucket, WINDOW_SECS).await?;
        let decision = RateLimitDecision::new(limit, count, ttl);
        debug!(
            "rate limit {}: {}/{} used, limited={}",
            bucket, count, limit, decision.limited
        );
        Ok(decision)
    }
}

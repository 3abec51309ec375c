//! In-process store for tests and single-instance deployments

use async_trait::async_trait;
use dashmap::DashMap;
use std::time::{Duration, Instant};

use super::RateLimitStore;
use crate::models::AppResult;

#[derive(Debug, Clone, Copy)]
struct Window {
    count: i64,
    expires_at: Instant,
}

/// Same semantics as the Redis store, backed by DashMaps
#[derive(Debug, Default)]
pub struct MemoryStore {
    /// api key -> configured rate
    keys: DashMap<String, Option<String>>,
    windows: DashMap<String, Window>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a key, optionally with its own per-minute rate
    pub fn add_key(&self, api_key: &str, rate: Option<i64>) {
        self.keys
            .insert(api_key.to_string(), rate.map(|r| r.to_string()));
    }

    pub fn remove_key(&self, api_key: &str) {
        self.keys.remove(api_key);
    }

    /// Drops expired windows
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.windows.len();
        self.windows.retain(|_, w| w.expires_at > now);
        before.saturating_sub(self.windows.len())
    }
}

#[async_trait]
impl RateLimitStore for MemoryStore {
    async fn is_member(&self, api_key: &str) -> AppResult<bool> {
        Ok(self.keys.contains_key(api_key))
    }

    async fn key_rate(&self, api_key: &str) -> AppResult<Option<String>> {
        Ok(self.keys.get(api_key).and_then(|r| r.value().clone()))
    }

    async fn incr_window(&self, bucket: &str, window_secs: i64) -> AppResult<(i64, i64)> {
        let now = Instant::now();
        let window = Duration::from_secs(window_secs.max(0) as u64);
        // A new minute opens a new bucket; drop the stale ones first.
        // Must run before entry() takes its shard lock.
        if !self.windows.contains_key(bucket) {
            self.cleanup_expired();
        }
        // entry() holds the shard lock, so the increment is atomic
        let mut entry = self.windows.entry(bucket.to_string()).or_insert(Window {
            count: 0,
            expires_at: now + window,
        });
        if entry.expires_at <= now {
            *entry = Window {
                count: 0,
                expires_at: now + window,
            };
        }
        entry.count += 1;
        let ttl = entry.expires_at.saturating_duration_since(now).as_secs() as i64;
        Ok((entry.count, ttl))
    }
}

//! Redis backed store
//!
//! Layout shared with the key registration service:
//! - set `keys`: every valid API key
//! - hash `<api_key>`: field `rate` holds requests per minute
//! - string `<api_key>:<YYYYMMDDHHMM>`: request counter for that minute

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Script};
use std::time::Duration;
use tracing::info;

use super::RateLimitStore;
use crate::models::{AppError, AppResult, ErrorCode};

const KEYS_SET: &str = "keys";
const RATE_FIELD: &str = "rate";

/// INCR, EXPIRE on first hit, then report the TTL
const INCR_WINDOW_LUA: &str = r#"
local count = redis.call('INCR', KEYS[1])
if count == 1 then
    redis.call('EXPIRE', KEYS[1], ARGV[1])
end
return {count, redis.call('TTL', KEYS[1])}
"#;

#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    incr_window: Script,
}

impl RedisStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            incr_window: Script::new(INCR_WINDOW_LUA),
        }
    }

    /// Opens a managed connection, giving up after `timeout`
    pub async fn connect(url: &str, timeout: Duration) -> AppResult<Self> {
        let client = Client::open(url)?;
        let conn = tokio::time::timeout(timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| {
                AppError::new(
                    ErrorCode::RedisError,
                    format!("Timed out connecting to redis after {:?}", timeout),
                )
            })??;
        info!("🔌 Connected to redis");
        Ok(Self::new(conn))
    }
}

#[async_trait]
impl RateLimitStore for RedisStore {
    async fn is_member(&self, api_key: &str) -> AppResult<bool> {
        let mut conn = self.conn.clone();
        let member: bool = conn.sismember(KEYS_SET, api_key).await?;
        Ok(member)
    }

    async fn key_rate(&self, api_key: &str) -> AppResult<Option<String>> {
        let mut conn = self.conn.clone();
        let rate: Option<String> = conn.hget(api_key, RATE_FIELD).await?;
        Ok(rate)
    }

    async fn incr_window(&self, bucket: &str, window_secs: i64) -> AppResult<(i64, i64)> {
        let mut conn = self.conn.clone();
        let (count, ttl): (i64, i64) = self
            .incr_window
            .key(bucket)
            .arg(window_secs)
            .invoke_async(&mut conn)
            .await?;
        Ok((count, ttl))
    }
}

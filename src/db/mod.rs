//! Postgres access layer
//!
//! Thin wrapper over a lazily connecting `sqlx` pool. Every statement runs
//! in its own read transaction and its rows come back as JSON objects so
//! they can be memoised and returned to clients unchanged.

pub mod render;

pub use render::render;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{Postgres, Row};
use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::models::{AppError, AppResult, Found, Meta, OpenAQResult};
use crate::queries::{page_offset, SqlParams, SqlValue};
use crate::utils::{CacheStats, TtlCache};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(6);
pub const MAX_TIMEOUT: Duration = Duration::from_secs(15);

/// Session settings a caller may change for one statement
pub const ALLOWED_CONFIG_PARAMS: &[&str] = &["work_mem"];

const POOL_MIN_CONNECTIONS: u32 = 1;
const POOL_MAX_CONNECTIONS: u32 = 10;
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(15);

/// Rows of one statement, each a JSON object keyed by column name
pub type Rows = Arc<Vec<Value>>;

/// Memoised statement results keyed by [`query_key`]
pub type QueryCache = TtlCache<u64, Rows>;

/// Per-statement execution options
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    timeout: Option<Duration>,
    config: BTreeMap<String, String>,
}

impl FetchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets a session parameter for the statement's transaction. Names
    /// outside [`ALLOWED_CONFIG_PARAMS`] are ignored.
    pub fn with_config(mut self, param: impl Into<String>, value: impl ToString) -> Self {
        self.config.insert(param.into(), value.to_string());
        self
    }

    /// Effective timeout: default 6s, never above 15s
    pub fn timeout(&self) -> Duration {
        match self.timeout {
            Some(t) if !t.is_zero() => t.min(MAX_TIMEOUT),
            _ => DEFAULT_TIMEOUT,
        }
    }

    fn allowed_config(&self) -> impl Iterator<Item = (&String, &String)> + '_ {
        self.config.iter().filter(|(param, _)| {
            let allowed = ALLOWED_CONFIG_PARAMS.iter().any(|p| *p == param.as_str());
            if !allowed {
                warn!("Ignoring session parameter {}", param);
            }
            allowed
        })
    }
}

/// Pool occupancy for health reporting
#[derive(Debug, Clone, Serialize)]
pub struct PoolStatus {
    pub size: u32,
    pub idle: usize,
    pub max_size: u32,
    pub closed: bool,
}

/// Cache key for a statement: SQL text plus its serialised params
pub fn query_key(sql: &str, params: &SqlParams) -> u64 {
    let mut hasher = DefaultHasher::new();
    sql.hash(&mut hasher);
    serde_json::to_string(params)
        .unwrap_or_default()
        .hash(&mut hasher);
    hasher.finish()
}

/// `found` for a page of rows
///
/// Uses the rows' own `found` window count when the statement selected one,
/// otherwise reports a lower bound when the page came back full.
pub fn page_found(rows: &[Value], limit: i64) -> Found {
    match rows.first() {
        None => Found::Count(0),
        Some(first) => match first.get("found").and_then(Value::as_i64) {
            Some(found) => Found::Count(found),
            None if rows.len() as i64 == limit => Found::more_than(limit),
            None => Found::Count(rows.len() as i64),
        },
    }
}

fn int_param(params: &SqlParams, name: &str) -> Option<i64> {
    match params.get(name) {
        Some(SqlValue::Int(v)) => Some(*v),
        _ => None,
    }
}

fn bind_value<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: SqlValue,
) -> Query<'q, Postgres, PgArguments> {
    match value {
        SqlValue::Int(v) => query.bind(v),
        SqlValue::IntList(v) => query.bind(v),
        SqlValue::Float(v) => query.bind(v),
        SqlValue::Bool(v) => query.bind(v),
        SqlValue::Text(v) => query.bind(v),
        SqlValue::Date(v) => query.bind(v),
        SqlValue::Timestamp(v) => query.bind(v),
        SqlValue::TimestampTz(v) => query.bind(v.with_timezone(&Utc)),
    }
}

/// Wraps a statement so each row is returned as one JSON object
fn as_json_rows(sql: &str) -> String {
    let body = sql.trim().trim_end_matches(';');
    format!("SELECT row_to_json(q) AS row FROM (\n{}\n) q", body)
}

fn decode_rows(rows: &[PgRow]) -> AppResult<Vec<Value>> {
    rows.iter()
        .map(|r| r.try_get::<Value, _>("row").map_err(AppError::from))
        .collect()
}

#[derive(Clone)]
pub struct Db {
    pool: PgPool,
    cache: QueryCache,
    website: String,
}

impl Db {
    /// Builds the pool without opening a connection; the first statement
    /// connects.
    pub fn connect_lazy(url: &str, cache_ttl: Duration) -> AppResult<Self> {
        let pool = PgPoolOptions::new()
            .min_connections(POOL_MIN_CONNECTIONS)
            .max_connections(POOL_MAX_CONNECTIONS)
            .idle_timeout(POOL_IDLE_TIMEOUT)
            .acquire_timeout(MAX_TIMEOUT)
            .connect_lazy(url)?;
        info!("🐘 Postgres pool ready (max {} connections)", POOL_MAX_CONNECTIONS);
        Ok(Self::with_pool(pool, cache_ttl))
    }

    pub fn with_pool(pool: PgPool, cache_ttl: Duration) -> Self {
        Self {
            pool,
            cache: QueryCache::with_ttl(cache_ttl),
            website: "/".to_string(),
        }
    }

    /// Website reported in page metadata
    pub fn with_website(mut self, website: impl Into<String>) -> Self {
        self.website = website.into();
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn pool_status(&self) -> PoolStatus {
        PoolStatus {
            size: self.pool.size(),
            idle: self.pool.num_idle(),
            max_size: self.pool.options().get_max_connections(),
            closed: self.pool.is_closed(),
        }
    }

    pub async fn fetch(&self, sql: &str, params: &SqlParams) -> AppResult<Rows> {
        self.fetch_with(sql, params, &FetchOptions::default()).await
    }

    /// Runs a statement, serving repeats from the cache
    pub async fn fetch_with(
        &self,
        sql: &str,
        params: &SqlParams,
        options: &FetchOptions,
    ) -> AppResult<Rows> {
        let key = query_key(sql, params);
        if let Some(rows) = self.cache.get(&key) {
            return Ok(rows);
        }

        let (rendered, values) = render(sql, params)?;
        let statement = as_json_rows(&rendered);
        let start = Instant::now();
        debug!("Query: {}\nArgs: {:?}", rendered, values);

        // Transaction keeps set_config local to this statement.
        let mut tx = self.pool.begin().await?;
        for (param, value) in options.allowed_config() {
            sqlx::query("SELECT set_config($1, $2, TRUE)")
                .bind(param.as_str())
                .bind(value.as_str())
                .execute(&mut *tx)
                .await?;
        }

        let mut query = sqlx::query(&statement);
        for value in values {
            query = bind_value(query, value);
        }

        let rows = match tokio::time::timeout(options.timeout(), query.fetch_all(&mut *tx)).await {
            Ok(Ok(rows)) => rows,
            Ok(Err(e)) => {
                let err = AppError::from(e);
                error!("❌ Database error [{}]: {}\n{}", err.code_str(), err.message, rendered);
                return Err(err);
            }
            Err(_) => {
                warn!("⏱️ Query timed out after {:?}", options.timeout());
                return Err(AppError::request_timeout());
            }
        };
        tx.commit().await?;

        let rows = Arc::new(decode_rows(&rows)?);
        debug!(
            "Query took {:.1}ms and returned {} rows",
            start.elapsed().as_secs_f64() * 1000.0,
            rows.len()
        );
        self.cache.set(key, rows.clone());
        Ok(rows)
    }

    /// First row, if any
    pub async fn fetch_row(&self, sql: &str, params: &SqlParams) -> AppResult<Option<Value>> {
        let rows = self.fetch(sql, params).await?;
        Ok(rows.first().cloned())
    }

    /// First column of the first row
    pub async fn fetch_val(&self, sql: &str, params: &SqlParams) -> AppResult<Option<Value>> {
        let row = self.fetch_row(sql, params).await?;
        Ok(row.and_then(|r| match r {
            Value::Object(map) => map.into_iter().next().map(|(_, v)| v),
            other => Some(other),
        }))
    }

    pub async fn fetch_page(&self, sql: &str, params: SqlParams) -> AppResult<OpenAQResult> {
        self.fetch_page_with(sql, params, &FetchOptions::default()).await
    }

    /// Runs a paginated statement and wraps the rows with page metadata
    pub async fn fetch_page_with(
        &self,
        sql: &str,
        mut params: SqlParams,
        options: &FetchOptions,
    ) -> AppResult<OpenAQResult> {
        let page = int_param(&params, "page").unwrap_or(1);
        let limit = int_param(&params, "limit").unwrap_or(1000);
        params.insert("offset".into(), SqlValue::Int(page_offset(page, limit)));

        let rows = self.fetch_with(sql, &params, options).await?;
        let found = page_found(&rows, limit);

        Ok(OpenAQResult {
            meta: Meta {
                website: self.website.clone(),
                page,
                limit,
                found: Some(found),
                ..Meta::default()
            },
            results: rows.as_ref().clone(),
        })
    }

    pub async fn close(&self) {
        self.pool.close().await;
        info!("🐘 Postgres pool closed");
    }
}

//! OpenAQ API core
//!
//! Building blocks of the OpenAQ air-quality API service:
//! - Query models composed from reusable filters, rendered by `QueryBuilder`
//! - Postgres access with memoised, paginated fetches
//! - API-key checks and per-minute rate limiting backed by Redis
//! - Structured JSON request logging

pub mod api;
pub mod config;
pub mod db;
pub mod limiter;
pub mod models;
pub mod queries;
pub mod utils;

pub use api::{create_router, AppState};
pub use config::Settings;
pub use db::{Db, FetchOptions, PoolStatus};
pub use limiter::{MemoryStore, RateLimitDecision, RateLimitStore, RateLimiter, RedisStore};
pub use models::{AppError, AppResult, ErrorCode, Meta, OpenAQResult};
pub use queries::{FromQueryParams, QueryBuilder, QueryFilter, QueryModel, QueryParams};
pub use utils::{CacheStats, TtlCache};

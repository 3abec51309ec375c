//! API Response Types for the service endpoints

use serde::Serialize;

use crate::db::PoolStatus;
use crate::utils::CacheStats;

/// Envelope for service endpoints (data endpoints use `OpenAQResult`)
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
    pub latency_ms: f64,
    pub timestamp: i64,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T, latency_ms: f64) -> Self {
        Self {
            success: true,
            data,
            latency_ms,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct PingResponse {
    pub ping: &'static str,
}

impl Default for PingResponse {
    fn default() -> Self {
        Self { ping: "pong!" }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthData {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub requests: u64,
    pub rate_limiting: bool,
    pub database: PoolStatus,
    pub cache: CacheStats,
}

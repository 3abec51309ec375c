//! Structured JSON log records
//!
//! Request logs are rendered as single-line camelCase JSON so the log
//! pipeline can index them without parsing free text. Records are emitted
//! through `tracing`.

use axum::http::{HeaderMap, Uri};
use serde::Serialize;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::Instant;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogType {
    Success,
    ValidationError,
    InfrastructureError,
    UnprocessableEntity,
    Unauthorized,
    TooManyRequests,
    Warning,
    Info,
    Error,
}

/// Plain log record with a type and optional detail
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseLog {
    #[serde(rename = "type")]
    pub log_type: LogType,
    pub detail: Option<String>,
}

impl BaseLog {
    pub fn warn(detail: impl Into<String>) -> Self {
        Self {
            log_type: LogType::Warning,
            detail: Some(detail.into()),
        }
    }

    pub fn infrastructure_error(detail: impl Into<String>) -> Self {
        Self {
            log_type: LogType::InfrastructureError,
            detail: Some(detail.into()),
        }
    }

    /// Redis failures are reported as plain errors
    pub fn redis_error(detail: impl Into<String>) -> Self {
        Self {
            log_type: LogType::Error,
            detail: Some(detail.into()),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Request log record
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpLog {
    #[serde(rename = "type")]
    pub log_type: LogType,
    pub detail: Option<String>,
    pub http_code: u16,
    pub timing: Option<f64>,
    pub rate_limiter: Option<String>,
    pub counter: Option<u64>,
    pub ip: Option<String>,
    pub api_key: Option<String>,
    pub user_agent: Option<String>,
    pub path: String,
    pub params: String,
    pub params_obj: BTreeMap<String, String>,
    pub params_keys: Vec<String>,
}

impl HttpLog {
    pub fn new(log_type: LogType, http_code: u16, uri: &Uri, headers: &HeaderMap) -> Self {
        let params = uri.query().unwrap_or_default().to_string();
        let params_obj: BTreeMap<String, String> = params
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let params_keys = params_obj.keys().cloned().collect();

        Self {
            log_type,
            detail: None,
            http_code,
            timing: None,
            rate_limiter: None,
            counter: None,
            ip: client_ip(headers),
            api_key: header_str(headers, "x-api-key"),
            user_agent: header_str(headers, "user-agent"),
            path: uri.path().to_string(),
            params,
            params_obj,
            params_keys,
        }
    }

    pub fn unauthorized(uri: &Uri, headers: &HeaderMap, detail: impl Into<String>) -> Self {
        let mut log = Self::new(LogType::Unauthorized, 401, uri, headers);
        log.detail = Some(detail.into());
        log
    }

    pub fn too_many_requests(uri: &Uri, headers: &HeaderMap, rate_limiter: String) -> Self {
        let mut log = Self::new(LogType::TooManyRequests, 429, uri, headers);
        log.rate_limiter = Some(rate_limiter);
        log
    }

    /// Uses the socket peer as `ip` when no proxy header named a client
    pub fn with_peer(mut self, peer: Option<SocketAddr>) -> Self {
        if self.ip.is_none() {
            self.ip = peer.map(|addr| addr.ip().to_string());
        }
        self
    }

    pub fn with_timing(mut self, timing: f64) -> Self {
        self.timing = Some(timing);
        self
    }

    pub fn with_rate_limiter(mut self, rate_limiter: Option<String>) -> Self {
        self.rate_limiter = rate_limiter;
        self
    }

    pub fn with_counter(mut self, counter: u64) -> Self {
        self.counter = Some(counter);
        self
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

/// Client address as seen by the edge proxy
fn client_ip(headers: &HeaderMap) -> Option<String> {
    header_str(headers, "x-forwarded-for")
        .and_then(|v| v.split(',').next().map(|s| s.trim().to_string()))
        .or_else(|| header_str(headers, "x-real-ip"))
}

/// One named checkpoint of a [`Timer`]
#[derive(Debug, Clone, PartialEq)]
pub struct TimerMark {
    pub key: String,
    /// ms since the previous mark
    pub since: f64,
    /// ms since the timer started
    pub total: f64,
}

/// Per-request stopwatch
#[derive(Debug)]
pub struct Timer {
    start: Instant,
    inner: Mutex<TimerState>,
}

#[derive(Debug)]
struct TimerState {
    last_mark: Instant,
    marks: Vec<TimerMark>,
}

impl Timer {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            inner: Mutex::new(TimerState {
                last_mark: now,
                marks: Vec::new(),
            }),
        }
    }

    /// Records a mark and returns the total elapsed ms
    pub fn mark(&self, key: &str) -> f64 {
        self.mark_detail(key).total
    }

    pub fn mark_detail(&self, key: &str) -> TimerMark {
        let now = Instant::now();
        let mark = TimerMark {
            key: key.to_string(),
            since: round_to(now.duration_since(self.last_mark()).as_secs_f64() * 1000.0, 1),
            total: round_to(now.duration_since(self.start).as_secs_f64() * 1000.0, 1),
        };
        if let Ok(mut state) = self.inner.lock() {
            state.last_mark = now;
            state.marks.push(mark.clone());
        }
        debug!("TIMER ({}): {}", key, mark.since);
        mark
    }

    pub fn marks(&self) -> Vec<TimerMark> {
        self.inner
            .lock()
            .map(|s| s.marks.clone())
            .unwrap_or_default()
    }

    fn last_mark(&self) -> Instant {
        self.inner
            .lock()
            .map(|s| s.last_mark)
            .unwrap_or(self.start)
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_http_log_params() {
        let uri: Uri = "/v3/locations?limit=10&iso=US&flag".parse().unwrap();
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_static("abc"));
        headers.insert("x-forwarded-for", HeaderValue::from_static("10.0.0.1, 10.0.0.2"));

        let log = HttpLog::new(LogType::Success, 200, &uri, &headers);
        assert_eq!(log.path, "/v3/locations");
        assert_eq!(log.params, "limit=10&iso=US&flag");
        assert_eq!(log.params_obj.get("iso").map(String::as_str), Some("US"));
        assert_eq!(log.params_keys, vec!["iso".to_string(), "limit".to_string()]);
        assert_eq!(log.api_key.as_deref(), Some("abc"));
        assert_eq!(log.ip.as_deref(), Some("10.0.0.1"));
    }

    #[test]
    fn test_http_log_peer_fallback() {
        let uri: Uri = "/ping".parse().unwrap();
        let peer: SocketAddr = "192.0.2.7:51000".parse().unwrap();

        let direct = HttpLog::new(LogType::Success, 200, &uri, &HeaderMap::new()).with_peer(Some(peer));
        assert_eq!(direct.ip.as_deref(), Some("192.0.2.7"));

        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("10.0.0.1"));
        let proxied = HttpLog::new(LogType::Success, 200, &uri, &headers).with_peer(Some(peer));
        assert_eq!(proxied.ip.as_deref(), Some("10.0.0.1"));

        let unknown = HttpLog::new(LogType::Success, 200, &uri, &HeaderMap::new()).with_peer(None);
        assert_eq!(unknown.ip, None);
    }

    #[test]
    fn test_http_log_json_shape() {
        let uri: Uri = "/ping".parse().unwrap();
        let log = HttpLog::too_many_requests(&uri, &HeaderMap::new(), "k:1/60/0".to_string());
        let json: serde_json::Value = serde_json::from_str(&log.to_json()).unwrap();
        assert_eq!(json["type"], "TOO_MANY_REQUESTS");
        assert_eq!(json["httpCode"], 429);
        assert_eq!(json["rateLimiter"], "k:1/60/0");
        assert!(json.get("paramsKeys").is_some());
    }

    #[test]
    fn test_base_log_json() {
        let log = BaseLog::infrastructure_error("failed to connect to redis");
        assert_eq!(
            log.to_json(),
            r#"{"type":"INFRASTRUCTURE_ERROR","detail":"failed to connect to redis"}"#
        );
    }

    #[test]
    fn test_timer_marks_accumulate() {
        let timer = Timer::new();
        let first = timer.mark_detail("db");
        let second = timer.mark_detail("fetched");
        assert!(second.total >= first.total);
        assert_eq!(timer.marks().len(), 2);
        assert_eq!(timer.marks()[1].key, "fetched");
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(1.23456, 2), 1.23);
        assert_eq!(round_to(1.25, 1), 1.3);
    }
}

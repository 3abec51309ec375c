//! API Middleware (API keys, Rate Limiting, Logging, Cache-Control)

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderValue, Method},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::handlers::AppState;
use crate::limiter::RateLimitDecision;
use crate::models::{AppError, BaseLog, ErrorCode, HttpLog, LogType, Timer};

pub const API_KEY_HEADER: &str = "x-api-key";
pub const DEFAULT_CACHE_CONTROL: &str = "public, max-age=900";

lazy_static::lazy_static! {
    /// Routes served without an API key (exact match)
    static ref ALLOWED_PATHS: Vec<&'static str> =
        vec!["/", "/openapi.json", "/docs", "/register", "/health"];

    /// Routes served without an API key (substring match)
    static ref ALLOWED_FRAGMENTS: Vec<&'static str> =
        vec!["/v2/locations/tiles", "/v3/locations/tiles", "/assets", ".css", ".js"];
}

/// `key/limit/remaining` of the request, handed to the logging middleware
#[derive(Debug, Clone)]
pub struct RateLimitSummary(pub String);

pub fn in_allowed_list(path: &str) -> bool {
    ALLOWED_PATHS.iter().any(|p| *p == path) || ALLOWED_FRAGMENTS.iter().any(|f| path.contains(f))
}

/// Socket peer, present when served with connect info
fn peer_addr(request: &Request) -> Option<SocketAddr> {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
}

fn apply_rate_headers(response: &mut Response, decision: &RateLimitDecision, api_key: &str) {
    let headers = response.headers_mut();
    for (name, value) in decision.headers() {
        headers.insert(name, HeaderValue::from(value));
    }
    response
        .extensions_mut()
        .insert(RateLimitSummary(decision.summary(api_key)));
}

/// API key authentication and rate limiting
pub async fn check_api_key(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    if in_allowed_list(request.uri().path()) {
        return next.run(request).await;
    }

    let api_key = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .unwrap_or_default();

    if let Some(explorer) = state.settings.explorer_api_key.as_deref() {
        if api_key == explorer {
            return next.run(request).await;
        }
    }

    let Some(limiter) = state.limiter.as_ref() else {
        warn!("{}", BaseLog::warn("No redis client found").to_json());
        return next.run(request).await;
    };

    if api_key.is_empty() {
        warn!(
            "{}",
            HttpLog::unauthorized(request.uri(), request.headers(), "api key not provided")
                .with_peer(peer_addr(&request))
                .to_json()
        );
        return AppError::unauthorized().into_response();
    }

    match limiter.check(&api_key, chrono::Utc::now()).await {
        Ok(decision) if decision.limited => {
            warn!(
                "{}",
                HttpLog::too_many_requests(
                    request.uri(),
                    request.headers(),
                    decision.summary(&api_key)
                )
                .with_peer(peer_addr(&request))
                .to_json()
            );
            let mut response = AppError::too_many_requests().into_response();
            apply_rate_headers(&mut response, &decision, &api_key);
            response
        }
        Ok(decision) => {
            let mut response = next.run(request).await;
            apply_rate_headers(&mut response, &decision, &api_key);
            response
        }
        Err(e) if e.code == ErrorCode::ApiUnauthorized => {
            warn!(
                "{}",
                HttpLog::unauthorized(request.uri(), request.headers(), e.message.as_str())
                    .with_peer(peer_addr(&request))
                    .to_json()
            );
            AppError::unauthorized().into_response()
        }
        Err(e) => {
            // fail open
            error!("{}", BaseLog::redis_error(e.to_string()).to_json());
            next.run(request).await
        }
    }
}

/// Request logging middleware
pub async fn logging_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let timer = Arc::new(Timer::new());
    request.extensions_mut().insert(timer.clone());
    let uri = request.uri().clone();
    let headers = request.headers().clone();
    let peer = peer_addr(&request);

    let response = next.run(request).await;

    let status = response.status().as_u16();
    let log_type = if status == 200 {
        LogType::Success
    } else {
        LogType::Warning
    };
    let rate_limiter = response
        .extensions()
        .get::<RateLimitSummary>()
        .map(|s| s.0.clone());

    let log = HttpLog::new(log_type, status, &uri, &headers)
        .with_peer(peer)
        .with_timing(timer.mark("response"))
        .with_rate_limiter(rate_limiter)
        .with_counter(state.increment_counter());

    if log_type == LogType::Success {
        info!("{}", log.to_json());
    } else {
        warn!("{}", log.to_json());
    }

    response
}

/// Default `Cache-Control` for cacheable responses
pub async fn cache_control_middleware(request: Request, next: Next) -> Response {
    let cacheable = matches!(*request.method(), Method::GET | Method::HEAD);
    let mut response = next.run(request).await;

    if cacheable
        && response.status().as_u16() < 500
        && !response.headers().contains_key(header::CACHE_CONTROL)
    {
        response.headers_mut().insert(
            header::CACHE_CONTROL,
            HeaderValue::from_static(DEFAULT_CACHE_CONTROL),
        );
    }
    response
}

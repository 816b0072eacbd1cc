use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;

use crate::services::AppState;

const ANSWER_RATE_LIMIT_PER_IP: u32 = 120; // submissions per window
const ANSWER_RATE_WINDOW_SECONDS: u64 = 60;

// Fixed window: the first hit creates the key with a TTL, later hits count up
// to the limit.
const RATE_LIMIT_SCRIPT: &str = r#"
    local key = KEYS[1]
    local limit = tonumber(ARGV[1])
    local window = tonumber(ARGV[2])

    local current = redis.call('GET', key)

    if current == false then
        redis.call('SET', key, 1, 'EX', window)
        return 1
    end

    current = tonumber(current)

    if current >= limit then
        return 0
    end

    redis.call('INCR', key)
    return 1
"#;

fn extract_client_ip_from(headers: &HeaderMap, extensions: &axum::http::Extensions) -> String {
    // Preferred order: X-Forwarded-For, Forwarded, X-Real-IP, ConnectInfo
    if let Some(v) = headers.get("x-forwarded-for") {
        if let Ok(s) = v.to_str() {
            // x-forwarded-for can be a comma separated list; take first
            return s.split(',').next().unwrap_or(s).trim().to_string();
        }
    }

    if let Some(v) = headers.get("forwarded") {
        if let Ok(s) = v.to_str() {
            for part in s.split(';') {
                let p = part.trim();
                if let Some(val) = p.strip_prefix("for=") {
                    return val.trim().trim_matches('"').to_string();
                }
            }
        }
    }

    if let Some(v) = headers.get("x-real-ip") {
        if let Ok(s) = v.to_str() {
            return s.trim().to_string();
        }
    }

    if let Some(ci) = extensions.get::<ConnectInfo<SocketAddr>>() {
        return ci.0.ip().to_string();
    }

    "unknown".to_string()
}

/// Client address a request is rate limited under.
pub fn client_ip(request: &Request) -> String {
    extract_client_ip_from(request.headers(), request.extensions())
}

#[derive(Debug, Error)]
#[error("rate limiter unavailable: {0}")]
pub struct RateLimitError(pub String);

/// Fixed-window counter backing the answer rate limit.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Counts one hit against `key`; `false` once the window holds `limit`
    /// hits.
    async fn allow(&self, key: &str, limit: u32, window_seconds: u64)
        -> Result<bool, RateLimitError>;
}

pub struct RedisRateLimiter {
    redis: ConnectionManager,
}

impl RedisRateLimiter {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl RateLimiter for RedisRateLimiter {
    async fn allow(
        &self,
        key: &str,
        limit: u32,
        window_seconds: u64,
    ) -> Result<bool, RateLimitError> {
        let mut conn = self.redis.clone();

        let allowed: u32 = redis::Script::new(RATE_LIMIT_SCRIPT)
            .key(key)
            .arg(limit)
            .arg(window_seconds)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| RateLimitError(e.to_string()))?;

        Ok(allowed == 1)
    }
}

/// Limits answer submissions per client IP. Passes through when no limiter
/// is configured or `RATE_LIMIT_DISABLED=1`; limiter errors fail open.
pub async fn answer_rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(limiter) = state.rate_limiter.as_ref() else {
        return next.run(request).await;
    };

    let rate_limit_disabled = std::env::var("RATE_LIMIT_DISABLED").unwrap_or_default() == "1";
    if rate_limit_disabled {
        return next.run(request).await;
    }

    let client_ip = client_ip(&request);
    let limit = std::env::var("RATE_LIMIT_PER_IP")
        .ok()
        .and_then(|s| s.parse::<u32>().ok())
        .unwrap_or(ANSWER_RATE_LIMIT_PER_IP);

    match limiter
        .allow(
            &format!("ratelimit:answers:{}", client_ip),
            limit,
            ANSWER_RATE_WINDOW_SECONDS,
        )
        .await
    {
        Ok(true) => next.run(request).await,
        Ok(false) => {
            tracing::warn!("Answer rate limit exceeded for IP: {}", client_ip);
            (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({
                    "error": "rate_limited",
                    "message": "Too many answer submissions, slow down",
                })),
            )
                .into_response()
        }
        Err(e) => {
            tracing::warn!("Rate limit check failed, allowing request: {}", e);
            next.run(request).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_client_ip_x_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "1.2.3.4, 10.0.0.1".parse().unwrap());
        let exts = axum::http::Extensions::new();
        assert_eq!(extract_client_ip_from(&headers, &exts), "1.2.3.4");
    }

    #[test]
    fn test_extract_client_ip_forwarded() {
        let mut headers = HeaderMap::new();
        headers.insert("forwarded", "for=\"5.6.7.8\"; proto=http".parse().unwrap());
        let exts = axum::http::Extensions::new();
        assert_eq!(extract_client_ip_from(&headers, &exts), "5.6.7.8");
    }

    #[test]
    fn test_extract_client_ip_connect_info() {
        let headers = HeaderMap::new();
        let mut exts = axum::http::Extensions::new();
        let addr: SocketAddr = "9.9.9.9:4000".parse().unwrap();
        exts.insert(ConnectInfo(addr));
        assert_eq!(extract_client_ip_from(&headers, &exts), "9.9.9.9");
    }

    #[test]
    fn test_extract_client_ip_unknown() {
        let headers = HeaderMap::new();
        let exts = axum::http::Extensions::new();
        assert_eq!(extract_client_ip_from(&headers, &exts), "unknown");
    }
}

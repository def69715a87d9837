//! Per-IP Rate Limiting
//!
//! True sliding window: each client keeps the timestamps of its requests
//! inside the window; a request is allowed when fewer than the limit
//! remain after pruning. Breaches answer 429 with a Retry-After hint.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::RateLimitConfig;
use crate::utils::ApiError;

pub struct SlidingWindowLimiter {
    windows: DashMap<String, VecDeque<Instant>>,
    max_requests: usize,
    window: Duration,
}

impl SlidingWindowLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            windows: DashMap::new(),
            max_requests: config.max_requests.max(1) as usize,
            window: Duration::from_secs(config.window_seconds.max(1)),
        }
    }

    /// Record one request for `key`. On breach returns the seconds until
    /// the oldest in-window request expires.
    pub fn check(&self, key: &str) -> Result<(), u64> {
        let now = Instant::now();
        let mut window = self.windows.entry(key.to_string()).or_default();

        while window
            .front()
            .is_some_and(|t| now.duration_since(*t) >= self.window)
        {
            window.pop_front();
        }

        if window.len() >= self.max_requests {
            let oldest = window.front().copied().unwrap_or(now);
            let retry_after = self
                .window
                .saturating_sub(now.duration_since(oldest))
                .as_secs()
                .max(1);
            return Err(retry_after);
        }

        window.push_back(now);
        Ok(())
    }

    /// Number of clients currently tracked (monitoring only).
    pub fn tracked_clients(&self) -> usize {
        self.windows.len()
    }
}

#[derive(Clone)]
pub struct RateLimitState {
    pub limiter: Arc<SlidingWindowLimiter>,
}

pub async fn rate_limit_middleware(
    State(state): State<RateLimitState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let key = client_key(&req);

    if let Err(retry_after) = state.limiter.check(&key) {
        tracing::warn!(client = %key, retry_after, "rate limit breached");
        return Err(ApiError::rate_limited(retry_after));
    }

    Ok(next.run(req).await)
}

/// Client key: first hop of x-forwarded-for when present (reverse-proxy
/// deployments), otherwise the socket peer address.
fn client_key(req: &Request) -> String {
    if let Some(forwarded) = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return forwarded.to_string();
    }

    req.extensions()
        .get::<axum::extract::ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max: u32, window_secs: u64) -> SlidingWindowLimiter {
        SlidingWindowLimiter::new(&RateLimitConfig {
            max_requests: max,
            window_seconds: window_secs,
        })
    }

    #[test]
    fn allows_up_to_limit_then_rejects() {
        let l = limiter(3, 60);
        assert!(l.check("1.2.3.4").is_ok());
        assert!(l.check("1.2.3.4").is_ok());
        assert!(l.check("1.2.3.4").is_ok());
        let retry_after = l.check("1.2.3.4").unwrap_err();
        assert!(retry_after >= 1 && retry_after <= 60);
    }

    #[test]
    fn clients_are_isolated() {
        let l = limiter(1, 60);
        assert!(l.check("1.1.1.1").is_ok());
        assert!(l.check("2.2.2.2").is_ok());
        assert!(l.check("1.1.1.1").is_err());
    }

    #[test]
    fn window_slides() {
        let l = limiter(2, 1);
        assert!(l.check("a").is_ok());
        assert!(l.check("a").is_ok());
        assert!(l.check("a").is_err());
        std::thread::sleep(Duration::from_millis(1100));
        assert!(l.check("a").is_ok());
    }
}

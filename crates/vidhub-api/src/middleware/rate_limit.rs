//! Fixed-window rate limiting.
//!
//! The global limiter runs before auth in the middleware chain, so it
//! resolves the caller's identity itself: a verifiable access token
//! keys the window by subject, anything else falls back to the remote
//! address. Category limiters (auth, upload) reuse the same window
//! machinery with their own limits and key choices.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderValue,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::auth::middleware::resolve_access_token;
use crate::auth::tokens::TokenVerification;
use crate::error::HttpAppError;
use crate::state::AppState;
use vidhub_core::config::RateLimitConfig;
use vidhub_core::AppError;

const SHARD_COUNT: usize = 16;
const MAX_BUCKETS_PER_SHARD: usize = 10_000;

#[derive(Clone)]
struct Bucket {
    count: u32,
    reset_at: Instant,
}

impl Bucket {
    fn new(window: Duration) -> Self {
        Self {
            count: 0,
            reset_at: Instant::now() + window,
        }
    }

    fn check_and_increment(&mut self, limit: u32, window: Duration) -> (bool, u32) {
        let now = Instant::now();
        if now >= self.reset_at {
            self.count = 0;
            self.reset_at = now + window;
        }
        if self.count < limit {
            self.count += 1;
            (true, limit.saturating_sub(self.count))
        } else {
            (false, 0)
        }
    }

    fn reset_in(&self) -> Duration {
        self.reset_at.saturating_duration_since(Instant::now())
    }
}

/// Sharded fixed-window counter keyed by an arbitrary identity string.
#[derive(Clone)]
pub struct FixedWindowLimiter {
    shards: Vec<Arc<Mutex<HashMap<String, Bucket>>>>,
    limit: u32,
    window: Duration,
}

impl FixedWindowLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        let shards = (0..SHARD_COUNT)
            .map(|_| Arc::new(Mutex::new(HashMap::new())))
            .collect();
        Self {
            shards,
            limit,
            window,
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    fn shard_index(&self, key: &str) -> usize {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % self.shards.len()
    }

    /// Returns the remaining budget, or how long until the window
    /// resets when the limit is exhausted.
    pub async fn check(&self, key: &str) -> Result<u32, Duration> {
        let shard = &self.shards[self.shard_index(key)];
        let mut buckets = shard.lock().await;

        // Bound memory: drop expired buckets once a shard grows large.
        if buckets.len() >= MAX_BUCKETS_PER_SHARD {
            let now = Instant::now();
            buckets.retain(|_, bucket| bucket.reset_at > now);
        }

        let window = self.window;
        let bucket = buckets
            .entry(key.to_string())
            .or_insert_with(|| Bucket::new(window));

        let (allowed, remaining) = bucket.check_and_increment(self.limit, window);
        if allowed {
            Ok(remaining)
        } else {
            Err(bucket.reset_in())
        }
    }
}

/// The application's limiter set.
#[derive(Clone)]
pub struct Limiters {
    pub global: FixedWindowLimiter,
    pub auth: FixedWindowLimiter,
    pub upload: FixedWindowLimiter,
}

impl Limiters {
    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self {
            global: FixedWindowLimiter::new(config.per_minute, Duration::from_secs(60)),
            auth: FixedWindowLimiter::new(
                config.auth_attempts,
                Duration::from_secs(config.auth_window_secs),
            ),
            upload: FixedWindowLimiter::new(config.uploads_per_hour, Duration::from_secs(3600)),
        }
    }
}

fn remote_ip(request: &Request) -> String {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Identity for the global window: verified subject when the request
/// carries a good token, remote address otherwise.
fn client_identity(state: &AppState, request: &Request) -> String {
    if let Some(token) = resolve_access_token(request.headers(), request.uri()) {
        if let TokenVerification::Valid(claims) = state.tokens.verify_access(&token) {
            return format!("subject:{}", claims.sub);
        }
    }
    format!("ip:{}", remote_ip(request))
}

fn too_many_requests(limit: u32, reset_in: Duration) -> Response {
    let mut response = HttpAppError(AppError::RateLimited).into_response();
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&limit.to_string()) {
        headers.insert("X-RateLimit-Limit", value);
    }
    headers.insert("X-RateLimit-Remaining", HeaderValue::from_static("0"));
    if let Ok(value) = HeaderValue::from_str(&reset_in.as_secs().max(1).to_string()) {
        headers.insert("Retry-After", value);
    }
    response
}

/// Global fixed-window limit for every API route.
pub async fn global_rate_limit(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let key = client_identity(&state, &request);
    let limiter = &state.limiters.global;

    match limiter.check(&key).await {
        Ok(remaining) => {
            let mut response = next.run(request).await;
            let headers = response.headers_mut();
            if let Ok(value) = HeaderValue::from_str(&limiter.limit().to_string()) {
                headers.insert("X-RateLimit-Limit", value);
            }
            if let Ok(value) = HeaderValue::from_str(&remaining.to_string()) {
                headers.insert("X-RateLimit-Remaining", value);
            }
            response
        }
        Err(reset_in) => {
            tracing::warn!(key = %key, "Global rate limit exceeded");
            too_many_requests(limiter.limit(), reset_in)
        }
    }
}

/// Strict limiter for credential endpoints, keyed by remote address.
pub async fn auth_rate_limit(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let key = format!("ip:{}", remote_ip(&request));
    match state.limiters.auth.check(&key).await {
        Ok(_) => next.run(request).await,
        Err(reset_in) => {
            tracing::warn!(key = %key, "Auth rate limit exceeded");
            too_many_requests(state.limiters.auth.limit(), reset_in)
        }
    }
}

/// Hourly upload cap per subject. Runs after auth, so the context is
/// present.
pub async fn upload_rate_limit(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let key = request
        .extensions()
        .get::<crate::auth::models::AuthContext>()
        .map(|ctx| format!("subject:{}", ctx.subject_id))
        .unwrap_or_else(|| format!("ip:{}", remote_ip(&request)));

    match state.limiters.upload.check(&key).await {
        Ok(_) => next.run(request).await,
        Err(reset_in) => {
            tracing::warn!(key = %key, "Upload rate limit exceeded");
            too_many_requests(state.limiters.upload.limit(), reset_in)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn window_exhausts_then_resets() {
        let limiter = FixedWindowLimiter::new(3, Duration::from_millis(50));

        assert_eq!(limiter.check("k").await.unwrap(), 2);
        assert_eq!(limiter.check("k").await.unwrap(), 1);
        assert_eq!(limiter.check("k").await.unwrap(), 0);
        assert!(limiter.check("k").await.is_err());

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(limiter.check("k").await.is_ok());
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let limiter = FixedWindowLimiter::new(1, Duration::from_secs(60));
        assert!(limiter.check("a").await.is_ok());
        assert!(limiter.check("b").await.is_ok());
        assert!(limiter.check("a").await.is_err());
    }

    #[tokio::test]
    async fn reset_in_is_bounded_by_window() {
        let limiter = FixedWindowLimiter::new(1, Duration::from_secs(30));
        limiter.check("k").await.unwrap();
        let reset_in = limiter.check("k").await.unwrap_err();
        assert!(reset_in <= Duration::from_secs(30));
    }
}

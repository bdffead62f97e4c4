//! Per-client request rate limiting.
//!
//! DESIGN
//! ======
//! Sliding-log counters: every accepted request leaves a timestamp under the
//! client's key and a request is admitted while fewer than `limit`
//! timestamps fall inside the trailing window. Rejected requests are not
//! recorded, so a client that backs off regains capacity as its oldest
//! entries age out.
//!
//! `RateLimiter` owns the policy (limit, window, clock). Storage sits behind
//! `RateLimitStore`:
//! - `MemoryStore`: `HashMap<String, VecDeque<u64>>`, process-local.
//! - `RedisStore`: one sorted set per key, updated by a Lua script so the
//!   prune/count/insert sequence is atomic across instances.
//!
//! TRADE-OFFS
//! ==========
//! When the store errors (Redis down), the middleware lets the request
//! through and logs a warning. Availability wins over strict enforcement.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header};
use axum::middleware::Next;
use axum::response::Response;
use uuid::Uuid;

use crate::cache::Cache;
use crate::error::json_error;
use crate::state::AppState;

pub const REJECTION_MESSAGE: &str = "Too many requests from this IP, please try again later.";

const RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("ratelimit-limit");
const RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("ratelimit-remaining");
const RATELIMIT_RESET: HeaderName = HeaderName::from_static("ratelimit-reset");
const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

const REDIS_KEY_PREFIX: &str = "ratelimit:";

// =============================================================================
// ERROR TYPE
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    #[error("rate limit store unavailable: {0}")]
    Store(#[from] redis::RedisError),
}

// =============================================================================
// CLOCK
// =============================================================================

/// Wall-clock milliseconds. Wall time rather than `Instant` so instances
/// sharing a Redis store agree on window boundaries.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0)
    }
}

// =============================================================================
// STORE
// =============================================================================

/// Outcome of one `RateLimitStore::hit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    /// Requests left in the current window after this one.
    pub remaining: usize,
    /// Time until the oldest counted request leaves the window.
    pub reset_after: Duration,
}

#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Admit and record a request for `key` if fewer than `limit` requests
    /// were recorded in the `window` ending at `now_ms`.
    async fn hit(&self, key: &str, now_ms: u64, window: Duration, limit: usize) -> Result<Decision, RateLimitError>;

    /// Drop bookkeeping for keys with no requests left in the window.
    async fn sweep(&self, _now_ms: u64, _window: Duration) {}
}

/// Process-local store. Counts are not shared between server instances.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, VecDeque<u64>>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) fn tracked_keys(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl RateLimitStore for MemoryStore {
    async fn hit(&self, key: &str, now_ms: u64, window: Duration, limit: usize) -> Result<Decision, RateLimitError> {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let window_ms = duration_ms(window);

        let log = entries.entry(key.to_owned()).or_default();
        prune_window(log, now_ms, window_ms);

        if log.len() >= limit {
            return Ok(Decision {
                allowed: false,
                remaining: 0,
                reset_after: reset_after(log.front().copied(), now_ms, window_ms),
            });
        }

        log.push_back(now_ms);
        Ok(Decision {
            allowed: true,
            remaining: limit - log.len(),
            reset_after: reset_after(log.front().copied(), now_ms, window_ms),
        })
    }

    async fn sweep(&self, now_ms: u64, window: Duration) {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let window_ms = duration_ms(window);
        entries.retain(|_, log| {
            prune_window(log, now_ms, window_ms);
            !log.is_empty()
        });
    }
}

/// Store shared through Redis. Each key is a sorted set of request
/// timestamps that expires on its own once idle for a full window.
pub struct RedisStore {
    cache: Cache,
    script: redis::Script,
}

const SLIDING_WINDOW_SCRIPT: &str = r"
local now = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local limit = tonumber(ARGV[3])
redis.call('ZREMRANGEBYSCORE', KEYS[1], '-inf', now - window)
local count = redis.call('ZCARD', KEYS[1])
local oldest = redis.call('ZRANGE', KEYS[1], 0, 0, 'WITHSCORES')
local oldest_ts = now
if oldest[2] then
  oldest_ts = tonumber(oldest[2])
end
if count >= limit then
  return {0, count, oldest_ts}
end
redis.call('ZADD', KEYS[1], now, ARGV[4])
redis.call('PEXPIRE', KEYS[1], window)
return {1, count + 1, oldest_ts}
";

impl RedisStore {
    #[must_use]
    pub fn new(cache: Cache) -> Self {
        Self { cache, script: redis::Script::new(SLIDING_WINDOW_SCRIPT) }
    }
}

#[async_trait]
impl RateLimitStore for RedisStore {
    async fn hit(&self, key: &str, now_ms: u64, window: Duration, limit: usize) -> Result<Decision, RateLimitError> {
        let mut conn = self.cache.connection();
        let window_ms = duration_ms(window);
        let member = format!("{now_ms}-{}", Uuid::new_v4());

        let (allowed, count, oldest): (i64, u64, u64) = self
            .script
            .key(format!("{REDIS_KEY_PREFIX}{key}"))
            .arg(now_ms)
            .arg(window_ms)
            .arg(limit)
            .arg(member)
            .invoke_async(&mut conn)
            .await?;

        let count = usize::try_from(count).unwrap_or(usize::MAX);
        Ok(Decision {
            allowed: allowed == 1,
            remaining: limit.saturating_sub(count),
            reset_after: reset_after(Some(oldest), now_ms, window_ms),
        })
    }
}

// =============================================================================
// RATE LIMITER
// =============================================================================

#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    clock: Arc<dyn Clock>,
    limit: usize,
    window: Duration,
}

impl RateLimiter {
    #[must_use]
    pub fn new(store: Arc<dyn RateLimitStore>, clock: Arc<dyn Clock>, limit: usize, window: Duration) -> Self {
        Self { store, clock, limit, window }
    }

    /// Process-local limiter on the system clock.
    #[must_use]
    pub fn in_memory(limit: usize, window: Duration) -> Self {
        Self::new(Arc::new(MemoryStore::new()), Arc::new(SystemClock), limit, window)
    }

    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }

    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Check the limit for `client` and record the request if admitted.
    pub async fn check(&self, client: &str) -> Result<Decision, RateLimitError> {
        let now = self.clock.now_ms();
        self.store.hit(client, now, self.window, self.limit).await
    }

    pub async fn sweep(&self) {
        self.store.sweep(self.clock.now_ms(), self.window).await;
    }
}

/// Periodically drop idle keys so the in-memory map does not grow with
/// every address ever seen. Returns a handle the lifecycle aborts on exit.
pub fn spawn_sweeper(limiter: RateLimiter, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            limiter.sweep().await;
        }
    })
}

// =============================================================================
// MIDDLEWARE
// =============================================================================

pub async fn rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let client = client_key(&request, state.config.trust_proxy);
    let limiter = &state.rate_limiter;

    match limiter.check(&client).await {
        Ok(decision) if decision.allowed => {
            let mut response = next.run(request).await;
            apply_headers(response.headers_mut(), limiter.limit(), decision);
            response
        }
        Ok(decision) => {
            tracing::warn!(%client, "rate limit exceeded");
            let mut response = json_error(StatusCode::TOO_MANY_REQUESTS, "Too many requests", REJECTION_MESSAGE);
            apply_headers(response.headers_mut(), limiter.limit(), decision);
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(ceil_secs(decision.reset_after)));
            response
        }
        Err(e) => {
            tracing::warn!(%client, error = %e, "rate limiter unavailable, admitting request");
            next.run(request).await
        }
    }
}

/// Identify the client: peer IP, or the first forwarded hop behind a
/// trusted proxy.
pub(crate) fn client_key(request: &Request, trust_proxy: bool) -> String {
    if trust_proxy {
        if let Some(forwarded) = request
            .headers()
            .get(X_FORWARDED_FOR)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
        {
            return forwarded.to_owned();
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map_or_else(|| "unknown".to_owned(), |ConnectInfo(addr)| addr.ip().to_string())
}

fn apply_headers(headers: &mut HeaderMap, limit: usize, decision: Decision) {
    headers.insert(RATELIMIT_LIMIT, HeaderValue::from(limit));
    headers.insert(RATELIMIT_REMAINING, HeaderValue::from(decision.remaining));
    headers.insert(RATELIMIT_RESET, HeaderValue::from(ceil_secs(decision.reset_after)));
}

// =============================================================================
// HELPERS
// =============================================================================

fn prune_window(log: &mut VecDeque<u64>, now_ms: u64, window_ms: u64) {
    while let Some(&front) = log.front() {
        if now_ms.saturating_sub(front) >= window_ms {
            log.pop_front();
        } else {
            break;
        }
    }
}

fn reset_after(oldest_ms: Option<u64>, now_ms: u64, window_ms: u64) -> Duration {
    let oldest = oldest_ms.unwrap_or(now_ms);
    Duration::from_millis((oldest + window_ms).saturating_sub(now_ms))
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

fn ceil_secs(d: Duration) -> u64 {
    d.as_secs() + u64::from(d.subsec_nanos() > 0)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[path = "rate_limit_test.rs"]
mod tests;

//! Client-side request pacing for the Drive API
//!
//! Drive enforces per-user quotas that differ by request kind: metadata
//! listings are cheap, writes and media uploads are throttled harder. The
//! limiter keeps one token bucket per [`RequestClass`] so a burst of uploads
//! does not starve the listing phase.
//!
//! ## Design Notes
//!
//! - Buckets are sized from [`RateLimitingConfig`]: a class allowed `n`
//!   requests per minute gets a bucket of capacity `n` refilling at `n / 60`
//!   tokens per second.
//! - A throttle response (429, or 403 with a rate-limit reason) halves the
//!   effective capacity of the class. Every 100 successes recover 5% of it.
//! - The limiter never retries. Retrying belongs to the sync engine's retry
//!   policy, which honours the `Retry-After` value parsed here.

use std::{
    fmt,
    sync::{Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use drivemirror_core::config::RateLimitingConfig;
use tracing::{debug, warn};

/// Successes needed before capacity is raised again
const RECOVERY_INTERVAL: u64 = 100;

/// Upper bound accepted for an HTTP-date `Retry-After`
const MAX_RETRY_AFTER_SECS: u64 = 3600;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// RequestClass
// ============================================================================

/// Kind of Drive request, each with its own budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestClass {
    /// `files.list` and other metadata reads
    List,
    /// Folder creation and deletion
    Write,
    /// Media uploads (create and update)
    Upload,
}

impl RequestClass {
    pub const ALL: [RequestClass; 3] = [Self::List, Self::Write, Self::Upload];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::List => "list",
            Self::Write => "write",
            Self::Upload => "upload",
        }
    }

    fn index(self) -> usize {
        match self {
            Self::List => 0,
            Self::Write => 1,
            Self::Upload => 2,
        }
    }
}

impl fmt::Display for RequestClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// TokenBucket
// ============================================================================

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
    effective_capacity: u32,
    successes: u64,
}

/// Token bucket with adaptive capacity
///
/// Tokens are fractional so the refill is smooth. The effective capacity can
/// drop below the configured one after throttling, never below 1.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: u32,
    refill_rate: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// Creates a full bucket
    pub fn new(capacity: u32, refill_rate: f64) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            refill_rate,
            state: Mutex::new(BucketState {
                tokens: f64::from(capacity),
                last_refill: Instant::now(),
                effective_capacity: capacity,
                successes: 0,
            }),
        }
    }

    /// Bucket allowing `per_minute` requests per minute
    pub fn per_minute(per_minute: u32) -> Self {
        Self::new(per_minute, f64::from(per_minute) / 60.0)
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        if elapsed > 0.0 {
            state.tokens = (state.tokens + elapsed * self.refill_rate)
                .min(f64::from(state.effective_capacity));
            state.last_refill = now;
        }
    }

    /// Takes one token if available
    pub fn try_acquire(&self) -> bool {
        let mut state = lock(&self.state);
        self.refill(&mut state);
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Time until one token is available, zero if one already is
    pub fn time_until_available(&self) -> Duration {
        let mut state = lock(&self.state);
        self.refill(&mut state);
        if state.tokens >= 1.0 {
            return Duration::ZERO;
        }
        if self.refill_rate <= 0.0 {
            return Duration::MAX;
        }
        Duration::from_secs_f64((1.0 - state.tokens) / self.refill_rate)
    }

    pub fn available_tokens(&self) -> f64 {
        let mut state = lock(&self.state);
        self.refill(&mut state);
        state.tokens
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn effective_capacity(&self) -> u32 {
        lock(&self.state).effective_capacity
    }

    /// Records a successful call; every 100th raises capacity by 5%
    pub fn on_success(&self) {
        let mut state = lock(&self.state);
        state.successes += 1;
        if state.successes % RECOVERY_INTERVAL == 0 && state.effective_capacity < self.capacity {
            let increase = ((f64::from(state.effective_capacity) * 0.05) as u32).max(1);
            let new_capacity = (state.effective_capacity + increase).min(self.capacity);
            debug!(
                old_capacity = state.effective_capacity,
                new_capacity,
                successes = state.successes,
                "Recovering bucket capacity"
            );
            state.effective_capacity = new_capacity;
        }
    }

    /// Records a throttle response: halves capacity and resets the success streak
    pub fn on_throttle(&self) {
        let mut state = lock(&self.state);
        let old = state.effective_capacity;
        state.effective_capacity = (old / 2).max(1);
        state.tokens = state.tokens.min(f64::from(state.effective_capacity));
        state.successes = 0;
        warn!(
            old_capacity = old,
            new_capacity = state.effective_capacity,
            "Throttled by server, halving bucket capacity"
        );
    }
}

// ============================================================================
// AdaptiveRateLimiter
// ============================================================================

/// One adaptive bucket per [`RequestClass`]
///
/// Shared between concurrent tasks through `Arc<AdaptiveRateLimiter>`.
pub struct AdaptiveRateLimiter {
    buckets: [TokenBucket; 3],
}

impl fmt::Debug for AdaptiveRateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("AdaptiveRateLimiter");
        for class in RequestClass::ALL {
            s.field(class.as_str(), &self.bucket(class).effective_capacity());
        }
        s.finish()
    }
}

impl AdaptiveRateLimiter {
    pub fn new(config: &RateLimitingConfig) -> Self {
        Self {
            buckets: [
                TokenBucket::per_minute(config.list_requests_per_minute),
                TokenBucket::per_minute(config.write_requests_per_minute),
                TokenBucket::per_minute(config.upload_requests_per_minute),
            ],
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(&RateLimitingConfig::default())
    }

    fn bucket(&self, class: RequestClass) -> &TokenBucket {
        &self.buckets[class.index()]
    }

    /// Waits until a token for `class` is available and takes it
    pub async fn acquire(&self, class: RequestClass) {
        loop {
            let bucket = self.bucket(class);
            if bucket.try_acquire() {
                return;
            }
            let wait = bucket.time_until_available().max(Duration::from_millis(10));
            debug!(class = %class, wait_ms = wait.as_millis() as u64, "Waiting for rate limit token");
            tokio::time::sleep(wait).await;
        }
    }

    pub fn on_success(&self, class: RequestClass) {
        self.bucket(class).on_success();
    }

    pub fn on_throttle(&self, class: RequestClass) {
        warn!(class = %class, "Recording throttle event");
        self.bucket(class).on_throttle();
    }

    pub fn available_tokens(&self, class: RequestClass) -> f64 {
        self.bucket(class).available_tokens()
    }

    pub fn effective_capacity(&self, class: RequestClass) -> u32 {
        self.bucket(class).effective_capacity()
    }
}

// ============================================================================
// Retry-After parsing
// ============================================================================

/// Parses a `Retry-After` header value
///
/// Accepts delay-seconds (`"30"`) or an HTTP-date no more than an hour
/// ahead. Anything else yields `None`.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    if let Ok(date) = chrono::DateTime::parse_from_rfc2822(value) {
        let diff = date.with_timezone(&chrono::Utc) - chrono::Utc::now();
        return u64::try_from(diff.num_seconds())
            .ok()
            .filter(|&secs| secs <= MAX_RETRY_AFTER_SECS)
            .map(Duration::from_secs);
    }

    warn!(value, "Could not parse Retry-After header");
    None
}

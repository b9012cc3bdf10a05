//! Rate-limited retry wrapper for outbound API calls.
//!
//! Every attempt first waits for room in a rolling request window, then runs
//! the wrapped operation. Failures are retried with pure exponential backoff
//! (`min(base * 2^attempt, max_delay)`, no jitter). Callers that must always
//! get a usable value use [`ResilientCaller::call_or_fallback`], which tags
//! the result as [`Outcome::Generated`] or [`Outcome::Fallback`].

use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Retry ceiling and backoff bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(8000),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after failed attempt `attempt` (0-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Request ceiling per rolling window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub max_requests: usize,
    pub window: Duration,
}

impl Default for RateLimit {
    fn default() -> Self {
        Self {
            max_requests: 10,
            window: Duration::from_secs(60),
        }
    }
}

/// Sliding-window limiter over the instants of previous calls.
pub struct RateLimiter {
    limit: RateLimit,
    timestamps: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(limit: RateLimit) -> Self {
        Self {
            limit: RateLimit {
                max_requests: limit.max_requests.max(1),
                window: limit.window,
            },
            timestamps: Mutex::new(VecDeque::new()),
        }
    }

    pub fn limit(&self) -> RateLimit {
        self.limit
    }

    /// Waits until a call may be issued, then records it.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut timestamps = self.timestamps.lock().await;
                let now = Instant::now();

                while let Some(&oldest) = timestamps.front() {
                    if now.duration_since(oldest) >= self.limit.window {
                        timestamps.pop_front();
                    } else {
                        break;
                    }
                }

                match timestamps.front() {
                    Some(&oldest) if timestamps.len() >= self.limit.max_requests => {
                        self.limit.window - now.duration_since(oldest)
                    }
                    _ => {
                        timestamps.push_back(now);
                        return;
                    }
                }
            };

            tracing::debug!(
                "⏳ Rate limit reached ({} per {:?}), waiting {:?}",
                self.limit.max_requests,
                self.limit.window,
                wait
            );
            tokio::time::sleep(wait).await;
        }
    }

    /// Calls recorded inside the current window.
    pub async fn in_flight(&self) -> usize {
        let timestamps = self.timestamps.lock().await;
        let now = Instant::now();
        timestamps
            .iter()
            .filter(|t| now.duration_since(**t) < self.limit.window)
            .count()
    }
}

/// All attempts failed.
#[derive(Debug, Clone)]
pub struct RetryExhausted<E> {
    pub attempts: u32,
    pub last_error: E,
}

impl<E: fmt::Display> fmt::Display for RetryExhausted<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "gave up after {} attempt(s): {}",
            self.attempts, self.last_error
        )
    }
}

/// Live result or fallback substitute, never ambiguous.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome<T> {
    Generated { value: T },
    Fallback { value: T, reason: String },
}

impl<T> Outcome<T> {
    pub fn is_fallback(&self) -> bool {
        matches!(self, Outcome::Fallback { .. })
    }

    pub fn value(&self) -> &T {
        match self {
            Outcome::Generated { value } | Outcome::Fallback { value, .. } => value,
        }
    }

    pub fn into_value(self) -> T {
        match self {
            Outcome::Generated { value } | Outcome::Fallback { value, .. } => value,
        }
    }
}

/// Rate limiter plus retry policy, shared by every call to one upstream.
pub struct ResilientCaller {
    limiter: RateLimiter,
    policy: RetryPolicy,
}

impl ResilientCaller {
    pub fn new(limit: RateLimit, policy: RetryPolicy) -> Self {
        Self {
            limiter: RateLimiter::new(limit),
            policy: RetryPolicy {
                max_attempts: policy.max_attempts.max(1),
                ..policy
            },
        }
    }

    /// Runs `op` until it succeeds or the attempt ceiling is reached.
    ///
    /// Every error is retried the same way; the wrapped operation decides what
    /// counts as a failure.
    pub async fn call<T, E, F, Fut>(&self, name: &str, mut op: F) -> Result<T, RetryExhausted<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let mut attempt = 0;
        loop {
            self.limiter.acquire().await;

            let started = Instant::now();
            let result = op().await;
            let elapsed = started.elapsed();

            match result {
                Ok(value) => {
                    tracing::info!(
                        "✓ {} succeeded on attempt {}/{} in {:?}",
                        name,
                        attempt + 1,
                        self.policy.max_attempts,
                        elapsed
                    );
                    return Ok(value);
                }
                Err(e) => {
                    tracing::warn!(
                        "❌ {} failed on attempt {}/{} after {:?}: {}",
                        name,
                        attempt + 1,
                        self.policy.max_attempts,
                        elapsed,
                        e
                    );

                    if attempt + 1 >= self.policy.max_attempts {
                        return Err(RetryExhausted {
                            attempts: attempt + 1,
                            last_error: e,
                        });
                    }

                    let delay = self.policy.delay_for_attempt(attempt);
                    tracing::debug!("Retrying {} in {:?}", name, delay);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Like [`call`](Self::call), but exhaustion yields `fallback()` tagged as such.
    pub async fn call_or_fallback<T, E, F, Fut, FB>(
        &self,
        name: &str,
        op: F,
        fallback: FB,
    ) -> Outcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
        FB: FnOnce() -> T,
    {
        match self.call(name, op).await {
            Ok(value) => Outcome::Generated { value },
            Err(exhausted) => {
                tracing::warn!("⚠️  {} falling back to template: {}", name, exhausted);
                Outcome::Fallback {
                    value: fallback(),
                    reason: exhausted.to_string(),
                }
            }
        }
    }
}

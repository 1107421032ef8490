//! Rate limiter — two independent rolling one-minute windows shared across
//! all in-flight requests: an admitted-request counter and an admitted-token
//! sum. Admission purges expired window entries, checks both ceilings, and
//! records the admission under a single lock so concurrent callers can never
//! both claim the last unit of capacity.
//!
//! Rate limiting accounts for attempted work: admissions are never refunded,
//! even when the generation that follows fails or is abandoned.
//!
//! Uses `tokio::time::Instant` so window expiry is testable under the paused
//! test clock.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::config::RateLimitConfig;

const WINDOW: Duration = Duration::from_secs(60);

/// Rejection signal carrying the estimated seconds until the oldest window
/// entry expires, so callers can surface a retry hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimited {
    pub retry_after_secs: u64,
}

struct Windows {
    /// Admission timestamps inside the trailing window, oldest first.
    requests: VecDeque<Instant>,
    /// (admission timestamp, estimated tokens), oldest first.
    tokens: VecDeque<(Instant, u32)>,
    token_sum: u64,
}

/// Shared rolling-window rate limiter. With limiting disabled, every call
/// is admitted.
pub struct RateLimiter {
    config: RateLimitConfig,
    windows: Mutex<Windows>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: Mutex::new(Windows {
                requests: VecDeque::new(),
                tokens: VecDeque::new(),
                token_sum: 0,
            }),
        }
    }

    /// Attempts to admit one request costing `estimated_tokens`.
    /// Purge-then-check-then-record happens atomically under the lock.
    pub async fn admit(&self, estimated_tokens: u32) -> Result<(), RateLimited> {
        if !self.config.enabled {
            return Ok(());
        }

        let now = Instant::now();
        let mut windows = self.windows.lock().await;

        while let Some(&oldest) = windows.requests.front() {
            if now.duration_since(oldest) >= WINDOW {
                windows.requests.pop_front();
            } else {
                break;
            }
        }
        while let Some(&(oldest, tokens)) = windows.tokens.front() {
            if now.duration_since(oldest) >= WINDOW {
                windows.tokens.pop_front();
                windows.token_sum -= u64::from(tokens);
            } else {
                break;
            }
        }

        let over_requests =
            windows.requests.len() as u32 + 1 > self.config.max_requests_per_minute;
        let over_tokens = windows.token_sum + u64::from(estimated_tokens)
            > u64::from(self.config.max_tokens_per_minute);

        if over_requests || over_tokens {
            let rejection = RateLimited {
                retry_after_secs: retry_hint(&windows, now),
            };
            debug!(
                "rate limit rejection: requests={} tokens={} retry_after={}s",
                windows.requests.len(),
                windows.token_sum,
                rejection.retry_after_secs
            );
            return Err(rejection);
        }

        windows.requests.push_back(now);
        windows.tokens.push_back((now, estimated_tokens));
        windows.token_sum += u64::from(estimated_tokens);
        Ok(())
    }
}

/// Seconds until the oldest admitted entry leaves the window, rounded up and
/// clamped to at least one second. With no prior admissions (a single call
/// larger than the token ceiling) the hint is the full window.
fn retry_hint(windows: &Windows, now: Instant) -> u64 {
    let oldest = windows
        .requests
        .front()
        .copied()
        .into_iter()
        .chain(windows.tokens.front().map(|&(at, _)| at))
        .min();

    match oldest {
        Some(at) => {
            let remaining = WINDOW.saturating_sub(now.duration_since(at));
            (remaining.as_secs_f64().ceil() as u64).max(1)
        }
        None => WINDOW.as_secs(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(enabled: bool, max_requests: u32, max_tokens: u32) -> RateLimitConfig {
        RateLimitConfig {
            enabled,
            max_requests_per_minute: max_requests,
            max_tokens_per_minute: max_tokens,
        }
    }

    #[tokio::test]
    async fn test_disabled_limiter_always_admits() {
        let limiter = RateLimiter::new(config(false, 1, 1));
        for _ in 0..10 {
            assert!(limiter.admit(1_000_000).await.is_ok());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_ceiling_rejects_third_call_in_window() {
        let limiter = RateLimiter::new(config(true, 2, 1_000_000));
        assert!(limiter.admit(100).await.is_ok());
        assert!(limiter.admit(100).await.is_ok());

        let rejection = limiter.admit(100).await.unwrap_err();
        assert!(rejection.retry_after_secs >= 1);
        assert!(rejection.retry_after_secs <= 60);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(limiter.admit(100).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_ceiling_independent_of_request_count() {
        let limiter = RateLimiter::new(config(true, 100, 100));
        assert!(limiter.admit(60).await.is_ok());
        assert!(limiter.admit(50).await.is_err(), "60 + 50 > 100");
        assert!(limiter.admit(40).await.is_ok(), "60 + 40 fits exactly");
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_slides_rather_than_resets() {
        let limiter = RateLimiter::new(config(true, 2, 1_000_000));
        assert!(limiter.admit(1).await.is_ok());
        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(limiter.admit(1).await.is_ok());

        // 59s after the first admission both are still in the window.
        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(limiter.admit(1).await.is_err());

        // 61s after the first admission only the second remains.
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(limiter.admit(1).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_hint_tracks_oldest_entry_age() {
        let limiter = RateLimiter::new(config(true, 1, 1_000_000));
        assert!(limiter.admit(1).await.is_ok());

        tokio::time::advance(Duration::from_secs(45)).await;
        let rejection = limiter.admit(1).await.unwrap_err();
        assert_eq!(rejection.retry_after_secs, 15);
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversized_single_call_hints_full_window() {
        let limiter = RateLimiter::new(config(true, 10, 100));
        let rejection = limiter.admit(500).await.unwrap_err();
        assert_eq!(rejection.retry_after_secs, 60);
    }

    #[tokio::test]
    async fn test_concurrent_admissions_never_exceed_capacity() {
        use std::sync::Arc;

        let limiter = Arc::new(RateLimiter::new(config(true, 5, 1_000_000)));
        let mut handles = Vec::new();
        for _ in 0..20 {
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(async move { limiter.admit(1).await.is_ok() }));
        }

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 5);
    }
}

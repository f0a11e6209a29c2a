//! Per-(client IP, path) rate limiting.
//!
//! Supports three interchangeable strategies selected by
//! [`RateLimiterConfig::strategy`]: token bucket (smooth, allows bursts up
//! to the bucket capacity), sliding window (exact, tracks individual
//! request timestamps), and fixed window (cheapest, resets hard at window
//! boundaries).

use std::collections::VecDeque;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::config::schema::{RateLimiterConfig, RateLimiterStrategy};

enum BucketState {
    Token { tokens: f64, last_update: Instant },
    Sliding { timestamps: VecDeque<Instant> },
    Fixed { window_start: Instant, count: u32 },
}

struct Entry {
    last_seen: Instant,
    state: Mutex<BucketState>,
}

/// Outcome of a rate-limit check.
pub struct Decision {
    pub admitted: bool,
    pub remaining: u32,
    pub reset_secs: u64,
}

pub struct RateLimiter {
    buckets: DashMap<(IpAddr, String), Entry>,
    total_rejected: AtomicU64,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            buckets: DashMap::new(),
            total_rejected: AtomicU64::new(0),
        }
    }

    pub fn allow(&self, client_ip: IpAddr, path: &str, config: &RateLimiterConfig) -> Decision {
        if !config.enabled {
            return Decision { admitted: true, remaining: config.max_requests, reset_secs: 0 };
        }

        let key = (client_ip, path.to_string());
        let now = Instant::now();
        let entry = self.buckets.entry(key).or_insert_with(|| Entry {
            last_seen: now,
            state: Mutex::new(new_state(config.strategy, now)),
        });

        let mut state = entry.state.lock().unwrap();
        let decision = match &mut *state {
            BucketState::Token { tokens, last_update } => {
                check_token_bucket(tokens, last_update, now, config)
            }
            BucketState::Sliding { timestamps } => check_sliding_window(timestamps, now, config),
            BucketState::Fixed { window_start, count } => {
                check_fixed_window(window_start, count, now, config)
            }
        };
        drop(state);

        if !decision.admitted {
            self.total_rejected.fetch_add(1, Ordering::Relaxed);
        }
        decision
    }

    pub fn reset(&self) {
        self.buckets.clear();
        self.total_rejected.store(0, Ordering::Relaxed);
    }

    pub fn active_client_count(&self) -> usize {
        self.buckets
            .iter()
            .map(|e| e.key().0)
            .collect::<std::collections::HashSet<_>>()
            .len()
    }

    pub fn total_rejected(&self) -> u64 {
        self.total_rejected.load(Ordering::Relaxed)
    }

    /// Drop buckets idle longer than `idle_for`. Intended to run from a
    /// periodic background task so memory doesn't grow unbounded with the
    /// number of distinct clients ever seen.
    pub fn sweep(&self, idle_for: Duration) {
        let now = Instant::now();
        self.buckets.retain(|_, entry| now.duration_since(entry.last_seen) < idle_for);
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

fn new_state(strategy: RateLimiterStrategy, now: Instant) -> BucketState {
    match strategy {
        RateLimiterStrategy::TokenBucket => BucketState::Token { tokens: 0.0, last_update: now },
        RateLimiterStrategy::SlidingWindow => BucketState::Sliding { timestamps: VecDeque::new() },
        RateLimiterStrategy::FixedWindow => BucketState::Fixed { window_start: now, count: 0 },
    }
}

fn check_token_bucket(
    tokens: &mut f64,
    last_update: &mut Instant,
    now: Instant,
    config: &RateLimiterConfig,
) -> Decision {
    let capacity = config.max_requests as f64;
    let refill_rate = capacity / config.window_secs.max(1) as f64;

    if *tokens == 0.0 && now.duration_since(*last_update).as_secs_f64() == 0.0 {
        // first request for a freshly created bucket starts full
        *tokens = capacity;
    }

    let elapsed = now.duration_since(*last_update).as_secs_f64();
    *tokens = (*tokens + elapsed * refill_rate).min(capacity);
    *last_update = now;

    if *tokens >= 1.0 {
        *tokens -= 1.0;
        Decision { admitted: true, remaining: tokens.floor() as u32, reset_secs: config.window_secs }
    } else {
        Decision { admitted: false, remaining: 0, reset_secs: config.window_secs }
    }
}

fn check_sliding_window(timestamps: &mut VecDeque<Instant>, now: Instant, config: &RateLimiterConfig) -> Decision {
    let window = Duration::from_secs(config.window_secs.max(1));
    while let Some(&front) = timestamps.front() {
        if now.duration_since(front) > window {
            timestamps.pop_front();
        } else {
            break;
        }
    }

    if (timestamps.len() as u32) < config.max_requests {
        timestamps.push_back(now);
        Decision {
            admitted: true,
            remaining: config.max_requests - timestamps.len() as u32,
            reset_secs: config.window_secs,
        }
    } else {
        Decision { admitted: false, remaining: 0, reset_secs: config.window_secs }
    }
}

fn check_fixed_window(window_start: &mut Instant, count: &mut u32, now: Instant, config: &RateLimiterConfig) -> Decision {
    let window = Duration::from_secs(config.window_secs.max(1));
    if now.duration_since(*window_start) >= window {
        *window_start = now;
        *count = 0;
    }

    let reset_secs = window.saturating_sub(now.duration_since(*window_start)).as_secs();

    if *count < config.max_requests {
        *count += 1;
        Decision { admitted: true, remaining: config.max_requests - *count, reset_secs }
    } else {
        Decision { admitted: false, remaining: 0, reset_secs }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip() -> IpAddr {
        "127.0.0.1".parse().unwrap()
    }

    #[test]
    fn token_bucket_admits_up_to_capacity_then_rejects() {
        let limiter = RateLimiter::new();
        let config = RateLimiterConfig {
            enabled: true,
            strategy: RateLimiterStrategy::TokenBucket,
            max_requests: 2,
            window_secs: 60,
        };
        assert!(limiter.allow(ip(), "/", &config).admitted);
        assert!(limiter.allow(ip(), "/", &config).admitted);
        assert!(!limiter.allow(ip(), "/", &config).admitted);
    }

    #[test]
    fn sliding_window_admits_up_to_capacity_then_rejects() {
        let limiter = RateLimiter::new();
        let config = RateLimiterConfig {
            enabled: true,
            strategy: RateLimiterStrategy::SlidingWindow,
            max_requests: 2,
            window_secs: 60,
        };
        assert!(limiter.allow(ip(), "/", &config).admitted);
        assert!(limiter.allow(ip(), "/", &config).admitted);
        assert!(!limiter.allow(ip(), "/", &config).admitted);
    }

    #[test]
    fn fixed_window_admits_up_to_capacity_then_rejects() {
        let limiter = RateLimiter::new();
        let config = RateLimiterConfig {
            enabled: true,
            strategy: RateLimiterStrategy::FixedWindow,
            max_requests: 2,
            window_secs: 60,
        };
        assert!(limiter.allow(ip(), "/", &config).admitted);
        assert!(limiter.allow(ip(), "/", &config).admitted);
        assert!(!limiter.allow(ip(), "/", &config).admitted);
    }

    #[test]
    fn disabled_limiter_always_admits() {
        let limiter = RateLimiter::new();
        let config = RateLimiterConfig { enabled: false, ..Default::default() };
        for _ in 0..10 {
            assert!(limiter.allow(ip(), "/", &config).admitted);
        }
    }

    #[test]
    fn distinct_paths_get_independent_buckets() {
        let limiter = RateLimiter::new();
        let config = RateLimiterConfig {
            enabled: true,
            strategy: RateLimiterStrategy::TokenBucket,
            max_requests: 1,
            window_secs: 60,
        };
        assert!(limiter.allow(ip(), "/a", &config).admitted);
        assert!(limiter.allow(ip(), "/b", &config).admitted);
    }

    #[test]
    fn reset_clears_all_state() {
        let limiter = RateLimiter::new();
        let config = RateLimiterConfig {
            enabled: true,
            strategy: RateLimiterStrategy::TokenBucket,
            max_requests: 1,
            window_secs: 60,
        };
        assert!(limiter.allow(ip(), "/", &config).admitted);
        assert!(!limiter.allow(ip(), "/", &config).admitted);
        limiter.reset();
        assert!(limiter.allow(ip(), "/", &config).admitted);
    }
}

//! Sliding-window rate limiting for outbound DoH and RDAP queries
//!
//! Every query path (hierarchy walk, record aggregation, RDAP) draws from
//! one budget. Stale timestamps are purged lazily on each check; there is no
//! cleanup thread. Exceeding the budget is a hard rejection and the caller
//! decides whether to wait `reset_delay` and try again.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::dns::errors::LookupError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Maximum queries admitted per window
    pub max_queries: usize,
    /// Window length in milliseconds
    pub window_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        RateLimitConfig {
            max_queries: 100,
            window_ms: 60_000,
        }
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

/// Rate limiter shared by every outbound query
pub struct QueryRateLimiter {
    /// Timestamps of admitted queries, oldest first
    queries: Mutex<VecDeque<Instant>>,
    config: RateLimitConfig,
}

impl QueryRateLimiter {
    /// Create a new rate limiter with the given configuration
    pub fn new(config: RateLimitConfig) -> Self {
        QueryRateLimiter {
            queries: Mutex::new(VecDeque::with_capacity(config.max_queries)),
            config,
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// True iff another query fits into the trailing window
    pub fn admit(&self) -> bool {
        let mut queries = self.queries.lock();
        self.purge(&mut queries, Instant::now());
        queries.len() < self.config.max_queries
    }

    /// Record a query at the current instant
    pub fn record(&self) {
        self.queries.lock().push_back(Instant::now());
    }

    /// Queries left in the current window
    pub fn remaining(&self) -> usize {
        let mut queries = self.queries.lock();
        self.purge(&mut queries, Instant::now());
        self.config.max_queries.saturating_sub(queries.len())
    }

    /// Time until the oldest retained query leaves the window
    pub fn reset_delay(&self) -> Duration {
        let now = Instant::now();
        let queries = self.queries.lock();
        match queries.front() {
            Some(&oldest) => self
                .config
                .window()
                .checked_sub(now.saturating_duration_since(oldest))
                .unwrap_or_default(),
            None => Duration::from_millis(0),
        }
    }

    pub fn reset_delay_ms(&self) -> u64 {
        self.reset_delay().as_millis() as u64
    }

    /// Admit and record under a single lock, so concurrent callers cannot
    /// both take the last slot
    pub fn check_and_record(&self) -> Result<(), LookupError> {
        let now = Instant::now();
        let mut queries = self.queries.lock();
        self.purge(&mut queries, now);

        if queries.len() >= self.config.max_queries {
            let reset_delay_ms = queries
                .front()
                .and_then(|&oldest| {
                    self.config
                        .window()
                        .checked_sub(now.saturating_duration_since(oldest))
                })
                .unwrap_or_default()
                .as_millis() as u64;
            log::warn!(
                "Query budget of {} per {:?} spent, resets in {}ms",
                self.config.max_queries,
                self.config.window(),
                reset_delay_ms
            );
            return Err(LookupError::RateLimited { reset_delay_ms });
        }

        queries.push_back(now);
        Ok(())
    }

    fn purge(&self, queries: &mut VecDeque<Instant>, now: Instant) {
        let window = self.config.window();
        while let Some(&oldest) = queries.front() {
            if now.saturating_duration_since(oldest) >= window {
                queries.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn limiter(max_queries: usize, window_ms: u64) -> QueryRateLimiter {
        QueryRateLimiter::new(RateLimitConfig {
            max_queries,
            window_ms,
        })
    }

    #[test]
    fn test_rate_limiter_window() {
        let limiter = limiter(5, 100);

        // First 5 queries should succeed
        for _ in 0..5 {
            assert!(limiter.admit());
            limiter.record();
        }

        // 6th query should fail
        assert!(!limiter.admit());
        assert_eq!(limiter.remaining(), 0);

        // After waiting for the window, should succeed again
        thread::sleep(Duration::from_millis(110));
        assert!(limiter.admit());
        assert_eq!(limiter.remaining(), 5);
    }

    #[test]
    fn test_reset_delay() {
        let limiter = limiter(2, 1_000);
        assert_eq!(limiter.reset_delay_ms(), 0);

        limiter.record();
        let delay = limiter.reset_delay();
        assert!(delay <= Duration::from_millis(1_000));
        assert!(delay > Duration::from_millis(900));
    }

    #[test]
    fn test_check_and_record() {
        let limiter = limiter(3, 500);
        for _ in 0..3 {
            assert!(limiter.check_and_record().is_ok());
        }

        match limiter.check_and_record() {
            Err(LookupError::RateLimited { reset_delay_ms }) => {
                assert!(reset_delay_ms > 0);
                assert!(reset_delay_ms <= 500);
            }
            other => panic!("Expected rate limit error, got {:?}", other),
        }

        // Rejected queries are not recorded
        assert_eq!(limiter.remaining(), 0);
        assert_eq!(limiter.queries.lock().len(), 3);
    }

    #[test]
    fn test_default_config() {
        let config = RateLimitConfig::default();
        assert_eq!(config.max_queries, 100);
        assert_eq!(config.window(), Duration::from_secs(60));
    }

    #[test]
    fn test_concurrent_access() {
        let limiter = Arc::new(limiter(40, 10_000));
        let mut handles = vec![];

        for _ in 0..4 {
            let limiter_clone = Arc::clone(&limiter);
            handles.push(thread::spawn(move || {
                (0..20)
                    .filter(|_| limiter_clone.check_and_record().is_ok())
                    .count()
            }));
        }

        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 40);
    }
}

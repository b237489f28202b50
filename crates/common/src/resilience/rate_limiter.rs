//! Client-side token bucket
//!
//! The bucket starts full. Tokens refill continuously at
//! `requests_per_second` up to `burst_size`. A server-sent `Retry-After`
//! closes the bucket until the deadline passes, regardless of tokens.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::debug;

use super::clock::{Clock, SystemClock};
use super::ResilienceConfigError;

/// Configuration for the token bucket
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitConfig {
    pub requests_per_second: f64,
    /// Bucket capacity
    pub burst_size: u32,
    /// Whether `Retry-After` feedback blocks the bucket
    pub respect_retry_after: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { requests_per_second: 50.0, burst_size: 10, respect_retry_after: true }
    }
}

impl RateLimitConfig {
    pub fn builder() -> RateLimitConfigBuilder {
        RateLimitConfigBuilder::default()
    }

    pub fn validate(&self) -> Result<(), ResilienceConfigError> {
        if !(self.requests_per_second.is_finite() && self.requests_per_second > 0.0) {
            return Err(ResilienceConfigError::new("requests_per_second must be positive"));
        }
        if self.burst_size == 0 {
            return Err(ResilienceConfigError::new("burst_size must be greater than 0"));
        }
        Ok(())
    }
}

/// Builder for [`RateLimitConfig`]
#[derive(Debug, Default)]
pub struct RateLimitConfigBuilder {
    config: RateLimitConfig,
}

impl RateLimitConfigBuilder {
    pub fn requests_per_second(mut self, rps: f64) -> Self {
        self.config.requests_per_second = rps;
        self
    }

    pub fn burst_size(mut self, burst: u32) -> Self {
        self.config.burst_size = burst;
        self
    }

    pub fn respect_retry_after(mut self, respect: bool) -> Self {
        self.config.respect_retry_after = respect;
        self
    }

    pub fn build(self) -> Result<RateLimitConfig, ResilienceConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
    blocked_until: Option<Instant>,
}

/// Thread-safe token bucket
#[derive(Debug)]
pub struct TokenBucket<C: Clock = SystemClock> {
    config: RateLimitConfig,
    state: Mutex<BucketState>,
    clock: C,
}

impl TokenBucket<SystemClock> {
    pub fn new(config: RateLimitConfig) -> Result<Self, ResilienceConfigError> {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> TokenBucket<C> {
    pub fn with_clock(config: RateLimitConfig, clock: C) -> Result<Self, ResilienceConfigError> {
        config.validate()?;
        let state = Mutex::new(BucketState {
            tokens: f64::from(config.burst_size),
            last_refill: clock.now(),
            blocked_until: None,
        });
        Ok(Self { config, state, clock })
    }

    /// Take one token if the bucket is open and not empty
    pub fn allow(&self) -> bool {
        let now = self.clock.now();
        let mut state = self.state.lock();
        if let Some(until) = state.blocked_until {
            if now < until {
                return false;
            }
            state.blocked_until = None;
        }
        self.refill(&mut state, now);
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Close the bucket for `delay`; a later deadline already in place wins
    pub fn set_retry_after(&self, delay: Duration) {
        if !self.config.respect_retry_after {
            return;
        }
        let until = self.clock.now() + delay;
        let mut state = self.state.lock();
        if state.blocked_until.map_or(true, |current| until > current) {
            state.blocked_until = Some(until);
            debug!(delay_ms = delay.as_millis() as u64, "Rate limiter paused by Retry-After");
        }
    }

    /// Tokens currently available, after refill
    pub fn tokens(&self) -> f64 {
        let now = self.clock.now();
        let mut state = self.state.lock();
        self.refill(&mut state, now);
        state.tokens
    }

    /// Time left on a `Retry-After` pause, zero when open
    pub fn retry_after_remaining(&self) -> Duration {
        let now = self.clock.now();
        let blocked_until = self.state.lock().blocked_until;
        blocked_until.map_or(Duration::ZERO, |until| until.saturating_duration_since(now))
    }

    /// Delay until a token would be available, ignoring any pause
    pub fn time_to_next_token(&self) -> Duration {
        let tokens = self.tokens();
        if tokens >= 1.0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64((1.0 - tokens) / self.config.requests_per_second)
    }

    fn refill(&self, state: &mut BucketState, now: Instant) {
        let elapsed = now.saturating_duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.config.requests_per_second)
            .min(f64::from(self.config.burst_size));
        state.last_refill = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::clock::MockClock;

    fn bucket(rps: f64, burst: u32) -> (TokenBucket<MockClock>, MockClock) {
        let clock = MockClock::new();
        let config =
            RateLimitConfig::builder().requests_per_second(rps).burst_size(burst).build().unwrap();
        (TokenBucket::with_clock(config, clock.clone()).unwrap(), clock)
    }

    #[test]
    fn test_burst_then_empty() {
        let (limiter, _) = bucket(1.0, 3);

        assert!(limiter.allow());
        assert!(limiter.allow());
        assert!(limiter.allow());
        assert!(!limiter.allow());
        assert!(limiter.time_to_next_token() > Duration::ZERO);
    }

    #[test]
    fn test_refill_is_capped_at_burst() {
        let (limiter, clock) = bucket(2.0, 2);
        assert!(limiter.allow());
        assert!(limiter.allow());

        clock.advance(Duration::from_millis(500));
        assert!(limiter.allow());
        assert!(!limiter.allow());

        clock.advance(Duration::from_secs(60));
        assert!((limiter.tokens() - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_retry_after_blocks_despite_tokens() {
        let (limiter, clock) = bucket(100.0, 10);

        limiter.set_retry_after(Duration::from_secs(5));
        assert!(!limiter.allow());
        assert_eq!(limiter.retry_after_remaining(), Duration::from_secs(5));

        // A shorter pause never shortens the current one
        limiter.set_retry_after(Duration::from_secs(1));
        clock.advance(Duration::from_secs(2));
        assert!(!limiter.allow());

        clock.advance(Duration::from_secs(3));
        assert!(limiter.allow());
        assert_eq!(limiter.retry_after_remaining(), Duration::ZERO);
    }

    #[test]
    fn test_retry_after_ignored_when_disabled() {
        let clock = MockClock::new();
        let config = RateLimitConfig::builder().respect_retry_after(false).build().unwrap();
        let limiter = TokenBucket::with_clock(config, clock).unwrap();

        limiter.set_retry_after(Duration::from_secs(30));

        assert!(limiter.allow());
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(RateLimitConfig::builder().requests_per_second(0.0).build().is_err());
        assert!(RateLimitConfig::builder().requests_per_second(f64::NAN).build().is_err());
        assert!(RateLimitConfig::builder().burst_size(0).build().is_err());
    }
}

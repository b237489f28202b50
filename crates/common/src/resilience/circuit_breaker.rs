//! Circuit breaker
//!
//! Three states:
//! - **closed**: calls pass; consecutive failures and the failure rate over a
//!   sliding window of recent outcomes are tracked
//! - **open**: calls are rejected until `open_timeout` has passed since the
//!   last failure
//! - **half-open**: calls pass again; `success_threshold` successes close the
//!   circuit, a single failure reopens it
//!
//! The failure rate only counts once the window is full, so a couple of early
//! failures cannot open a fresh breaker on their own.

use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::clock::{Clock, SystemClock};
use super::ResilienceConfigError;

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half-open",
        })
    }
}

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open a closed circuit
    pub failure_threshold: u32,
    /// Successes in half-open state needed to close the circuit
    pub success_threshold: u32,
    /// Time after the last failure before an open circuit lets calls through
    pub open_timeout: Duration,
    /// Failure percentage over a full window that opens the circuit
    pub failure_rate_threshold: f64,
    /// Number of recent outcomes the failure rate is computed over
    pub sliding_window_size: usize,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            open_timeout: Duration::from_secs(30),
            failure_rate_threshold: 50.0,
            sliding_window_size: 10,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::default()
    }

    pub fn validate(&self) -> Result<(), ResilienceConfigError> {
        if self.failure_threshold == 0 {
            return Err(ResilienceConfigError::new("failure_threshold must be greater than 0"));
        }
        if self.success_threshold == 0 {
            return Err(ResilienceConfigError::new("success_threshold must be greater than 0"));
        }
        if !(self.failure_rate_threshold > 0.0 && self.failure_rate_threshold <= 100.0) {
            return Err(ResilienceConfigError::new(
                "failure_rate_threshold must be within (0, 100]",
            ));
        }
        if self.sliding_window_size == 0 {
            return Err(ResilienceConfigError::new("sliding_window_size must be greater than 0"));
        }
        Ok(())
    }
}

/// Builder for [`CircuitBreakerConfig`]
#[derive(Debug, Default)]
pub struct CircuitBreakerConfigBuilder {
    config: CircuitBreakerConfig,
}

impl CircuitBreakerConfigBuilder {
    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.config.failure_threshold = threshold;
        self
    }

    pub fn success_threshold(mut self, threshold: u32) -> Self {
        self.config.success_threshold = threshold;
        self
    }

    pub fn open_timeout(mut self, timeout: Duration) -> Self {
        self.config.open_timeout = timeout;
        self
    }

    pub fn failure_rate_threshold(mut self, percent: f64) -> Self {
        self.config.failure_rate_threshold = percent;
        self
    }

    pub fn sliding_window_size(mut self, size: usize) -> Self {
        self.config.sliding_window_size = size;
        self
    }

    pub fn build(self) -> Result<CircuitBreakerConfig, ResilienceConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    half_open_successes: u32,
    last_failure: Option<Instant>,
    /// `true` marks a failure
    window: VecDeque<bool>,
}

impl BreakerState {
    fn new(capacity: usize) -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            half_open_successes: 0,
            last_failure: None,
            window: VecDeque::with_capacity(capacity),
        }
    }

    fn push_outcome(&mut self, failed: bool, capacity: usize) {
        if self.window.len() == capacity {
            self.window.pop_front();
        }
        self.window.push_back(failed);
    }

    fn failure_rate(&self, capacity: usize) -> Option<f64> {
        if self.window.len() < capacity {
            return None;
        }
        let failures = self.window.iter().filter(|failed| **failed).count();
        Some(failures as f64 * 100.0 / capacity as f64)
    }
}

/// Thread-safe circuit breaker
#[derive(Debug)]
pub struct CircuitBreaker<C: Clock = SystemClock> {
    config: CircuitBreakerConfig,
    state: Mutex<BreakerState>,
    clock: C,
}

impl CircuitBreaker<SystemClock> {
    pub fn new(config: CircuitBreakerConfig) -> Result<Self, ResilienceConfigError> {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> CircuitBreaker<C> {
    pub fn with_clock(config: CircuitBreakerConfig, clock: C) -> Result<Self, ResilienceConfigError> {
        config.validate()?;
        let state = Mutex::new(BreakerState::new(config.sliding_window_size));
        Ok(Self { config, state, clock })
    }

    /// Whether a call may proceed
    ///
    /// An open circuit whose timeout has elapsed moves to half-open here.
    pub fn allow(&self) -> bool {
        let mut inner = self.state.lock();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let cooled = inner.last_failure.map_or(true, |at| {
                    self.clock.now().saturating_duration_since(at) >= self.config.open_timeout
                });
                if cooled {
                    inner.state = CircuitState::HalfOpen;
                    inner.half_open_successes = 0;
                    debug!("Circuit breaker half-open");
                }
                cooled
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.state.lock();
        inner.push_outcome(false, self.config.sliding_window_size);
        match inner.state {
            CircuitState::Closed => inner.consecutive_failures = 0,
            CircuitState::HalfOpen => {
                inner.half_open_successes += 1;
                if inner.half_open_successes >= self.config.success_threshold {
                    let successes = inner.half_open_successes;
                    *inner = BreakerState::new(self.config.sliding_window_size);
                    info!(successes, "Circuit breaker closed");
                }
            }
            CircuitState::Open => warn!("Success recorded while circuit is open"),
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.state.lock();
        inner.push_outcome(true, self.config.sliding_window_size);
        inner.last_failure = Some(self.clock.now());
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                let rate = inner.failure_rate(self.config.sliding_window_size);
                let rate_tripped = rate.is_some_and(|r| r >= self.config.failure_rate_threshold);
                if inner.consecutive_failures >= self.config.failure_threshold || rate_tripped {
                    inner.state = CircuitState::Open;
                    warn!(
                        failures = inner.consecutive_failures,
                        failure_rate = rate.unwrap_or_default(),
                        "Circuit breaker opened"
                    );
                }
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.half_open_successes = 0;
                warn!("Circuit breaker reopened by a failure in half-open state");
            }
            CircuitState::Open => {}
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state.lock().state
    }

    /// Force the circuit closed and forget all recorded outcomes
    pub fn reset(&self) {
        *self.state.lock() = BreakerState::new(self.config.sliding_window_size);
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }
}

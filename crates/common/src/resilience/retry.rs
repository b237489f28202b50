//! Retry policy for API requests
//!
//! The policy decides, after each attempt, whether the request is repeated
//! and after what delay:
//! 1. the attempt budget is spent → stop
//! 2. mutating request and mutation retry disabled → stop
//! 3. retry only retryable statuses (429, 502, 503, 504 by default) or a
//!    retryable transport failure
//! 4. delay = `Retry-After` when present and positive, else
//!    `base_delay * 2^(attempt-1) + uniform(0, max_jitter)`

use std::time::Duration;

use basecamp_domain::constants::{
    DEFAULT_BASE_DELAY, DEFAULT_MAX_JITTER, DEFAULT_MAX_RETRIES, RETRYABLE_STATUS_CODES,
};
use basecamp_domain::HttpConfig;
use chrono::{DateTime, Utc};
use rand::Rng;
use thiserror::Error;
use tracing::debug;

/// Invalid retry configuration
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid retry configuration: {message}")]
pub struct RetryConfigError {
    pub message: String,
}

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Upper bound of the uniform jitter added to each backoff
    pub max_jitter: Duration,
    pub retryable_statuses: Vec<u16>,
    /// Whether non-GET requests may be repeated
    pub retry_mutations: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            max_jitter: DEFAULT_MAX_JITTER,
            retryable_statuses: RETRYABLE_STATUS_CODES.to_vec(),
            retry_mutations: false,
        }
    }
}

impl From<&HttpConfig> for RetryConfig {
    fn from(http: &HttpConfig) -> Self {
        Self {
            max_attempts: http.max_retries.max(1),
            base_delay: http.base_delay(),
            max_jitter: http.max_jitter(),
            retryable_statuses: RETRYABLE_STATUS_CODES.to_vec(),
            retry_mutations: http.retry_mutations,
        }
    }
}

/// What happened on one attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptResult {
    /// The server answered; `retry_after` is the parsed header, if usable
    Status { status: u16, retry_after: Option<Duration> },
    /// No response; `retryable` for timeouts, connect and reset failures
    Failed { retryable: bool },
}

/// Decision for whether to retry an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Repeat after this delay
    Retry(Duration),
    Stop,
}

impl RetryConfig {
    /// Start from the defaults
    #[must_use]
    pub fn builder() -> RetryConfigBuilder {
        RetryConfigBuilder::new()
    }

    /// A policy that never retries
    #[must_use]
    pub fn disabled() -> Self {
        Self { max_attempts: 1, ..Self::default() }
    }

    /// # Errors
    /// `max_attempts` must be at least 1
    pub fn validate(&self) -> Result<(), RetryConfigError> {
        if self.max_attempts == 0 {
            return Err(RetryConfigError { message: "max_attempts must be greater than 0".into() });
        }
        Ok(())
    }

    #[must_use]
    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.retryable_statuses.contains(&status)
    }

    /// Decide what follows attempt number `attempt` (1-based)
    #[must_use]
    pub fn decide(&self, attempt: u32, is_mutation: bool, result: AttemptResult) -> RetryDecision {
        if attempt >= self.max_attempts {
            return RetryDecision::Stop;
        }
        if is_mutation && !self.retry_mutations {
            return RetryDecision::Stop;
        }

        match result {
            AttemptResult::Status { status, retry_after } if self.is_retryable_status(status) => {
                let delay = retry_after.filter(|d| !d.is_zero()).unwrap_or_else(|| self.backoff(attempt));
                debug!(status, attempt, delay_ms = delay.as_millis(), "Retryable status");
                RetryDecision::Retry(delay)
            }
            AttemptResult::Failed { retryable: true } => RetryDecision::Retry(self.backoff(attempt)),
            _ => RetryDecision::Stop,
        }
    }

    /// Exponential backoff with additive jitter for `attempt` (1-based)
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_backoff(attempt) + random_jitter(self.max_jitter)
    }

    /// Backoff without jitter: `base_delay * 2^(attempt-1)`
    #[must_use]
    pub fn base_backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }
}

fn random_jitter(max: Duration) -> Duration {
    let max_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
}

/// Parse a `Retry-After` header value
///
/// Accepts delta-seconds or an HTTP-date. Zero, negative, past and
/// unparseable values count as absent.
#[must_use]
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(secs) = value.parse::<i64>() {
        return u64::try_from(secs).ok().filter(|s| *s > 0).map(Duration::from_secs);
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    (at - now).to_std().ok().filter(|d| !d.is_zero())
}

/// Builder for [`RetryConfig`] with fluent API
#[derive(Debug, Default)]
pub struct RetryConfigBuilder {
    config: RetryConfig,
}

impl RetryConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.max_attempts = attempts;
        self
    }

    #[must_use]
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.config.base_delay = delay;
        self
    }

    #[must_use]
    pub fn max_jitter(mut self, jitter: Duration) -> Self {
        self.config.max_jitter = jitter;
        self
    }

    #[must_use]
    pub fn no_jitter(self) -> Self {
        self.max_jitter(Duration::ZERO)
    }

    #[must_use]
    pub fn retryable_statuses(mut self, statuses: impl IntoIterator<Item = u16>) -> Self {
        self.config.retryable_statuses = statuses.into_iter().collect();
        self
    }

    #[must_use]
    pub fn retry_mutations(mut self, enabled: bool) -> Self {
        self.config.retry_mutations = enabled;
        self
    }

    /// # Errors
    /// See [`RetryConfig::validate`]
    pub fn build(self) -> Result<RetryConfig, RetryConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

//! Error classification shared across the client crates
//!
//! Layer-specific errors (`OAuthClientError`, `TokenStoreError`,
//! `CacheError`, ...) implement [`ErrorClassification`] so retry decisions,
//! log levels and alerting can be made without matching on each concrete
//! type. The client-wide taxonomy lives in
//! [`basecamp_domain::BasecampError`]; it is classified here as well.

use std::fmt;
use std::time::Duration;

use basecamp_domain::BasecampError;

/// Error classification trait for consistent error handling across modules
pub trait ErrorClassification {
    /// Transient failures that may succeed if attempted again
    fn is_retryable(&self) -> bool;

    /// Severity used for log levels and alerting
    fn severity(&self) -> ErrorSeverity;

    /// Whether the error indicates broken integrity (corrupt store, bad
    /// server contract)
    fn is_critical(&self) -> bool {
        self.severity() == ErrorSeverity::Critical
    }

    /// Server-suggested delay, e.g. from `Retry-After`
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// Error severity levels for monitoring and alerting
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorSeverity {
    /// Expected conditions (resource missing, empty results)
    Info,
    /// Degraded but operational (rate limiting, transient failures)
    Warning,
    /// Failure requiring attention
    Error,
    /// Integrity at risk
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warning => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

impl ErrorClassification for BasecampError {
    fn is_retryable(&self) -> bool {
        Self::is_retryable(self)
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::NotFound(_) => ErrorSeverity::Info,
            Self::RateLimit { .. } | Self::Network(_) | Self::Auth(_) => ErrorSeverity::Warning,
            Self::Api { status, .. } if *status >= 500 => ErrorSeverity::Warning,
            _ => ErrorSeverity::Error,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        Self::retry_after(self)
    }
}

/// Truncate `message` to at most `max_bytes` bytes, appending `...` when
/// anything was cut
///
/// The cut lands on a UTF-8 boundary, so the result may be a few bytes
/// shorter than `max_bytes`.
#[must_use]
pub fn truncate_message(message: &str, max_bytes: usize) -> String {
    if message.len() <= max_bytes {
        return message.to_string();
    }
    let (budget, suffix) = if max_bytes <= 3 { (max_bytes, "") } else { (max_bytes - 3, "...") };
    let mut end = budget;
    while end > 0 && !message.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}{suffix}", &message[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_keeps_short_messages() {
        assert_eq!(truncate_message("short", 500), "short");
    }

    #[test]
    fn truncate_appends_ellipsis_within_limit() {
        let long = "x".repeat(600);
        let out = truncate_message(&long, 500);
        assert_eq!(out.len(), 500);
        assert!(out.ends_with("..."));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let out = truncate_message("ééééé", 6);
        assert_eq!(out, "é...");
        assert_eq!(truncate_message("abcdef", 2), "ab");
    }

    #[test]
    fn basecamp_error_severity() {
        assert_eq!(BasecampError::NotFound("x".into()).severity(), ErrorSeverity::Info);
        assert_eq!(
            BasecampError::RateLimit { retry_after: Some(1) }.severity(),
            ErrorSeverity::Warning
        );
        assert_eq!(BasecampError::Usage("x".into()).severity(), ErrorSeverity::Error);
        assert!(ErrorSeverity::Critical > ErrorSeverity::Error);
    }
}

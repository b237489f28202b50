//! Header redaction for logging

use basecamp_domain::constants::{REDACTED, SENSITIVE_HEADERS};
use reqwest::header::{HeaderMap, HeaderValue};

/// Copy of `headers` with credential-bearing values replaced by
/// `[REDACTED]`
#[must_use]
pub fn redact_headers(headers: &HeaderMap) -> HeaderMap {
    let mut redacted = headers.clone();
    for name in SENSITIVE_HEADERS {
        if redacted.contains_key(name) {
            redacted.insert(name, HeaderValue::from_static(REDACTED));
        }
    }
    redacted
}

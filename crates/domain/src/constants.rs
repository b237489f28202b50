//! Client constants
//!
//! Centralized location for limits and defaults shared by the pipeline,
//! the OAuth layer and the webhook receiver.

use std::time::Duration;

// API endpoints
pub const DEFAULT_BASE_URL: &str = "https://3.basecampapi.com";
pub const DEFAULT_LAUNCHPAD_URL: &str = "https://launchpad.37signals.com";
pub const DISCOVERY_PATH: &str = "/.well-known/oauth-authorization-server";
pub const DEFAULT_USER_AGENT: &str = concat!("basecamp-sdk-rust/", env!("CARGO_PKG_VERSION"));

// Retry policy
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_JITTER: Duration = Duration::from_millis(100);
pub const RETRYABLE_STATUS_CODES: [u16; 4] = [429, 502, 503, 504];
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

// Pagination
pub const DEFAULT_MAX_PAGES: usize = 10_000;

// Body ceilings
pub const MAX_RESPONSE_BODY_BYTES: usize = 50 * 1024 * 1024;
pub const MAX_ERROR_BODY_BYTES: usize = 1024 * 1024;
pub const MAX_ERROR_MESSAGE_BYTES: usize = 500;
pub const MAX_TOKEN_RESPONSE_BYTES: usize = 1024 * 1024;

// Token lifecycle
pub const DEFAULT_REFRESH_BUFFER: Duration = Duration::from_secs(60);
pub const MIN_REFRESH_BUFFER: Duration = Duration::from_secs(60);
pub const MAX_REFRESH_BUFFER: Duration = Duration::from_secs(120);

// Webhooks
pub const DEFAULT_SIGNATURE_HEADER: &str = "x-basecamp-signature";
pub const DEFAULT_WEBHOOK_PATH: &str = "/webhooks/basecamp";
pub const DEFAULT_WEBHOOK_MAX_BODY_BYTES: usize = 1024 * 1024;
pub const DEFAULT_DEDUP_WINDOW_SIZE: usize = 1000;

// Headers whose values never reach a log line
pub const SENSITIVE_HEADERS: [&str; 4] = ["authorization", "cookie", "set-cookie", "x-csrf-token"];
pub const REDACTED: &str = "[REDACTED]";

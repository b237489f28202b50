//! Testing utilities and helpers
//!
//! - **[`mocks`]**: [`MockOAuthClient`] for token manager and service tests
//! - **[`fixtures`]**: tokens, server metadata and signed webhook payloads
//! - [`init_test_tracing`]: idempotent `tracing` subscriber for test output
//!
//! ```rust
//! use basecamp_common::testing::{expired_token, MockOAuthClient};
//!
//! let client = MockOAuthClient::new();
//! let token = expired_token("stale", Some("refresh"));
//! assert!(token.is_expired(std::time::Duration::ZERO));
//! # let _ = client;
//! ```

pub mod fixtures;
pub mod mocks;

use std::sync::Once;

pub use fixtures::{
    expired_token, server_config, signed_webhook, token_expiring_in, webhook_payload,
};
pub use mocks::MockOAuthClient;

/// Install a `fmt` subscriber honoring `RUST_LOG` (default `debug`)
///
/// Safe to call from every test; only the first call installs.
pub fn init_test_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug"));
        let _ = tracing_subscriber::fmt().with_env_filter(filter).with_test_writer().try_init();
    });
}

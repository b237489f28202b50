//! Security helpers
//!
//! Endpoint checks used before any credential leaves the process, header
//! redaction for logs, and HMAC signatures for webhook payloads.

pub mod endpoint;
pub mod redact;
pub mod signature;

pub use endpoint::{is_localhost, origin_of, require_secure_endpoint, resolve_url, same_origin};
pub use redact::redact_headers;
pub use signature::{compute_signature, verify_signature};

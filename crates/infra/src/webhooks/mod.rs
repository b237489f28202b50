//! Inbound webhooks
//!
//! [`WebhookReceiver`] takes a raw body and its signature header and runs
//! the delivery through:
//! 1. HMAC-SHA256 verification (skipped when no secret is configured)
//! 2. JSON parsing, with the top-level id taken from the raw text
//! 3. dedup: ids that are seen or in flight are acknowledged without
//!    dispatch
//! 4. middleware, then handlers whose pattern matches the kind, then
//!    catch-all handlers
//! 5. on success the id is remembered; on failure it is released so a
//!    redelivery runs again
//!
//! [`server::router`] exposes the receiver over HTTP with axum.

pub mod dedup;
pub mod id;
pub mod receiver;
pub mod routing;
pub mod server;

pub use dedup::{Claim, DedupWindow};
pub use id::extract_top_level_id;
pub use receiver::{
    WebhookDelivery, WebhookError, WebhookHandler, WebhookMiddleware, WebhookNext, WebhookReceiver,
};
pub use routing::match_pattern;
pub use server::{router, WebhookServer};

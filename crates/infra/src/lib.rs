//! # Basecamp Infrastructure
//!
//! I/O-facing parts of the Basecamp client.
//!
//! This crate contains:
//! - The outbound request pipeline (hooks, ETag cache, retry, auth,
//!   `reqwest` transport)
//! - `Link`-header pagination
//! - Pipeline observers (hooks)
//! - The inbound webhook receiver and its axum adapter
//! - Configuration loading
//!
//! ## Architecture
//! - Builds on the transport-agnostic pieces in `basecamp-common`
//! - Reports every failure as a `basecamp_domain::BasecampError`
//!
//! ```no_run
//! use basecamp_infra::http::{Pipeline, RequestDescriptor};
//!
//! # async fn run() -> basecamp_domain::Result<()> {
//! let pipeline = Pipeline::builder().account_id("999").token("access-token").build()?;
//! let projects: Vec<serde_json::Value> =
//!     pipeline.get_all(RequestDescriptor::get("projects.json")).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod errors;
pub mod http;
pub mod observability;
pub mod pagination;
pub mod webhooks;

// Re-export commonly used items
pub use errors::InfraError;
pub use http::{Pipeline, PipelineBuilder, RequestDescriptor, ResponseDescriptor};
pub use observability::{ChainHooks, Hooks, NoopHooks, OperationInfo, TracingHooks};
pub use webhooks::{WebhookError, WebhookReceiver};

//! Outbound request pipeline
//!
//! ```text
//! Pipeline::execute
//!   └─ HooksMiddleware   request start/end
//!      └─ ResilienceMiddleware   circuit breaker, bulkhead, rate limit (optional)
//!         └─ CacheMiddleware    If-None-Match, 304 → cached 200
//!            └─ RetryMiddleware     backoff, Retry-After, on_retry
//!               └─ AuthMiddleware       Bearer token, one replay after 401
//!                  └─ Transport             reqwest, per-attempt timeout
//! ```

pub mod descriptor;
pub mod middleware;
pub mod pipeline;
pub mod transport;

pub use descriptor::{RequestDescriptor, ResponseDescriptor};
pub use middleware::{
    Admission, AuthMiddleware, CacheMiddleware, HooksMiddleware, Middleware, Next,
    ResilienceGate, ResilienceMiddleware, RetryMiddleware,
};
pub use pipeline::{Pipeline, PipelineBuilder};
pub use transport::{ReqwestTransport, ReqwestTransportBuilder, Transport};

//! # Basecamp Domain
//!
//! Shared domain types for the Basecamp API client.
//!
//! This crate contains:
//! - The client error taxonomy and `Result` alias
//! - Configuration structures for the HTTP pipeline, cache, OAuth and
//!   webhooks
//! - The webhook event model
//! - Domain constants
//!
//! ## Architecture
//! - No dependencies on other Basecamp crates
//! - Only external dependencies allowed
//! - Pure data structures, no I/O

pub mod config;
pub mod constants;
pub mod errors;
pub mod macros;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;

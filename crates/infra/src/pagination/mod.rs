//! `Link`-header pagination
//!
//! [`Pipeline::pages`](crate::http::Pipeline::pages) walks `rel="next"`
//! links lazily: a page is fetched only when the consumer polls for it.
//! Every next link must stay on the origin of the first request.

pub mod link;
mod walker;

pub use link::{next_link, parse_link_header, LinkValue};
pub use walker::PageStream;

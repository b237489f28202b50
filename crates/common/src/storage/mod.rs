//! On-disk storage primitives shared by the token and cache stores

pub mod atomic;

pub use atomic::{create_private_dir, write_private_atomic};

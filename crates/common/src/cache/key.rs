//! Cache key derivation
//!
//! Two requests share a cache entry when their method, scheme, host, port,
//! path and *set* of query parameters match. Parameter order and the
//! fragment do not matter.

use sha2::{Digest, Sha256};
use url::Url;

/// Normalized `"METHOD url"` string a key is derived from
#[must_use]
pub fn normalized_request(method: &str, url: &Url) -> String {
    let mut pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
    pairs.sort();

    let mut normalized = url.clone();
    normalized.set_fragment(None);
    normalized.set_query(None);
    if !pairs.is_empty() {
        normalized.query_pairs_mut().extend_pairs(&pairs);
    }

    format!("{} {normalized}", method.to_ascii_uppercase())
}

/// Hex SHA-256 of [`normalized_request`]; safe to use as a file name
#[must_use]
pub fn cache_key(method: &str, url: &Url) -> String {
    hex::encode(Sha256::digest(normalized_request(method, url).as_bytes()))
}

/// Whether `key` has the shape [`cache_key`] produces
#[must_use]
pub fn is_valid_key(key: &str) -> bool {
    key.len() == 64 && key.bytes().all(|b| b.is_ascii_hexdigit())
}

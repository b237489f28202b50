//! URL and origin checks
//!
//! An origin is scheme + host + port, with the scheme's default port filled
//! in when the URL omits it, so `https://a.test` and `https://a.test:443`
//! compare equal.

use std::net::{Ipv4Addr, Ipv6Addr};

use basecamp_domain::{BasecampError, Result};
use url::{Host, Url};

/// Whether `url` points at the local machine
///
/// Accepts `localhost`, any `*.localhost` name, `127.0.0.1` and `::1`.
#[must_use]
pub fn is_localhost(url: &Url) -> bool {
    match url.host() {
        Some(Host::Domain(domain)) => {
            let domain = domain.to_ascii_lowercase();
            domain == "localhost" || domain.ends_with(".localhost")
        }
        Some(Host::Ipv4(ip)) => ip == Ipv4Addr::LOCALHOST,
        Some(Host::Ipv6(ip)) => ip == Ipv6Addr::LOCALHOST,
        None => false,
    }
}

/// Parse `raw` and require HTTPS unless the host is local
///
/// # Errors
/// `BasecampError::Usage` when `raw` does not parse or is a non-local,
/// non-HTTPS URL.
pub fn require_secure_endpoint(raw: &str) -> Result<Url> {
    let url = Url::parse(raw).map_err(|e| BasecampError::Usage(format!("invalid URL {raw}: {e}")))?;
    if url.scheme() == "https" || is_localhost(&url) {
        Ok(url)
    } else {
        Err(BasecampError::Usage(format!("URL must use HTTPS: {raw}")))
    }
}

/// `(scheme, host, port)` with the default port made explicit
#[must_use]
pub fn origin_of(url: &Url) -> (String, String, Option<u16>) {
    (
        url.scheme().to_ascii_lowercase(),
        url.host_str().unwrap_or_default().to_ascii_lowercase(),
        url.port_or_known_default(),
    )
}

/// Whether two absolute URLs share an origin
#[must_use]
pub fn same_origin(a: &Url, b: &Url) -> bool {
    a.has_host() && b.has_host() && origin_of(a) == origin_of(b)
}

/// Resolve `target` against `base`
///
/// Absolute targets are returned as-is; `/root` and `relative` targets are
/// resolved the way a browser would.
///
/// # Errors
/// `BasecampError::Validation` when `target` cannot be resolved.
pub fn resolve_url(base: &Url, target: &str) -> Result<Url> {
    base.join(target)
        .map_err(|e| BasecampError::Validation(format!("cannot resolve URL {target}: {e}")))
}

//! Client configuration structures
//!
//! Every section deserializes with defaults so a partial JSON/TOML file (or
//! an empty one) yields a working configuration. Loading lives in the infra
//! crate.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_BASE_URL, DEFAULT_DEDUP_WINDOW_SIZE, DEFAULT_LAUNCHPAD_URL, DEFAULT_MAX_PAGES,
    DEFAULT_SIGNATURE_HEADER, DEFAULT_USER_AGENT, DEFAULT_WEBHOOK_MAX_BODY_BYTES,
    DEFAULT_WEBHOOK_PATH,
};

/// Top-level client configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Account the client operates on; required by account-scoped calls
    pub account_id: Option<String>,
    pub http: HttpConfig,
    pub cache: CacheConfig,
    pub oauth: OAuthSettings,
    pub webhook: WebhookConfig,
}

/// Request pipeline settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub base_url: String,
    pub user_agent: String,
    /// Per-attempt timeout
    pub timeout_secs: u64,
    /// Attempts including the first
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_jitter_ms: u64,
    /// Whether non-GET requests may be retried
    pub retry_mutations: bool,
    pub max_pages: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_secs: 30,
            max_retries: 3,
            base_delay_ms: 1000,
            max_jitter_ms: 100,
            retry_mutations: false,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }
}

impl HttpConfig {
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    #[must_use]
    pub const fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    #[must_use]
    pub const fn max_jitter(&self) -> Duration {
        Duration::from_millis(self.max_jitter_ms)
    }
}

/// Conditional (ETag) cache settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Cache directory; [`CacheConfig::resolved_dir`] supplies the default
    pub dir: Option<PathBuf>,
}

impl CacheConfig {
    /// Configured directory, else `$XDG_CACHE_HOME/basecamp`, else
    /// `~/.cache/basecamp`
    #[must_use]
    pub fn resolved_dir(&self) -> Option<PathBuf> {
        if let Some(dir) = &self.dir {
            return Some(dir.clone());
        }
        if let Some(xdg) = std::env::var_os("XDG_CACHE_HOME").filter(|v| !v.is_empty()) {
            return Some(PathBuf::from(xdg).join("basecamp"));
        }
        std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".cache").join("basecamp"))
    }
}

/// OAuth client settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthSettings {
    /// Base URL probed for `/.well-known/oauth-authorization-server`
    pub issuer_url: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_uri: Option<String>,
    pub scope: Option<String>,
    /// Use the `type=web_server|refresh` token request format
    pub legacy_format: bool,
    pub use_pkce: bool,
    /// Token file location; `None` selects the platform default
    pub token_path: Option<PathBuf>,
    pub refresh_buffer_secs: u64,
}

impl Default for OAuthSettings {
    fn default() -> Self {
        Self {
            issuer_url: DEFAULT_LAUNCHPAD_URL.to_string(),
            client_id: None,
            client_secret: None,
            redirect_uri: None,
            scope: None,
            legacy_format: true,
            use_pkce: true,
            token_path: None,
            refresh_buffer_secs: 60,
        }
    }
}

impl OAuthSettings {
    #[must_use]
    pub const fn refresh_buffer(&self) -> Duration {
        Duration::from_secs(self.refresh_buffer_secs)
    }
}

/// Webhook receiver settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// HMAC secret; verification is skipped entirely when unset
    pub secret: Option<String>,
    pub signature_header: String,
    pub path: String,
    pub max_body_bytes: usize,
    pub dedup_window_size: usize,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            secret: None,
            signature_header: DEFAULT_SIGNATURE_HEADER.to_string(),
            path: DEFAULT_WEBHOOK_PATH.to_string(),
            max_body_bytes: DEFAULT_WEBHOOK_MAX_BODY_BYTES,
            dedup_window_size: DEFAULT_DEDUP_WINDOW_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = ClientConfig::default();
        assert_eq!(config.http.base_url, "https://3.basecampapi.com");
        assert_eq!(config.http.timeout(), Duration::from_secs(30));
        assert_eq!(config.http.max_retries, 3);
        assert_eq!(config.http.base_delay(), Duration::from_secs(1));
        assert_eq!(config.http.max_jitter(), Duration::from_millis(100));
        assert_eq!(config.http.max_pages, 10_000);
        assert!(!config.http.retry_mutations);
        assert!(!config.cache.enabled);
        assert_eq!(config.webhook.signature_header, "x-basecamp-signature");
        assert_eq!(config.oauth.refresh_buffer(), Duration::from_secs(60));
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: ClientConfig =
            serde_json::from_str(r#"{"account_id":"999","http":{"max_retries":5}}"#).unwrap();
        assert_eq!(config.account_id.as_deref(), Some("999"));
        assert_eq!(config.http.max_retries, 5);
        assert_eq!(config.http.timeout_secs, 30);
        assert_eq!(config.webhook.dedup_window_size, 1000);
    }

    #[test]
    fn explicit_cache_dir_wins() {
        let cache = CacheConfig { enabled: true, dir: Some(PathBuf::from("/tmp/bc")) };
        assert_eq!(cache.resolved_dir(), Some(PathBuf::from("/tmp/bc")));
    }
}

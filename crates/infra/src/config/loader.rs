//! Configuration loader
//!
//! Loads client configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. First, attempts to load from environment variables
//! 2. If `BASECAMP_ACCOUNT_ID` is missing or a value is invalid, falls back
//!    to loading from file
//! 3. Probes multiple paths for config files
//! 4. Supports JSON and TOML formats
//!
//! ## Environment Variables
//! - `BASECAMP_ACCOUNT_ID` (required): account the client operates on
//! - `BASECAMP_BASE_URL`, `BASECAMP_USER_AGENT`
//! - `BASECAMP_TIMEOUT_SECS`, `BASECAMP_MAX_RETRIES`,
//!   `BASECAMP_BASE_DELAY_MS`, `BASECAMP_MAX_JITTER_MS`,
//!   `BASECAMP_RETRY_MUTATIONS`, `BASECAMP_MAX_PAGES`
//! - `BASECAMP_CACHE_ENABLED`, `BASECAMP_CACHE_DIR`
//! - `BASECAMP_OAUTH_ISSUER_URL`, `BASECAMP_OAUTH_CLIENT_ID`,
//!   `BASECAMP_OAUTH_CLIENT_SECRET`, `BASECAMP_OAUTH_REDIRECT_URI`,
//!   `BASECAMP_OAUTH_SCOPE`, `BASECAMP_OAUTH_LEGACY`, `BASECAMP_OAUTH_PKCE`,
//!   `BASECAMP_TOKEN_PATH`, `BASECAMP_REFRESH_BUFFER_SECS`
//! - `BASECAMP_WEBHOOK_SECRET`, `BASECAMP_WEBHOOK_PATH`,
//!   `BASECAMP_WEBHOOK_SIGNATURE_HEADER`, `BASECAMP_WEBHOOK_MAX_BODY_BYTES`,
//!   `BASECAMP_WEBHOOK_DEDUP_WINDOW`
//!
//! Unset optional variables keep their defaults.
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. `./basecamp.json` or `./basecamp.toml` (current working directory)
//! 2. `./config.json` or `./config.toml` (current working directory)
//! 3. `../basecamp.json` or `../basecamp.toml` (parent directory)
//! 4. `$XDG_CONFIG_HOME/basecamp/config.{json,toml}` (or `~/.config`)

use std::path::{Path, PathBuf};
use std::str::FromStr;

use basecamp_domain::{BasecampError, ClientConfig, Result};

/// Load configuration with automatic fallback strategy
///
/// First attempts to load from environment variables. If the account id is
/// missing or a value does not parse, falls back to a config file.
///
/// # Errors
/// Returns `BasecampError::Usage` if:
/// - Configuration cannot be loaded from either source
/// - File format is invalid
pub fn load() -> Result<ClientConfig> {
    match load_from_env() {
        Ok(config) => {
            tracing::info!("Configuration loaded from environment variables");
            Ok(config)
        }
        Err(e) => {
            tracing::debug!(error = ?e, "Failed to load from environment, trying file");
            load_from_file(None)
        }
    }
}

/// Load configuration from environment variables
///
/// # Errors
/// Returns `BasecampError::Usage` if `BASECAMP_ACCOUNT_ID` is missing or a
/// numeric/boolean variable has an invalid value.
pub fn load_from_env() -> Result<ClientConfig> {
    let mut config = ClientConfig { account_id: Some(env_var("BASECAMP_ACCOUNT_ID")?), ..ClientConfig::default() };

    let http = &mut config.http;
    set_string(&mut http.base_url, "BASECAMP_BASE_URL");
    set_string(&mut http.user_agent, "BASECAMP_USER_AGENT");
    http.timeout_secs = env_parse("BASECAMP_TIMEOUT_SECS", http.timeout_secs)?;
    http.max_retries = env_parse("BASECAMP_MAX_RETRIES", http.max_retries)?;
    http.base_delay_ms = env_parse("BASECAMP_BASE_DELAY_MS", http.base_delay_ms)?;
    http.max_jitter_ms = env_parse("BASECAMP_MAX_JITTER_MS", http.max_jitter_ms)?;
    http.retry_mutations = env_bool("BASECAMP_RETRY_MUTATIONS", http.retry_mutations);
    http.max_pages = env_parse("BASECAMP_MAX_PAGES", http.max_pages)?;

    config.cache.enabled = env_bool("BASECAMP_CACHE_ENABLED", config.cache.enabled);
    if let Some(dir) = env_opt("BASECAMP_CACHE_DIR") {
        config.cache.dir = Some(PathBuf::from(dir));
    }

    let oauth = &mut config.oauth;
    set_string(&mut oauth.issuer_url, "BASECAMP_OAUTH_ISSUER_URL");
    set_opt(&mut oauth.client_id, "BASECAMP_OAUTH_CLIENT_ID");
    set_opt(&mut oauth.client_secret, "BASECAMP_OAUTH_CLIENT_SECRET");
    set_opt(&mut oauth.redirect_uri, "BASECAMP_OAUTH_REDIRECT_URI");
    set_opt(&mut oauth.scope, "BASECAMP_OAUTH_SCOPE");
    oauth.legacy_format = env_bool("BASECAMP_OAUTH_LEGACY", oauth.legacy_format);
    oauth.use_pkce = env_bool("BASECAMP_OAUTH_PKCE", oauth.use_pkce);
    if let Some(path) = env_opt("BASECAMP_TOKEN_PATH") {
        oauth.token_path = Some(PathBuf::from(path));
    }
    oauth.refresh_buffer_secs = env_parse("BASECAMP_REFRESH_BUFFER_SECS", oauth.refresh_buffer_secs)?;

    let webhook = &mut config.webhook;
    set_opt(&mut webhook.secret, "BASECAMP_WEBHOOK_SECRET");
    set_string(&mut webhook.path, "BASECAMP_WEBHOOK_PATH");
    set_string(&mut webhook.signature_header, "BASECAMP_WEBHOOK_SIGNATURE_HEADER");
    webhook.max_body_bytes = env_parse("BASECAMP_WEBHOOK_MAX_BODY_BYTES", webhook.max_body_bytes)?;
    webhook.dedup_window_size = env_parse("BASECAMP_WEBHOOK_DEDUP_WINDOW", webhook.dedup_window_size)?;

    Ok(config)
}

/// Load configuration from a file
///
/// If `path` is `None`, probes multiple locations for config files.
/// Supports both JSON and TOML formats (detected by file extension).
/// Missing sections and fields take their defaults.
///
/// # Errors
/// Returns `BasecampError::Usage` if:
/// - File not found (when path is specified)
/// - No config file found (when path is `None`)
/// - File format is invalid
pub fn load_from_file(path: Option<PathBuf>) -> Result<ClientConfig> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(BasecampError::Usage(format!("Config file not found: {}", p.display())));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            BasecampError::Usage("No config file found in any of the standard locations".to_string())
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| BasecampError::Usage(format!("Failed to read config file: {e}")))?;

    parse_config(&contents, &config_path)
}

/// Parse configuration from string content
///
/// Format is detected by file extension (`.json` or `.toml`).
fn parse_config(contents: &str, path: &Path) -> Result<ClientConfig> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents).map_err(|e| BasecampError::Usage(format!("Invalid TOML format: {e}"))),
        "json" => {
            serde_json::from_str(contents).map_err(|e| BasecampError::Usage(format!("Invalid JSON format: {e}")))
        }
        _ => Err(BasecampError::Usage(format!("Unsupported config format: {extension}"))),
    }
}

/// Probe multiple paths for configuration files
///
/// # Returns
/// The first config file found, or `None` if no file exists.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut candidates = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        candidates.extend([
            cwd.join("basecamp.json"),
            cwd.join("basecamp.toml"),
            cwd.join("config.json"),
            cwd.join("config.toml"),
            cwd.join("../basecamp.json"),
            cwd.join("../basecamp.toml"),
        ]);
    }

    let config_home = env_opt("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| env_opt("HOME").map(|home| PathBuf::from(home).join(".config")));
    if let Some(dir) = config_home {
        let dir = dir.join("basecamp");
        candidates.extend([dir.join("config.json"), dir.join("config.toml")]);
    }

    candidates.into_iter().find(|path| path.exists())
}

/// Get required environment variable
fn env_var(key: &str) -> Result<String> {
    env_opt(key).ok_or_else(|| BasecampError::Usage(format!("Missing required environment variable: {key}")))
}

/// Non-empty value of `key`
fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn set_string(target: &mut String, key: &str) {
    if let Some(value) = env_opt(key) {
        *target = value;
    }
}

fn set_opt(target: &mut Option<String>, key: &str) {
    if let Some(value) = env_opt(key) {
        *target = Some(value);
    }
}

/// Parse `key` when set, else `default`
fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_opt(key) {
        Some(raw) => raw.trim().parse().map_err(|e| BasecampError::Usage(format!("Invalid value for {key}: {e}"))),
        None => Ok(default),
    }
}

/// Parse boolean from environment variable
///
/// Accepts: `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive)
fn env_bool(key: &str, default: bool) -> bool {
    env_opt(key).map_or(default, |s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

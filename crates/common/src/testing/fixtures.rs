//! Test fixture generators

use chrono::Utc;
use serde_json::{json, Value};

use crate::auth::{OAuthServerConfig, OAuthToken};
use crate::security::compute_signature;

/// Server metadata rooted at `base` (e.g. a wiremock URI)
#[must_use]
pub fn server_config(base: &str) -> OAuthServerConfig {
    let base = base.trim_end_matches('/');
    OAuthServerConfig {
        issuer: base.to_string(),
        authorization_endpoint: format!("{base}/authorization/new"),
        token_endpoint: format!("{base}/authorization/token"),
        registration_endpoint: None,
        scopes_supported: Vec::new(),
    }
}

/// Token expiring `secs` from now (negative for the past)
#[must_use]
pub fn token_expiring_in(access: &str, refresh: Option<&str>, secs: i64) -> OAuthToken {
    OAuthToken {
        refresh_token: refresh.map(str::to_string),
        expires_at: Some(Utc::now() + chrono::Duration::seconds(secs)),
        ..OAuthToken::bearer(access)
    }
}

/// Token that expired five minutes ago
#[must_use]
pub fn expired_token(access: &str, refresh: Option<&str>) -> OAuthToken {
    token_expiring_in(access, refresh, -300)
}

/// Minimal webhook delivery body for `id` and `kind`
#[must_use]
pub fn webhook_payload(id: u64, kind: &str) -> Value {
    json!({
        "id": id,
        "kind": kind,
        "details": {},
        "created_at": "2024-01-15T10:30:00.000Z",
        "recording": {
            "id": 9_007_199_254_740_993_u64,
            "status": "active",
            "type": "Todo",
            "title": "Ship it",
            "bucket": { "id": 1, "name": "Launch", "type": "Project" }
        },
        "creator": { "id": 42, "name": "Annie Bryan", "email_address": "annie@example.com" }
    })
}

/// Serialized payload plus its hex HMAC-SHA256 signature under `secret`
#[must_use]
pub fn signed_webhook(payload: &Value, secret: &str) -> (Vec<u8>, String) {
    let body = payload.to_string().into_bytes();
    let signature = compute_signature(&body, secret);
    (body, signature)
}

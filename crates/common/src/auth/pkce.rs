//! PKCE (Proof Key for Code Exchange) for OAuth 2.0
//!
//! RFC 7636 with the S256 method. Verifier and state come from the OS
//! CSPRNG.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

const VERIFIER_BYTES: usize = 32;
const STATE_BYTES: usize = 16;

fn random_token(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// 32 random bytes, base64url without padding (43 characters)
#[must_use]
pub fn generate_code_verifier() -> String {
    random_token(VERIFIER_BYTES)
}

/// `BASE64URL(SHA256(verifier))`
#[must_use]
pub fn generate_code_challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

/// 16 random bytes, base64url without padding (22 characters)
#[must_use]
pub fn generate_state() -> String {
    random_token(STATE_BYTES)
}

/// Constant-time comparison of the state sent with the authorization
/// request and the one returned on the callback
#[must_use]
pub fn validate_state(expected: &str, actual: &str) -> bool {
    expected.as_bytes().ct_eq(actual.as_bytes()).into()
}

/// Verifier, challenge and state for one authorization attempt
#[derive(Debug, Clone)]
pub struct PkceChallenge {
    /// Sent only with the token exchange
    pub code_verifier: String,
    /// Sent with the authorization request
    pub code_challenge: String,
    /// CSRF token echoed back on the callback
    pub state: String,
}

impl PkceChallenge {
    /// Generate a fresh verifier, challenge and state
    #[must_use]
    pub fn generate() -> Self {
        let code_verifier = generate_code_verifier();
        let code_challenge = generate_code_challenge(&code_verifier);
        Self { code_verifier, code_challenge, state: generate_state() }
    }

    /// Always `S256`
    #[must_use]
    pub const fn challenge_method(&self) -> &'static str {
        "S256"
    }
}

//! HMAC-SHA256 webhook signatures
//!
//! The signature is the lowercase hex digest of HMAC-SHA256 over the raw
//! request body. Verification always works on the bytes as received.

use ring::hmac;
use subtle::ConstantTimeEq;

/// Hex HMAC-SHA256 of `payload` under `secret`
#[must_use]
pub fn compute_signature(payload: &[u8], secret: &str) -> String {
    let key = hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes());
    hex::encode(hmac::sign(&key, payload).as_ref())
}

/// Constant-time check of `signature` against `payload`
///
/// An empty secret or an empty signature never verifies.
#[must_use]
pub fn verify_signature(payload: &[u8], signature: &str, secret: &str) -> bool {
    if secret.is_empty() || signature.is_empty() {
        return false;
    }
    let expected = compute_signature(payload, secret);
    expected.as_bytes().ct_eq(signature.trim().as_bytes()).into()
}

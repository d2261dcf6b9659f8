//! HMAC-SHA256 signing for job callback payloads.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Prefix used in the signature header value.
pub const SIGNATURE_PREFIX: &str = "sha256=";

#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("Invalid signing key: {0}")]
    InvalidKey(String),
}

/// Signs `payload` with `secret`, returning `sha256=<hex>`.
pub fn sign_payload(payload: &[u8], secret: &str) -> Result<String, SignatureError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| SignatureError::InvalidKey(e.to_string()))?;
    mac.update(payload);
    let signature = hex::encode(mac.finalize().into_bytes());
    Ok(format!("{}{}", SIGNATURE_PREFIX, signature))
}

/// Verifies a `sha256=<hex>` header value against `payload`.
///
/// Comparison is constant-time. Malformed headers are rejected.
pub fn verify_signature(payload: &[u8], secret: &str, header: &str) -> bool {
    let Some(hex_sig) = header.strip_prefix(SIGNATURE_PREFIX) else {
        return false;
    };
    let Ok(expected) = hex::decode(hex_sig) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}

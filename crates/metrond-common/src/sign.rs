//! HMAC-SHA256 body signing.
//!
//! The signature travels in the `HashSHA256` header as lowercase hex,
//! computed over the exact body bytes as they appear on the wire.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the body signature.
pub const HASH_HEADER: &str = "HashSHA256";

#[derive(Debug, thiserror::Error)]
#[error("hmac signing failed: {0}")]
pub struct SignError(String);

/// Lowercase-hex HMAC-SHA256 of `body` under `key`.
pub fn calculate(body: &[u8], key: &str) -> Result<String, SignError> {
    let mut mac =
        HmacSha256::new_from_slice(key.as_bytes()).map_err(|e| SignError(e.to_string()))?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Whether `received_hex` matches the signature of `body` under `key`.
/// The comparison is constant-time for equal-length inputs.
pub fn verify(body: &[u8], key: &str, received_hex: &str) -> Result<bool, SignError> {
    let expected = calculate(body, key)?;
    Ok(constant_time_eq(
        expected.as_bytes(),
        received_hex.as_bytes(),
    ))
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_stable_and_verifies() {
        let sig = calculate(b"payload", "secret").unwrap();
        assert_eq!(sig.len(), 64);
        assert_eq!(sig, sig.to_lowercase());
        assert!(verify(b"payload", "secret", &sig).unwrap());
    }

    #[test]
    fn wrong_key_or_body_fails_verification() {
        let sig = calculate(b"payload", "secret").unwrap();
        assert!(!verify(b"payload", "other", &sig).unwrap());
        assert!(!verify(b"tampered", "secret", &sig).unwrap());
        assert!(!verify(b"payload", "secret", "deadbeef").unwrap());
    }

    #[test]
    fn keys_produce_distinct_signatures() {
        let a = calculate(b"payload", "k1").unwrap();
        let b = calculate(b"payload", "k2").unwrap();
        assert_ne!(a, b);
    }
}

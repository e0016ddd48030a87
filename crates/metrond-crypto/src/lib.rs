//! Hybrid envelope encryption for metric batches.
//!
//! A plain RSA-OAEP message is capped by the key size, far below a gzipped
//! batch, so payloads are sealed with a fresh AES-256-GCM data key and only
//! the data key is RSA-wrapped. Envelope layout:
//!
//! ```text
//! u16-be wrapped-key length | RSA-OAEP-SHA256(data key) | 12-byte nonce | ciphertext+tag
//! ```
//!
//! The agent holds the SPKI public key, the server the PKCS#8 private key.
//! An empty key path disables the layer entirely (the caller then skips the
//! envelope and ships the gzipped bytes as-is).

pub mod keys;

use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use rsa::sha2::Sha256;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};

const DATA_KEY_LEN: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("failed to read key file {path}: {source}")]
    KeyFile {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse PEM key: {0}")]
    KeyParse(String),
    #[error("key generation failed: {0}")]
    KeyGen(String),
    #[error("encryption failed: {0}")]
    Encrypt(String),
    #[error("decryption failed: {0}")]
    Decrypt(String),
}

/// Seals payloads for a server whose public key is known.
pub struct Encryptor {
    public_key: RsaPublicKey,
}

impl Encryptor {
    pub fn new(public_key: RsaPublicKey) -> Self {
        Self { public_key }
    }

    /// Loads the SPKI public key from a PEM file.
    pub fn from_pem_file(path: &str) -> Result<Self, CryptoError> {
        Ok(Self::new(keys::load_public_key(path)?))
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let rng = SystemRandom::new();

        let mut data_key = [0u8; DATA_KEY_LEN];
        rng.fill(&mut data_key)
            .map_err(|_| CryptoError::Encrypt("data key generation failed".into()))?;
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rng.fill(&mut nonce_bytes)
            .map_err(|_| CryptoError::Encrypt("nonce generation failed".into()))?;

        let unbound = UnboundKey::new(&AES_256_GCM, &data_key)
            .map_err(|_| CryptoError::Encrypt("invalid data key".into()))?;
        let key = LessSafeKey::new(unbound);
        let nonce = Nonce::assume_unique_for_key(nonce_bytes);

        let mut in_out = plaintext.to_vec();
        key.seal_in_place_append_tag(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| CryptoError::Encrypt("aead seal failed".into()))?;

        let mut rsa_rng = rand::thread_rng();
        let wrapped = self
            .public_key
            .encrypt(&mut rsa_rng, Oaep::new::<Sha256>(), &data_key)
            .map_err(|e| CryptoError::Encrypt(e.to_string()))?;

        let mut envelope = Vec::with_capacity(2 + wrapped.len() + NONCE_LEN + in_out.len());
        envelope.extend_from_slice(&(wrapped.len() as u16).to_be_bytes());
        envelope.extend_from_slice(&wrapped);
        envelope.extend_from_slice(&nonce_bytes);
        envelope.extend_from_slice(&in_out);
        Ok(envelope)
    }
}

/// Opens envelopes with the server's private key.
pub struct Decryptor {
    private_key: RsaPrivateKey,
}

impl Decryptor {
    pub fn new(private_key: RsaPrivateKey) -> Self {
        Self { private_key }
    }

    /// Loads the PKCS#8 private key from a PEM file.
    pub fn from_pem_file(path: &str) -> Result<Self, CryptoError> {
        Ok(Self::new(keys::load_private_key(path)?))
    }

    pub fn decrypt(&self, envelope: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if envelope.len() < 2 {
            return Err(CryptoError::Decrypt("envelope too short".into()));
        }
        let wrapped_len = u16::from_be_bytes([envelope[0], envelope[1]]) as usize;
        let rest = &envelope[2..];
        if rest.len() < wrapped_len + NONCE_LEN + AES_256_GCM.tag_len() {
            return Err(CryptoError::Decrypt("envelope too short".into()));
        }

        let (wrapped, rest) = rest.split_at(wrapped_len);
        let (nonce_bytes, ciphertext) = rest.split_at(NONCE_LEN);

        let data_key = self
            .private_key
            .decrypt(Oaep::new::<Sha256>(), wrapped)
            .map_err(|e| CryptoError::Decrypt(e.to_string()))?;

        let unbound = UnboundKey::new(&AES_256_GCM, &data_key)
            .map_err(|_| CryptoError::Decrypt("invalid data key".into()))?;
        let key = LessSafeKey::new(unbound);
        let nonce = Nonce::try_assume_unique_for_key(nonce_bytes)
            .map_err(|_| CryptoError::Decrypt("invalid nonce".into()))?;

        let mut in_out = ciphertext.to_vec();
        let plaintext = key
            .open_in_place(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| CryptoError::Decrypt("aead open failed".into()))?;
        Ok(plaintext.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::generate_keys;
    use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
    use std::sync::OnceLock;

    fn test_pems() -> &'static (String, String) {
        static PEMS: OnceLock<(String, String)> = OnceLock::new();
        PEMS.get_or_init(|| generate_keys(2048).unwrap())
    }

    fn test_pair() -> (Encryptor, Decryptor) {
        let (private_pem, public_pem) = test_pems();
        let public_key = RsaPublicKey::from_public_key_pem(public_pem).unwrap();
        let private_key = RsaPrivateKey::from_pkcs8_pem(private_pem).unwrap();
        (Encryptor::new(public_key), Decryptor::new(private_key))
    }

    #[test]
    fn round_trip() {
        let (enc, dec) = test_pair();
        for payload in [&b""[..], b"x", b"[{\"id\":\"Alloc\",\"type\":\"gauge\"}]"] {
            let envelope = enc.encrypt(payload).unwrap();
            assert_ne!(envelope, payload);
            assert_eq!(dec.decrypt(&envelope).unwrap(), payload);
        }
    }

    #[test]
    fn large_payload_round_trip() {
        // Larger than any RSA modulus, which is the whole point of the envelope.
        let (enc, dec) = test_pair();
        let payload = vec![0xabu8; 64 * 1024];
        let envelope = enc.encrypt(&payload).unwrap();
        assert_eq!(dec.decrypt(&envelope).unwrap(), payload);
    }

    #[test]
    fn tampered_envelope_fails() {
        let (enc, dec) = test_pair();
        let mut envelope = enc.encrypt(b"payload").unwrap();
        let last = envelope.len() - 1;
        envelope[last] ^= 0x01;
        assert!(dec.decrypt(&envelope).is_err());
    }

    #[test]
    fn short_input_fails() {
        let (_, dec) = test_pair();
        assert!(dec.decrypt(b"").is_err());
        assert!(dec.decrypt(&[0x00, 0x10, 0x01]).is_err());
    }

    #[test]
    fn wrong_key_fails() {
        let (enc, _) = test_pair();
        let (other_private_pem, _) = generate_keys(2048).unwrap();
        let other_dec =
            Decryptor::new(RsaPrivateKey::from_pkcs8_pem(&other_private_pem).unwrap());
        let envelope = enc.encrypt(b"payload").unwrap();
        assert!(other_dec.decrypt(&envelope).is_err());
    }
}

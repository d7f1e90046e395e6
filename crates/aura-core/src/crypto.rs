//! At-rest encryption for user-supplied AI API keys.
//!
//! XChaCha20-Poly1305 with a random 24-byte nonce prepended to the
//! ciphertext; the whole blob is base64-encoded for storage in the settings
//! row. Decryption fails closed on truncated or tampered input.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use rand::RngCore;

use crate::error::AuraError;

const NONCE_SIZE: usize = 24;
const KDF_CONTEXT: &str = "auratask 2026-01 api-key at-rest";

/// Symmetric cipher for API-key storage, keyed from a configured secret.
pub struct ApiKeyCipher {
    key: [u8; 32],
}

impl ApiKeyCipher {
    /// Derive the 32-byte cipher key from an arbitrary secret string.
    pub fn from_secret(secret: &str) -> Self {
        let mut hasher = blake3::Hasher::new_derive_key(KDF_CONTEXT);
        hasher.update(secret.as_bytes());
        let hash = hasher.finalize();
        let mut key = [0u8; 32];
        key.copy_from_slice(&hash.as_bytes()[..32]);
        Self { key }
    }

    /// Encrypt a plaintext key. Returns base64(nonce || ciphertext).
    pub fn encrypt(&self, plaintext: &str) -> Result<String, AuraError> {
        let cipher = XChaCha20Poly1305::new((&self.key).into());
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = XNonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| AuraError::Crypto("encryption failed".to_string()))?;

        let mut blob = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(blob))
    }

    /// Decrypt a stored blob back to the plaintext key.
    pub fn decrypt(&self, encoded: &str) -> Result<String, AuraError> {
        let blob = BASE64
            .decode(encoded)
            .map_err(|_| AuraError::Crypto("invalid base64".to_string()))?;
        if blob.len() < NONCE_SIZE {
            return Err(AuraError::Crypto("ciphertext too short".to_string()));
        }

        let (nonce_bytes, ciphertext) = blob.split_at(NONCE_SIZE);
        let cipher = XChaCha20Poly1305::new((&self.key).into());
        let nonce = XNonce::from_slice(nonce_bytes);

        let plaintext = cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| AuraError::Crypto("decryption failed".to_string()))?;

        String::from_utf8(plaintext)
            .map_err(|_| AuraError::Crypto("decrypted key is not utf-8".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let cipher = ApiKeyCipher::from_secret("app-secret");
        let encrypted = cipher.encrypt("AIzaSy-example-key").unwrap();
        assert_ne!(encrypted, "AIzaSy-example-key");
        assert_eq!(cipher.decrypt(&encrypted).unwrap(), "AIzaSy-example-key");
    }

    #[test]
    fn test_nonce_randomized() {
        let cipher = ApiKeyCipher::from_secret("app-secret");
        let a = cipher.encrypt("same-key").unwrap();
        let b = cipher.encrypt("same-key").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_secret_fails() {
        let encrypted = ApiKeyCipher::from_secret("one").encrypt("key").unwrap();
        assert!(ApiKeyCipher::from_secret("two").decrypt(&encrypted).is_err());
    }

    #[test]
    fn test_tampered_fails() {
        let cipher = ApiKeyCipher::from_secret("app-secret");
        let encrypted = cipher.encrypt("key").unwrap();
        let mut blob = BASE64.decode(&encrypted).unwrap();
        let len = blob.len();
        blob[len - 1] ^= 0xFF;
        assert!(cipher.decrypt(&BASE64.encode(blob)).is_err());
    }

    #[test]
    fn test_truncated_fails() {
        let cipher = ApiKeyCipher::from_secret("app-secret");
        assert!(cipher.decrypt("").is_err());
        assert!(cipher.decrypt(&BASE64.encode([0u8; 10])).is_err());
        assert!(cipher.decrypt("not base64 !!!").is_err());
    }
}

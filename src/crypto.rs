//! Secret-key encryption used by protected cookies.
//!
//! The cookie middleware only depends on the [`Encrypter`] trait. The default
//! implementation, [`SecretEncrypter`], seals values with XChaCha20-Poly1305
//! under a random 192-bit nonce and transports `nonce ‖ ciphertext` as
//! unpadded base64url, which is safe to place in a cookie without escaping.

use std::fmt;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chacha20poly1305::aead::{Aead, AeadCore, KeyInit};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use rand::RngCore;
use rand::rngs::OsRng;

const NONCE_LEN: usize = 24;

/// Key length in bytes.
pub const KEY_LEN: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("invalid key material")]
    InvalidKey,
    #[error("encryption failed")]
    Encrypt,
    /// The token was malformed or failed authentication.
    #[error("decryption failed")]
    Decrypt,
}

/// Authenticated symmetric encryption of cookie payloads.
pub trait Encrypter: Send + Sync {
    /// Encrypts `plaintext` into a cookie-safe token.
    fn encrypt(&self, plaintext: &[u8]) -> Result<String, CryptoError>;

    /// Reverses [`encrypt`](Encrypter::encrypt). Fails on any tampering.
    fn decrypt(&self, token: &str) -> Result<Vec<u8>, CryptoError>;

    /// Raw key bytes, also used to key HMAC signatures.
    fn key(&self) -> &[u8];
}

/// XChaCha20-Poly1305 implementation of [`Encrypter`].
pub struct SecretEncrypter {
    cipher: XChaCha20Poly1305,
    key: [u8; KEY_LEN],
}

impl SecretEncrypter {
    pub fn new(key: [u8; KEY_LEN]) -> Self {
        let cipher = XChaCha20Poly1305::new(Key::from_slice(&key));
        Self { cipher, key }
    }

    /// Generates a fresh random key from the operating system.
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut key);
        Self::new(key)
    }

    /// Loads a key previously exported with [`to_base64`](Self::to_base64).
    pub fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(encoded.trim())
            .map_err(|_| CryptoError::InvalidKey)?;
        let key: [u8; KEY_LEN] = bytes.try_into().map_err(|_| CryptoError::InvalidKey)?;
        Ok(Self::new(key))
    }

    pub fn to_base64(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.key)
    }
}

impl Encrypter for SecretEncrypter {
    fn encrypt(&self, plaintext: &[u8]) -> Result<String, CryptoError> {
        let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|_| CryptoError::Encrypt)?;

        let mut packed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        packed.extend_from_slice(&nonce);
        packed.extend_from_slice(&ciphertext);
        Ok(URL_SAFE_NO_PAD.encode(packed))
    }

    fn decrypt(&self, token: &str) -> Result<Vec<u8>, CryptoError> {
        let packed = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|_| CryptoError::Decrypt)?;
        if packed.len() < NONCE_LEN {
            return Err(CryptoError::Decrypt);
        }
        let (nonce, ciphertext) = packed.split_at(NONCE_LEN);
        self.cipher
            .decrypt(XNonce::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::Decrypt)
    }

    fn key(&self) -> &[u8] {
        &self.key
    }
}

impl fmt::Debug for SecretEncrypter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretEncrypter").field("key", &"[redacted]").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_then_decrypt_returns_plaintext() {
        let encrypter = SecretEncrypter::generate();
        let token = encrypter.encrypt(b"hello").unwrap();
        assert_eq!(encrypter.decrypt(&token).unwrap(), b"hello");
    }

    #[test]
    fn same_plaintext_encrypts_differently() {
        let encrypter = SecretEncrypter::generate();
        let a = encrypter.encrypt(b"value").unwrap();
        let b = encrypter.encrypt(b"value").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn decrypt_rejects_foreign_key() {
        let token = SecretEncrypter::generate().encrypt(b"value").unwrap();
        let other = SecretEncrypter::generate();
        assert!(matches!(other.decrypt(&token), Err(CryptoError::Decrypt)));
    }

    #[test]
    fn decrypt_rejects_garbage() {
        let encrypter = SecretEncrypter::generate();
        assert!(encrypter.decrypt("not base64 at all!").is_err());
        assert!(encrypter.decrypt("c2hvcnQ").is_err());
    }

    #[test]
    fn key_survives_base64_export() {
        let encrypter = SecretEncrypter::generate();
        let restored = SecretEncrypter::from_base64(&encrypter.to_base64()).unwrap();
        let token = encrypter.encrypt(b"shared").unwrap();
        assert_eq!(restored.decrypt(&token).unwrap(), b"shared");
        assert!(SecretEncrypter::from_base64("AAAA").is_err());
    }
}

//! AES-256-GCM implementation of [`Cipher`].

use super::Cipher;
use crate::error::{CoreError, CoreResult};
use aes_gcm::{
    aead::{generic_array::GenericArray, Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of the AES-256 key in bytes.
pub const KEY_SIZE: usize = 32;
/// Size of the GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;
/// Size of the GCM authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

/// Symmetric session key.
///
/// The key is automatically zeroized when dropped for security.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey {
    bytes: [u8; KEY_SIZE],
}

impl EncryptionKey {
    /// Generates a new random encryption key.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Creates a key from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes slice is not exactly 32 bytes.
    pub fn from_bytes(bytes: &[u8]) -> CoreResult<Self> {
        if bytes.len() != KEY_SIZE {
            return Err(CoreError::invalid_key_size(bytes.len(), KEY_SIZE));
        }

        let mut key_bytes = [0u8; KEY_SIZE];
        key_bytes.copy_from_slice(bytes);
        Ok(Self { bytes: key_bytes })
    }

    /// Returns the key as a byte slice.
    ///
    /// # Security
    ///
    /// Be careful with this method - don't log or serialize the result.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// AES-256-GCM cipher.
///
/// Output format: `nonce (12 bytes) || ciphertext || tag (16 bytes)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AesGcmCipher;

impl AesGcmCipher {
    /// Creates the cipher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn aead(key: &EncryptionKey) -> Aes256Gcm {
        // EncryptionKey is always exactly KEY_SIZE bytes, matching AES-256.
        Aes256Gcm::new(GenericArray::from_slice(key.as_bytes()))
    }
}

impl Cipher for AesGcmCipher {
    fn encrypt(&self, key: &EncryptionKey, plaintext: &[u8]) -> CoreResult<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = Self::aead(key)
            .encrypt(nonce, plaintext)
            .map_err(|_| CoreError::encryption_failed("encryption error"))?;

        let mut result = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        result.extend_from_slice(&nonce_bytes);
        result.extend(ciphertext);

        Ok(result)
    }

    fn decrypt(&self, key: &EncryptionKey, ciphertext: &[u8]) -> CoreResult<Vec<u8>> {
        if ciphertext.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CoreError::decryption_failed("ciphertext too short"));
        }

        let nonce = Nonce::from_slice(&ciphertext[..NONCE_SIZE]);
        let encrypted = &ciphertext[NONCE_SIZE..];

        Self::aead(key)
            .decrypt(nonce, encrypted)
            .map_err(|_| CoreError::decryption_failed("authentication tag mismatch"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_key() {
        let key1 = EncryptionKey::generate();
        let key2 = EncryptionKey::generate();
        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn key_wrong_size() {
        assert!(EncryptionKey::from_bytes(&[0u8; 16]).is_err());
        assert!(EncryptionKey::from_bytes(&[0u8; 64]).is_err());
        assert!(EncryptionKey::from_bytes(&[7u8; KEY_SIZE]).is_ok());
    }

    #[test]
    fn key_debug_is_redacted() {
        let key = EncryptionKey::from_bytes(&[0x5A; KEY_SIZE]).unwrap();
        let rendered = format!("{key:?}");
        assert!(rendered.contains("REDACTED"));
        assert!(!rendered.contains("90"));
    }

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let key = EncryptionKey::generate();
        let cipher = AesGcmCipher::new();

        let ciphertext = cipher.encrypt(&key, b"Hello, VaultLog!").unwrap();
        assert_eq!(ciphertext.len(), NONCE_SIZE + 16 + TAG_SIZE);
        assert_eq!(cipher.decrypt(&key, &ciphertext).unwrap(), b"Hello, VaultLog!");
    }

    #[test]
    fn nonces_differ_between_calls() {
        let key = EncryptionKey::generate();
        let cipher = AesGcmCipher::new();
        let ct1 = cipher.encrypt(&key, b"same data").unwrap();
        let ct2 = cipher.encrypt(&key, b"same data").unwrap();
        assert_ne!(ct1, ct2);
    }

    #[test]
    fn decrypt_wrong_key_fails() {
        let cipher = AesGcmCipher::new();
        let ciphertext = cipher.encrypt(&EncryptionKey::generate(), b"secret").unwrap();
        let err = cipher
            .decrypt(&EncryptionKey::generate(), &ciphertext)
            .unwrap_err();
        assert!(matches!(err, CoreError::Decryption { .. }));
    }

    #[test]
    fn decrypt_corrupted_data_fails() {
        let key = EncryptionKey::generate();
        let cipher = AesGcmCipher::new();
        let mut ciphertext = cipher.encrypt(&key, b"data").unwrap();
        let len = ciphertext.len();
        ciphertext[len - 1] ^= 0xFF;
        assert!(cipher.decrypt(&key, &ciphertext).is_err());
    }

    #[test]
    fn decrypt_too_short_fails() {
        let key = EncryptionKey::generate();
        assert!(AesGcmCipher::new().decrypt(&key, &[0u8; 10]).is_err());
    }
}

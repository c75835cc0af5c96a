//! Cryptographic seam for VaultLog.
//!
//! Records and snapshots are sealed client-side before they leave the
//! process. The engine only talks to the [`Cipher`] trait; the shipped
//! implementation is [`AesGcmCipher`].
//!
//! ## Security Model
//!
//! - AES-256-GCM authenticated encryption
//! - Fresh random nonce per encryption, prepended to the ciphertext
//! - Keys are zeroized on drop and redacted from `Debug` output
//!
//! ## Usage
//!
//! ```
//! use vaultlog_core::crypto::{AesGcmCipher, Cipher, EncryptionKey};
//!
//! let key = EncryptionKey::generate();
//! let cipher = AesGcmCipher::new();
//!
//! let ciphertext = cipher.encrypt(&key, b"secret data").unwrap();
//! let plaintext = cipher.decrypt(&key, &ciphertext).unwrap();
//! assert_eq!(plaintext, b"secret data");
//! ```

mod encrypted;

pub use encrypted::{AesGcmCipher, EncryptionKey, KEY_SIZE, NONCE_SIZE, TAG_SIZE};

use crate::error::CoreResult;

/// Symmetric, authenticated encryption of opaque payloads.
pub trait Cipher: Send + Sync {
    /// Encrypts `plaintext` under `key`.
    fn encrypt(&self, key: &EncryptionKey, plaintext: &[u8]) -> CoreResult<Vec<u8>>;

    /// Decrypts and authenticates `ciphertext`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Decryption`](crate::CoreError::Decryption) when the
    /// ciphertext was tampered with or sealed under another key.
    fn decrypt(&self, key: &EncryptionKey, ciphertext: &[u8]) -> CoreResult<Vec<u8>>;
}

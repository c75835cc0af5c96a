//! Session context: the key source, the cipher and the auth guard.

use crate::error::{ClientError, ClientResult};
use crate::transport::TransportResult;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;
use vaultlog_core::{AesGcmCipher, Cipher, EncryptionKey};

/// Source of the session's encryption key.
#[async_trait]
pub trait KeyProvider: Send + Sync {
    /// Returns the key, or [`ClientError::NotAuthenticated`] if the session
    /// has none.
    async fn get_key(&self) -> ClientResult<EncryptionKey>;

    /// Removes every locally held credential.
    fn clear_authenticated_data(&self);
}

/// Key provider that holds the key in memory.
#[derive(Default)]
pub struct MemoryKeyStore {
    key: RwLock<Option<EncryptionKey>>,
    purges: AtomicU64,
}

impl MemoryKeyStore {
    /// Creates a store with no key.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding `key`.
    pub fn with_key(key: EncryptionKey) -> Self {
        Self {
            key: RwLock::new(Some(key)),
            purges: AtomicU64::new(0),
        }
    }

    /// Replaces the held key.
    pub fn set_key(&self, key: EncryptionKey) {
        *self.key.write() = Some(key);
    }

    /// Returns true while a key is held.
    pub fn is_authenticated(&self) -> bool {
        self.key.read().is_some()
    }

    /// Number of times the credentials were purged.
    pub fn purge_count(&self) -> u64 {
        self.purges.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for MemoryKeyStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryKeyStore")
            .field("authenticated", &self.is_authenticated())
            .field("purges", &self.purge_count())
            .finish()
    }
}

#[async_trait]
impl KeyProvider for MemoryKeyStore {
    async fn get_key(&self) -> ClientResult<EncryptionKey> {
        self.key.read().clone().ok_or(ClientError::NotAuthenticated)
    }

    fn clear_authenticated_data(&self) {
        // dropping the key zeroizes it
        self.key.write().take();
        self.purges.fetch_add(1, Ordering::SeqCst);
    }
}

/// Everything a session needs besides the transport.
#[derive(Clone)]
pub struct SessionContext {
    key_provider: Arc<dyn KeyProvider>,
    cipher: Arc<dyn Cipher>,
}

impl SessionContext {
    /// Creates a context using AES-256-GCM.
    pub fn new(key_provider: Arc<dyn KeyProvider>) -> Self {
        Self {
            key_provider,
            cipher: Arc::new(AesGcmCipher::new()),
        }
    }

    /// Replaces the cipher.
    pub fn with_cipher(mut self, cipher: Arc<dyn Cipher>) -> Self {
        self.cipher = cipher;
        self
    }

    /// Resolves the session key.
    pub async fn key(&self) -> ClientResult<EncryptionKey> {
        self.key_provider.get_key().await
    }

    /// The cipher used for records and bundles.
    pub fn cipher(&self) -> &dyn Cipher {
        self.cipher.as_ref()
    }

    /// Purges local credentials.
    pub fn purge_credentials(&self) {
        self.key_provider.clear_authenticated_data();
    }

    /// Awaits a transport call, purging credentials if it was rejected as
    /// unauthenticated.
    ///
    /// Unauthorized failures come back as [`ClientError::AuthExpired`] after
    /// the purge. Every other failure passes through as
    /// [`ClientError::Transport`].
    pub async fn guard<T, F>(&self, call: F) -> ClientResult<T>
    where
        F: Future<Output = TransportResult<T>>,
    {
        match call.await {
            Ok(value) => Ok(value),
            Err(err) if err.is_unauthorized() => {
                warn!(error = %err, "server rejected session credentials, purging local data");
                self.purge_credentials();
                Err(ClientError::AuthExpired(err.to_string()))
            }
            Err(err) => Err(ClientError::Transport(err)),
        }
    }
}

impl fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionContext").finish_non_exhaustive()
    }
}

//! Threshold compactor for the in-process server.

use async_trait::async_trait;
use std::sync::Arc;
use vaultlog_client::{BackgroundSignalError, CompactionOutcome, Compactor, MemoryTransport};
use vaultlog_core::{AesGcmCipher, Cipher, DbState, EncryptionKey, ReplayEngine};

/// Bundles the log of a [`MemoryTransport`] once enough entries pile up
/// behind the last bundle.
///
/// The bundle is built the way a client would: open the previous bundle,
/// replay the retained entries on it and seal the result.
pub struct BundlingCompactor {
    transport: Arc<MemoryTransport>,
    cipher: Arc<dyn Cipher>,
    threshold: usize,
}

impl BundlingCompactor {
    /// Bundles whenever at least `threshold` entries are unbundled.
    pub fn new(transport: Arc<MemoryTransport>, threshold: usize) -> Self {
        Self {
            transport,
            cipher: Arc::new(AesGcmCipher::new()),
            threshold: threshold.max(1),
        }
    }

    /// Bundles the log now, regardless of the threshold.
    pub fn compact_now(&self, key: &EncryptionKey) -> Result<CompactionOutcome, BackgroundSignalError> {
        let base = match self.transport.bundle() {
            Some((_, snapshot)) => {
                DbState::open(self.cipher.as_ref(), key, &snapshot).map_err(compaction_failed)?
            }
            None => DbState::new(),
        };
        let entries = self.transport.log_entries();
        if entries.is_empty() {
            return Ok(CompactionOutcome::Skipped);
        }

        let outcome = ReplayEngine::new(self.cipher.as_ref(), key)
            .apply(&base, &entries)
            .map_err(compaction_failed)?;
        let bundle_seq_no = outcome.state.max_sequence_no();
        let snapshot = outcome
            .state
            .seal(self.cipher.as_ref(), key)
            .map_err(compaction_failed)?;
        self.transport
            .install_bundle(bundle_seq_no, snapshot)
            .map_err(compaction_failed)?;

        Ok(CompactionOutcome::Compacted { bundle_seq_no })
    }
}

fn compaction_failed(err: impl std::fmt::Display) -> BackgroundSignalError {
    BackgroundSignalError::Compaction(err.to_string())
}

#[async_trait]
impl Compactor for BundlingCompactor {
    async fn compact_if_needed(
        &self,
        key: &EncryptionKey,
    ) -> Result<CompactionOutcome, BackgroundSignalError> {
        if self.transport.log_len() < self.threshold {
            return Ok(CompactionOutcome::Skipped);
        }
        self.compact_now(key)
    }
}

//! Replay engine: folds a contiguous log into a base state.

use crate::crypto::{Cipher, EncryptionKey};
use crate::error::{CoreError, CoreResult};
use crate::record::Record;
use crate::state::DbState;
use tracing::warn;
use vaultlog_protocol::{ItemId, OperationKind, SequenceNo, TransactionLogEntry};

/// Counters describing one replay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    /// Log entries applied.
    pub entries_applied: u64,
    /// Items appended.
    pub items_inserted: u64,
    /// Items overwritten in place.
    pub items_updated: u64,
    /// Items turned into tombstones.
    pub items_deleted: u64,
    /// Updates and deletes that named an item which is not live.
    pub items_skipped: u64,
}

/// Result of a successful replay.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayOutcome {
    /// The new state.
    pub state: DbState,
    /// What the replay did.
    pub stats: ReplayStats,
}

/// Replays transaction log entries on top of a base state.
///
/// The engine is pure: it never touches the base state and never installs
/// anything. All work happens on a scratch copy that is returned only when
/// every entry applied cleanly.
///
/// # Rules
///
/// - Entries are applied in ascending sequence order and must continue
///   exactly at `base.max_sequence_no() + 1` with no holes or duplicates
/// - Insert appends at the next unused position
/// - Update overwrites in place; delete leaves a tombstone and drops the
///   id mapping
/// - Updates and deletes of ids that are not live are skipped
pub struct ReplayEngine<'a, C: Cipher + ?Sized> {
    cipher: &'a C,
    key: &'a EncryptionKey,
}

impl<'a, C: Cipher + ?Sized> ReplayEngine<'a, C> {
    /// Creates an engine that decrypts with `cipher` under `key`.
    pub fn new(cipher: &'a C, key: &'a EncryptionKey) -> Self {
        Self { cipher, key }
    }

    /// Applies `log` to a copy of `base`.
    ///
    /// # Errors
    ///
    /// - [`CoreError::SequenceGap`] if the log is not contiguous from the base
    /// - [`CoreError::Decryption`] if a payload fails authentication
    /// - [`CoreError::DuplicateItem`] if an insert reuses a live id
    /// - [`CoreError::Protocol`] for malformed entry framing
    pub fn apply(&self, base: &DbState, log: &[TransactionLogEntry]) -> CoreResult<ReplayOutcome> {
        let mut ordered: Vec<&TransactionLogEntry> = log.iter().collect();
        ordered.sort_by_key(|entry| entry.sequence_no);
        check_contiguous(base.max_sequence_no(), &ordered)?;

        let mut scratch = base.clone();
        let mut stats = ReplayStats::default();

        for entry in ordered {
            self.apply_entry(&mut scratch, entry, &mut stats)?;
            scratch.set_max_sequence_no(entry.sequence_no);
            stats.entries_applied += 1;
        }

        Ok(ReplayOutcome {
            state: scratch,
            stats,
        })
    }

    fn apply_entry(
        &self,
        state: &mut DbState,
        entry: &TransactionLogEntry,
        stats: &mut ReplayStats,
    ) -> CoreResult<()> {
        let seq = entry.sequence_no;

        match entry.kind {
            OperationKind::Insert => {
                for (item_id, ciphertext) in entry.ciphertexts()? {
                    let record = self.open(seq, item_id, ciphertext)?;
                    if state.contains(&item_id) {
                        return Err(CoreError::DuplicateItem {
                            item_id,
                            sequence_no: seq,
                        });
                    }
                    state.insert_item(item_id, record);
                    stats.items_inserted += 1;
                }
            }
            OperationKind::Update => {
                for (item_id, ciphertext) in entry.ciphertexts()? {
                    let record = self.open(seq, item_id, ciphertext)?;
                    if state.update_item(&item_id, record).is_some() {
                        stats.items_updated += 1;
                    } else {
                        warn!(sequence_no = seq, %item_id, "update of unknown item skipped");
                        stats.items_skipped += 1;
                    }
                }
            }
            OperationKind::Delete => {
                entry.validate()?;
                for item_id in entry.item_ids() {
                    if state.delete_item(&item_id).is_some() {
                        stats.items_deleted += 1;
                    } else {
                        warn!(sequence_no = seq, %item_id, "delete of unknown item skipped");
                        stats.items_skipped += 1;
                    }
                }
            }
        }

        Ok(())
    }

    fn open(&self, seq: SequenceNo, item_id: ItemId, ciphertext: &[u8]) -> CoreResult<Record> {
        Record::open(self.cipher, self.key, ciphertext).map_err(|e| match e {
            CoreError::Decryption { message } => {
                CoreError::decryption_failed(format!("entry {seq}, item {item_id}: {message}"))
            }
            other => other,
        })
    }
}

fn check_contiguous(base_seq: SequenceNo, ordered: &[&TransactionLogEntry]) -> CoreResult<()> {
    let mut expected = base_seq + 1;
    for entry in ordered {
        if entry.sequence_no != expected {
            return Err(CoreError::sequence_gap(expected, entry.sequence_no));
        }
        expected += 1;
    }
    Ok(())
}

//! Transaction log entries.

use crate::error::{ProtocolError, ProtocolResult};
use crate::ids::{ItemId, SequenceNo};
use serde::{Deserialize, Serialize};

/// Kind of mutation recorded by a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    /// Item was created.
    Insert,
    /// Item was replaced in place.
    Update,
    /// Item was deleted.
    Delete,
}

impl OperationKind {
    /// Returns true if entries of this kind carry an encrypted payload.
    pub fn carries_payload(&self) -> bool {
        !matches!(self, OperationKind::Delete)
    }
}

/// An item referenced by a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryItem {
    /// The item the operation targets.
    pub item_id: ItemId,
    /// Length of this item's ciphertext inside a batched payload.
    pub byte_length: Option<u64>,
}

impl EntryItem {
    /// An item of a single (non-batched) entry.
    pub fn single(item_id: ItemId) -> Self {
        Self {
            item_id,
            byte_length: None,
        }
    }

    /// An item of a batched entry whose ciphertext spans `byte_length` bytes.
    pub fn batched(item_id: ItemId, byte_length: u64) -> Self {
        Self {
            item_id,
            byte_length: Some(byte_length),
        }
    }
}

/// A single entry of the server-held transaction log.
///
/// # Framing
///
/// - A single-item entry has one item without a byte length; the whole
///   payload is that item's ciphertext.
/// - A batched entry lists every item with its byte length; the payload is
///   the concatenation of the ciphertexts in item order.
/// - Delete entries never carry a payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionLogEntry {
    /// Position of this entry in the total order of the log.
    pub sequence_no: SequenceNo,
    /// Kind of mutation.
    pub kind: OperationKind,
    /// Items touched by this entry, in submission order.
    pub items: Vec<EntryItem>,
    /// Encrypted payload (absent for deletes).
    pub payload: Option<Vec<u8>>,
}

impl TransactionLogEntry {
    /// Creates an insert entry for one item.
    pub fn insert(sequence_no: SequenceNo, item_id: ItemId, ciphertext: Vec<u8>) -> Self {
        Self::single(sequence_no, OperationKind::Insert, item_id, Some(ciphertext))
    }

    /// Creates an update entry for one item.
    pub fn update(sequence_no: SequenceNo, item_id: ItemId, ciphertext: Vec<u8>) -> Self {
        Self::single(sequence_no, OperationKind::Update, item_id, Some(ciphertext))
    }

    /// Creates a delete entry for one item.
    pub fn delete(sequence_no: SequenceNo, item_id: ItemId) -> Self {
        Self::single(sequence_no, OperationKind::Delete, item_id, None)
    }

    /// Creates a batched insert entry from a concatenated buffer.
    pub fn batch_insert(sequence_no: SequenceNo, items: Vec<EntryItem>, buffer: Vec<u8>) -> Self {
        Self {
            sequence_no,
            kind: OperationKind::Insert,
            items,
            payload: Some(buffer),
        }
    }

    /// Creates a batched update entry from a concatenated buffer.
    pub fn batch_update(sequence_no: SequenceNo, items: Vec<EntryItem>, buffer: Vec<u8>) -> Self {
        Self {
            sequence_no,
            kind: OperationKind::Update,
            items,
            payload: Some(buffer),
        }
    }

    /// Creates a batched delete entry.
    pub fn batch_delete(sequence_no: SequenceNo, item_ids: &[ItemId]) -> Self {
        Self {
            sequence_no,
            kind: OperationKind::Delete,
            items: item_ids.iter().copied().map(EntryItem::single).collect(),
            payload: None,
        }
    }

    fn single(
        sequence_no: SequenceNo,
        kind: OperationKind,
        item_id: ItemId,
        payload: Option<Vec<u8>>,
    ) -> Self {
        Self {
            sequence_no,
            kind,
            items: vec![EntryItem::single(item_id)],
            payload,
        }
    }

    /// Returns true if the payload is a concatenation of several ciphertexts.
    pub fn is_batched(&self) -> bool {
        self.items.len() > 1 || self.items.iter().any(|i| i.byte_length.is_some())
    }

    /// Iterates over the ids of the items this entry touches.
    pub fn item_ids(&self) -> impl Iterator<Item = ItemId> + '_ {
        self.items.iter().map(|i| i.item_id)
    }

    /// Checks the framing rules without touching the ciphertext.
    pub fn validate(&self) -> ProtocolResult<()> {
        if self.items.is_empty() {
            return Err(ProtocolError::malformed(self.sequence_no, "entry has no items"));
        }

        if !self.kind.carries_payload() {
            if self.payload.is_some() {
                return Err(ProtocolError::malformed(
                    self.sequence_no,
                    "delete entry carries a payload",
                ));
            }
            return Ok(());
        }

        let Some(payload) = self.payload.as_ref() else {
            return Err(ProtocolError::malformed(
                self.sequence_no,
                format!("{:?} entry without payload", self.kind),
            ));
        };

        if !self.is_batched() {
            return Ok(());
        }

        let mut total: u64 = 0;
        for item in &self.items {
            let Some(len) = item.byte_length else {
                return Err(ProtocolError::malformed(
                    self.sequence_no,
                    format!("batched item {} has no byte length", item.item_id),
                ));
            };
            total = total.saturating_add(len);
        }

        if total != payload.len() as u64 {
            return Err(ProtocolError::malformed(
                self.sequence_no,
                format!(
                    "byte lengths sum to {total} but payload is {} bytes",
                    payload.len()
                ),
            ));
        }

        Ok(())
    }

    /// Splits the payload into per-item ciphertexts, preserving item order.
    ///
    /// Returns an empty list for delete entries.
    pub fn ciphertexts(&self) -> ProtocolResult<Vec<(ItemId, &[u8])>> {
        self.validate()?;

        let Some(payload) = self.payload.as_deref() else {
            return Ok(Vec::new());
        };

        if !self.is_batched() {
            return Ok(vec![(self.items[0].item_id, payload)]);
        }

        let mut out = Vec::with_capacity(self.items.len());
        let mut offset = 0usize;
        for item in &self.items {
            // validate() guarantees every length is present and in bounds
            let len = item.byte_length.unwrap_or_default() as usize;
            out.push((item.item_id, &payload[offset..offset + len]));
            offset += len;
        }
        Ok(out)
    }
}

/// Concatenates ciphertexts into one buffer and records each length.
pub fn concat_ciphertexts(ciphertexts: &[Vec<u8>]) -> (Vec<u8>, Vec<u64>) {
    let total = ciphertexts.iter().map(Vec::len).sum();
    let mut buffer = Vec::with_capacity(total);
    let mut lengths = Vec::with_capacity(ciphertexts.len());
    for ct in ciphertexts {
        buffer.extend_from_slice(ct);
        lengths.push(ct.len() as u64);
    }
    (buffer, lengths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn batched_entry(parts: &[Vec<u8>]) -> (TransactionLogEntry, Vec<ItemId>) {
        let (buffer, lengths) = concat_ciphertexts(parts);
        let ids: Vec<ItemId> = parts.iter().map(|_| ItemId::new()).collect();
        let items = ids
            .iter()
            .zip(lengths)
            .map(|(id, len)| EntryItem::batched(*id, len))
            .collect();
        (TransactionLogEntry::batch_insert(7, items, buffer), ids)
    }

    #[test]
    fn single_entry_yields_whole_payload() {
        let id = ItemId::new();
        let entry = TransactionLogEntry::insert(1, id, vec![1, 2, 3]);
        assert!(!entry.is_batched());
        let parts = entry.ciphertexts().unwrap();
        assert_eq!(parts, vec![(id, &[1u8, 2, 3][..])]);
    }

    #[test]
    fn batch_split_preserves_order() {
        let (entry, ids) = batched_entry(&[vec![0xA; 3], vec![0xB; 1], vec![0xC; 5]]);
        let parts = entry.ciphertexts().unwrap();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], (ids[0], &[0xAu8; 3][..]));
        assert_eq!(parts[1], (ids[1], &[0xBu8; 1][..]));
        assert_eq!(parts[2], (ids[2], &[0xCu8; 5][..]));
    }

    #[test]
    fn batch_lengths_must_cover_payload() {
        let (mut entry, _) = batched_entry(&[vec![1; 4], vec![2; 4]]);
        entry.payload.as_mut().unwrap().push(0);
        let err = entry.ciphertexts().unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedEntry { sequence_no: 7, .. }));
    }

    #[test]
    fn batch_item_without_length_is_rejected() {
        let (mut entry, _) = batched_entry(&[vec![1; 4], vec![2; 4]]);
        entry.items[1].byte_length = None;
        assert!(entry.validate().is_err());
    }

    #[test]
    fn delete_with_payload_is_rejected() {
        let mut entry = TransactionLogEntry::delete(3, ItemId::new());
        assert!(entry.validate().is_ok());
        assert!(entry.ciphertexts().unwrap().is_empty());

        entry.payload = Some(vec![0]);
        assert!(entry.validate().is_err());
    }

    #[test]
    fn insert_without_payload_is_rejected() {
        let mut entry = TransactionLogEntry::insert(3, ItemId::new(), vec![9]);
        entry.payload = None;
        assert!(entry.validate().is_err());
    }

    #[test]
    fn batch_delete_lists_every_id() {
        let ids = [ItemId::new(), ItemId::new()];
        let entry = TransactionLogEntry::batch_delete(4, &ids);
        assert_eq!(entry.item_ids().collect::<Vec<_>>(), ids.to_vec());
        assert!(entry.validate().is_ok());
    }

    proptest! {
        #[test]
        fn split_recovers_every_part(parts in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 1..8)) {
            let (entry, ids) = batched_entry(&parts);
            let split = entry.ciphertexts().unwrap();
            prop_assert_eq!(split.len(), parts.len());
            for ((id, ct), (expected_id, expected)) in split.iter().zip(ids.iter().zip(parts.iter())) {
                prop_assert_eq!(id, expected_id);
                prop_assert_eq!(*ct, expected.as_slice());
            }
        }
    }
}

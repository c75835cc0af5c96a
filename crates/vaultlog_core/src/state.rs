//! Database state snapshots ("bundles").

use crate::crypto::{Cipher, EncryptionKey};
use crate::error::{CoreError, CoreResult};
use crate::item::{Item, ItemSlots, LiveItems, Position};
use crate::record::Record;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use vaultlog_protocol::{from_cbor, to_cbor, EncryptedSnapshot, ItemId, SequenceNo};

/// The reconstructed database at a given sequence number.
///
/// # Invariants
///
/// - `item_ids_to_order_of_insertion` maps exactly the live items to their slot
/// - `max_sequence_no` is the last log entry folded into this state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DbState {
    items_in_order_of_insertion: ItemSlots,
    item_ids_to_order_of_insertion: BTreeMap<ItemId, Position>,
    max_sequence_no: SequenceNo,
}

impl DbState {
    /// Creates an empty state at sequence number 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Assembles a state from its parts, checking that they agree.
    pub fn from_parts(
        items: ItemSlots,
        item_id_to_position: BTreeMap<ItemId, Position>,
        max_sequence_no: SequenceNo,
    ) -> CoreResult<Self> {
        let state = Self {
            items_in_order_of_insertion: items,
            item_ids_to_order_of_insertion: item_id_to_position,
            max_sequence_no,
        };
        state.check_consistency()?;
        Ok(state)
    }

    /// Splits the state into its parts.
    pub fn into_parts(self) -> (ItemSlots, BTreeMap<ItemId, Position>, SequenceNo) {
        (
            self.items_in_order_of_insertion,
            self.item_ids_to_order_of_insertion,
            self.max_sequence_no,
        )
    }

    /// Items in insertion order, tombstones included.
    pub fn items(&self) -> &ItemSlots {
        &self.items_in_order_of_insertion
    }

    /// Map from live item ids to their positions.
    pub fn item_id_to_position(&self) -> &BTreeMap<ItemId, Position> {
        &self.item_ids_to_order_of_insertion
    }

    /// Highest sequence number folded into this state.
    pub fn max_sequence_no(&self) -> SequenceNo {
        self.max_sequence_no
    }

    /// Position of a live item.
    pub fn position_of(&self, item_id: &ItemId) -> Option<Position> {
        self.item_ids_to_order_of_insertion.get(item_id).copied()
    }

    /// Looks up a live item by id.
    pub fn get(&self, item_id: &ItemId) -> Option<&Item> {
        self.position_of(item_id)
            .and_then(|p| self.items_in_order_of_insertion.get(p))
    }

    /// Returns true if `item_id` is live.
    pub fn contains(&self, item_id: &ItemId) -> bool {
        self.item_ids_to_order_of_insertion.contains_key(item_id)
    }

    /// Lazy iterator over live items in insertion order.
    pub fn live_items(&self) -> LiveItems<'_> {
        self.items_in_order_of_insertion.live()
    }

    /// Verifies that the id map and the slots describe the same live items.
    pub fn check_consistency(&self) -> CoreResult<()> {
        for (id, &position) in &self.item_ids_to_order_of_insertion {
            match self.items_in_order_of_insertion.get(position) {
                Some(item) if item.item_id == *id && item.position == position => {}
                Some(item) => {
                    return Err(CoreError::inconsistent(format!(
                        "id {id} maps to position {position} holding {}",
                        item.item_id
                    )))
                }
                None => {
                    return Err(CoreError::inconsistent(format!(
                        "id {id} maps to empty position {position}"
                    )))
                }
            }
        }

        let live = self.items_in_order_of_insertion.live_count();
        if live != self.item_ids_to_order_of_insertion.len() {
            return Err(CoreError::inconsistent(format!(
                "{live} live slots but {} mapped ids",
                self.item_ids_to_order_of_insertion.len()
            )));
        }

        Ok(())
    }

    /// Encodes and encrypts the state into a bundle.
    pub fn seal<C: Cipher + ?Sized>(
        &self,
        cipher: &C,
        key: &EncryptionKey,
    ) -> CoreResult<EncryptedSnapshot> {
        let plaintext = to_cbor(self).map_err(|e| CoreError::codec(e.to_string()))?;
        Ok(EncryptedSnapshot::new(cipher.encrypt(key, &plaintext)?))
    }

    /// Decrypts, decodes and validates a bundle.
    pub fn open<C: Cipher + ?Sized>(
        cipher: &C,
        key: &EncryptionKey,
        snapshot: &EncryptedSnapshot,
    ) -> CoreResult<Self> {
        let plaintext = cipher.decrypt(key, snapshot.as_bytes())?;
        let state: Self = from_cbor(&plaintext).map_err(|e| CoreError::codec(e.to_string()))?;
        state.check_consistency()?;
        Ok(state)
    }

    pub(crate) fn insert_item(&mut self, item_id: ItemId, record: Record) -> Position {
        let position = self.items_in_order_of_insertion.push(item_id, record);
        self.item_ids_to_order_of_insertion.insert(item_id, position);
        position
    }

    pub(crate) fn update_item(&mut self, item_id: &ItemId, record: Record) -> Option<Position> {
        let position = self.position_of(item_id)?;
        self.items_in_order_of_insertion
            .replace(position, record)
            .then_some(position)
    }

    pub(crate) fn delete_item(&mut self, item_id: &ItemId) -> Option<Position> {
        let position = self.item_ids_to_order_of_insertion.remove(item_id)?;
        self.items_in_order_of_insertion.tombstone(position);
        Some(position)
    }

    pub(crate) fn set_max_sequence_no(&mut self, sequence_no: SequenceNo) {
        self.max_sequence_no = self.max_sequence_no.max(sequence_no);
    }
}

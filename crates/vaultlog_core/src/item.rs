//! Items and the positional slot container.

use crate::record::Record;
use serde::{Deserialize, Serialize};
use std::iter::FusedIterator;
use vaultlog_protocol::ItemId;

/// Stable insertion-order index of an item.
pub type Position = usize;

/// A live item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Identifier chosen by the client that inserted the item.
    pub item_id: ItemId,
    /// Latest version of the application payload.
    pub record: Record,
    /// Slot assigned at first insertion.
    pub position: Position,
}

/// Items in order of insertion, with tombstones kept in place.
///
/// A slot is `None` once its item has been deleted. Slots are never removed
/// or shifted, so a [`Position`] stays valid for the lifetime of the state.
/// [`as_slice`](Self::as_slice) exposes the raw positional view and
/// [`live`](Self::live) iterates over the surviving items only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemSlots {
    slots: Vec<Option<Item>>,
}

impl ItemSlots {
    /// Creates an empty container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of slots, tombstones included.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns true if no item was ever inserted.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of live items.
    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Returns the item at `position`, or `None` for a tombstone or an
    /// out-of-range position.
    pub fn get(&self, position: Position) -> Option<&Item> {
        self.slots.get(position).and_then(Option::as_ref)
    }

    /// Returns true if `position` holds a tombstone.
    pub fn is_tombstone(&self, position: Position) -> bool {
        matches!(self.slots.get(position), Some(None))
    }

    /// Raw positional view, tombstones included.
    pub fn as_slice(&self) -> &[Option<Item>] {
        &self.slots
    }

    /// Lazy iterator over live items in insertion order.
    ///
    /// Each call starts a fresh pass; the underlying slots are untouched.
    pub fn live(&self) -> LiveItems<'_> {
        LiveItems {
            inner: self.slots.iter(),
        }
    }

    /// Appends an item at the next unused position.
    pub(crate) fn push(&mut self, item_id: ItemId, record: Record) -> Position {
        let position = self.slots.len();
        self.slots.push(Some(Item {
            item_id,
            record,
            position,
        }));
        position
    }

    /// Replaces the record of the live item at `position`.
    ///
    /// Returns false if the slot is a tombstone or out of range.
    pub(crate) fn replace(&mut self, position: Position, record: Record) -> bool {
        match self.slots.get_mut(position) {
            Some(Some(item)) => {
                item.record = record;
                true
            }
            _ => false,
        }
    }

    /// Turns the slot at `position` into a tombstone.
    pub(crate) fn tombstone(&mut self, position: Position) -> Option<Item> {
        self.slots.get_mut(position).and_then(Option::take)
    }
}

/// Iterator over the live items of an [`ItemSlots`].
#[derive(Debug, Clone)]
pub struct LiveItems<'a> {
    inner: std::slice::Iter<'a, Option<Item>>,
}

impl<'a> Iterator for LiveItems<'a> {
    type Item = &'a Item;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.by_ref().find_map(Option::as_ref)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, self.inner.size_hint().1)
    }
}

impl DoubleEndedIterator for LiveItems<'_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.by_ref().rev().find_map(Option::as_ref)
    }
}

impl FusedIterator for LiveItems<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use ciborium::Value;

    fn record(text: &str) -> Record {
        Record::new(Value::Text(text.into()))
    }

    fn slots_abc() -> (ItemSlots, [ItemId; 3]) {
        let ids = [ItemId::new(), ItemId::new(), ItemId::new()];
        let mut slots = ItemSlots::new();
        for (id, text) in ids.iter().zip(["a", "b", "c"]) {
            slots.push(*id, record(text));
        }
        (slots, ids)
    }

    #[test]
    fn positions_follow_insertion_order() {
        let (slots, ids) = slots_abc();
        for (position, id) in ids.iter().enumerate() {
            let item = slots.get(position).unwrap();
            assert_eq!(item.item_id, *id);
            assert_eq!(item.position, position);
        }
    }

    #[test]
    fn tombstone_keeps_neighbours_in_place() {
        let (mut slots, ids) = slots_abc();
        let removed = slots.tombstone(1).unwrap();
        assert_eq!(removed.item_id, ids[1]);

        assert_eq!(slots.len(), 3);
        assert!(slots.is_tombstone(1));
        assert_eq!(slots.get(2).unwrap().item_id, ids[2]);
        assert_eq!(slots.get(2).unwrap().position, 2);
        assert!(slots.as_slice()[1].is_none());
    }

    #[test]
    fn new_items_never_reuse_tombstones() {
        let (mut slots, _) = slots_abc();
        slots.tombstone(0);
        let position = slots.push(ItemId::new(), record("d"));
        assert_eq!(position, 3);
        assert!(slots.is_tombstone(0));
    }

    #[test]
    fn live_iterator_skips_holes_and_restarts() {
        let (mut slots, ids) = slots_abc();
        slots.tombstone(0);
        slots.tombstone(1);

        let live: Vec<_> = slots.live().map(|i| i.item_id).collect();
        assert_eq!(live, vec![ids[2]]);
        // a second pass sees the same items
        assert_eq!(slots.live().count(), 1);
        assert_eq!(slots.live_count(), 1);
        assert_eq!(slots.len(), 3);
    }

    #[test]
    fn live_iterator_reverse() {
        let (mut slots, ids) = slots_abc();
        slots.tombstone(2);
        let rev: Vec<_> = slots.live().rev().map(|i| i.item_id).collect();
        assert_eq!(rev, vec![ids[1], ids[0]]);
    }

    #[test]
    fn empty_and_all_deleted_iterate_nothing() {
        assert_eq!(ItemSlots::new().live().next(), None);

        let (mut slots, _) = slots_abc();
        for p in 0..3 {
            slots.tombstone(p);
        }
        assert_eq!(slots.live().next(), None);
    }

    #[test]
    fn replace_refuses_tombstones() {
        let (mut slots, _) = slots_abc();
        assert!(slots.replace(0, record("a2")));
        assert_eq!(slots.get(0).unwrap().record, record("a2"));

        slots.tombstone(1);
        assert!(!slots.replace(1, record("b2")));
        assert!(!slots.replace(9, record("z")));
    }
}

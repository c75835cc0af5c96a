//! The live state store.

use crate::error::CoreResult;
use crate::item::{Item, ItemSlots, LiveItems, Position};
use crate::state::DbState;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use vaultlog_protocol::{ItemId, SequenceNo};

/// Holds the current reconstructed state of a session.
///
/// The state is only ever replaced as a whole. Readers take a cheap
/// `Arc` snapshot and keep a consistent view even while a newer state is
/// being installed; an install is visible only once the pointer swap
/// completes.
#[derive(Debug, Default)]
pub struct StateStore {
    current: RwLock<Arc<DbState>>,
}

impl StateStore {
    /// Creates an empty store at sequence number 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current state.
    pub fn snapshot(&self) -> Arc<DbState> {
        self.current.read().clone()
    }

    /// Read-only positional view of the items, tombstones included.
    pub fn get_items(&self) -> ItemsView {
        ItemsView {
            state: self.snapshot(),
        }
    }

    /// Copy of the live id to position map.
    pub fn get_item_id_to_position(&self) -> BTreeMap<ItemId, Position> {
        self.current.read().item_id_to_position().clone()
    }

    /// Highest sequence number reflected by the store.
    pub fn get_max_sequence_no(&self) -> SequenceNo {
        self.current.read().max_sequence_no()
    }

    /// Replaces the whole state from its parts.
    ///
    /// The parts are validated first; on error nothing changes.
    pub fn set_state(
        &self,
        items: ItemSlots,
        item_id_to_position: BTreeMap<ItemId, Position>,
        max_sequence_no: SequenceNo,
    ) -> CoreResult<()> {
        let state = DbState::from_parts(items, item_id_to_position, max_sequence_no)?;
        self.install(state);
        Ok(())
    }

    /// Replaces the whole state. The last install wins.
    pub fn install(&self, state: DbState) {
        *self.current.write() = Arc::new(state);
    }

    /// Replaces the state unless the store already holds a newer one.
    ///
    /// Returns false, leaving the store untouched, if the current
    /// `max_sequence_no` is higher than the candidate's.
    pub fn install_if_newer(&self, state: DbState) -> bool {
        let mut current = self.current.write();
        if state.max_sequence_no() < current.max_sequence_no() {
            return false;
        }
        *current = Arc::new(state);
        true
    }

    /// Drops all items and returns to sequence number 0.
    pub fn reset(&self) {
        self.install(DbState::new());
    }
}

/// A consistent, read-only view of the items at one point in time.
#[derive(Debug, Clone)]
pub struct ItemsView {
    state: Arc<DbState>,
}

impl ItemsView {
    /// Raw slots in insertion order; deleted items appear as `None`.
    pub fn raw(&self) -> &[Option<Item>] {
        self.state.items().as_slice()
    }

    /// Lazy iterator over the live items. Can be called any number of times.
    pub fn live(&self) -> LiveItems<'_> {
        self.state.live_items()
    }

    /// Item at `position`, if live.
    pub fn get(&self, position: Position) -> Option<&Item> {
        self.state.items().get(position)
    }

    /// Number of slots, tombstones included.
    pub fn len(&self) -> usize {
        self.state.items().len()
    }

    /// Returns true if no item was ever inserted.
    pub fn is_empty(&self) -> bool {
        self.state.items().is_empty()
    }

    /// Sequence number this view reflects.
    pub fn max_sequence_no(&self) -> SequenceNo {
        self.state.max_sequence_no()
    }

    /// The state behind this view.
    pub fn state(&self) -> &Arc<DbState> {
        &self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;
    use ciborium::Value;

    fn state_with(n: usize, seq: SequenceNo) -> DbState {
        let mut state = DbState::new();
        for i in 0..n {
            state.insert_item(ItemId::new(), Record::new(Value::Integer((i as i64).into())));
        }
        state.set_max_sequence_no(seq);
        state
    }

    #[test]
    fn starts_empty() {
        let store = StateStore::new();
        assert_eq!(store.get_max_sequence_no(), 0);
        assert!(store.get_items().is_empty());
        assert!(store.get_item_id_to_position().is_empty());
    }

    #[test]
    fn views_outlive_installs() {
        let store = StateStore::new();
        store.install(state_with(2, 2));
        let before = store.get_items();

        store.install(state_with(5, 5));

        assert_eq!(before.len(), 2);
        assert_eq!(before.max_sequence_no(), 2);
        assert_eq!(store.get_items().len(), 5);
    }

    #[test]
    fn set_state_validates_parts() {
        let store = StateStore::new();
        store.install(state_with(1, 1));
        let original = store.snapshot();

        let mut slots = ItemSlots::new();
        slots.push(ItemId::new(), Record::new(Value::Null));
        // live slot without a mapping
        assert!(store.set_state(slots.clone(), BTreeMap::new(), 9).is_err());
        assert!(Arc::ptr_eq(&original, &store.snapshot()));

        let id = slots.get(0).unwrap().item_id;
        let map = BTreeMap::from([(id, 0)]);
        store.set_state(slots, map, 9).unwrap();
        assert_eq!(store.get_max_sequence_no(), 9);
        assert_eq!(store.get_item_id_to_position().get(&id), Some(&0));
    }

    #[test]
    fn last_install_wins_even_if_older() {
        let store = StateStore::new();
        store.install(state_with(3, 3));
        store.install(state_with(1, 1));
        assert_eq!(store.get_max_sequence_no(), 1);
    }

    #[test]
    fn guarded_install_rejects_stale_state() {
        let store = StateStore::new();
        assert!(store.install_if_newer(state_with(3, 3)));
        assert!(!store.install_if_newer(state_with(1, 1)));
        assert_eq!(store.get_max_sequence_no(), 3);
        assert!(store.install_if_newer(state_with(4, 3)));
        assert_eq!(store.get_items().len(), 4);
    }

    #[test]
    fn live_view_skips_tombstones() {
        let mut state = state_with(3, 3);
        let middle = state.items().get(1).unwrap().item_id;
        state.delete_item(&middle);
        let store = StateStore::new();
        store.install(state);

        let view = store.get_items();
        assert_eq!(view.raw().len(), 3);
        assert!(view.raw()[1].is_none());
        assert_eq!(view.live().count(), 2);
        assert_eq!(view.live().count(), 2);
        assert_eq!(view.get(2).unwrap().position, 2);
    }

    #[test]
    fn reset_clears_everything() {
        let store = StateStore::new();
        store.install(state_with(2, 7));
        store.reset();
        assert_eq!(store.get_max_sequence_no(), 0);
        assert!(store.get_items().is_empty());
    }
}

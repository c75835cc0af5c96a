//! Property-based test generators using proptest.
//!
//! A [`HistoryOp`] sequence drives a client through mutations while a
//! [`SlotModel`] tracks what the positional view must look like after the
//! next sync.

use crate::fixtures::text_record;
use proptest::prelude::*;
use vaultlog_client::{ClientResult, EncryptedDb, Transport};
use vaultlog_core::Record;
use vaultlog_protocol::ItemId;

/// One caller-level mutation.
///
/// Targets are indices into the ids inserted so far, taken modulo their
/// count, so they may name deleted items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryOp {
    /// Insert one record.
    Insert(String),
    /// Insert several records as one entry.
    BatchInsert(Vec<String>),
    /// Update one item.
    Update(usize, String),
    /// Update several items as one entry.
    BatchUpdate(Vec<(usize, String)>),
    /// Delete one item.
    Delete(usize),
    /// Delete several items as one entry.
    BatchDelete(Vec<usize>),
}

/// Strategy for short record texts.
pub fn text_strategy() -> impl Strategy<Value = String> {
    "[a-z]{1,8}"
}

/// Strategy for a single history operation.
pub fn history_op_strategy() -> impl Strategy<Value = HistoryOp> {
    prop_oneof![
        3 => text_strategy().prop_map(HistoryOp::Insert),
        2 => prop::collection::vec(text_strategy(), 1..5).prop_map(HistoryOp::BatchInsert),
        2 => (any::<usize>(), text_strategy()).prop_map(|(t, s)| HistoryOp::Update(t, s)),
        1 => prop::collection::vec((any::<usize>(), text_strategy()), 1..4)
            .prop_map(HistoryOp::BatchUpdate),
        2 => any::<usize>().prop_map(HistoryOp::Delete),
        1 => prop::collection::vec(any::<usize>(), 1..4).prop_map(HistoryOp::BatchDelete),
    ]
}

/// Strategy for a history of up to `max_len` operations.
pub fn history_strategy(max_len: usize) -> impl Strategy<Value = Vec<HistoryOp>> {
    prop::collection::vec(history_op_strategy(), 1..=max_len.max(1))
}

/// Reference model of the positional view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotModel {
    /// Every id ever inserted, in position order.
    pub ids: Vec<ItemId>,
    /// Slot contents; `None` once deleted.
    pub slots: Vec<Option<String>>,
}

impl SlotModel {
    /// Texts of the live slots in position order.
    pub fn live(&self) -> Vec<String> {
        self.slots.iter().flatten().cloned().collect()
    }

    fn target(&self, index: usize) -> Option<(usize, ItemId)> {
        if self.ids.is_empty() {
            return None;
        }
        let position = index % self.ids.len();
        Some((position, self.ids[position]))
    }

    fn insert(&mut self, item_id: ItemId, text: String) {
        self.ids.push(item_id);
        self.slots.push(Some(text));
    }

    fn update(&mut self, position: usize, text: String) {
        // updates of deleted items are skipped on replay
        if let Some(slot @ Some(_)) = self.slots.get_mut(position) {
            *slot = Some(text);
        }
    }

    fn delete(&mut self, position: usize) {
        if let Some(slot) = self.slots.get_mut(position) {
            *slot = None;
        }
    }
}

/// Submits `ops` through `db` and returns the expected view after a sync.
///
/// Operations with targets but no inserted ids yet are skipped.
pub async fn apply_history<T: Transport>(
    db: &EncryptedDb<T>,
    ops: &[HistoryOp],
) -> ClientResult<SlotModel> {
    let mut model = SlotModel::default();

    for op in ops {
        match op {
            HistoryOp::Insert(text) => {
                let id = db.insert(&text_record(text)).await?;
                model.insert(id, text.clone());
            }
            HistoryOp::BatchInsert(texts) => {
                let records: Vec<Record> = texts.iter().map(|t| text_record(t)).collect();
                let ids = db.batch_insert(&records).await?;
                for (id, text) in ids.into_iter().zip(texts) {
                    model.insert(id, text.clone());
                }
            }
            HistoryOp::Update(target, text) => {
                if let Some((position, id)) = model.target(*target) {
                    db.update(id, &text_record(text)).await?;
                    model.update(position, text.clone());
                }
            }
            HistoryOp::BatchUpdate(pairs) => {
                let targets: Vec<_> = pairs
                    .iter()
                    .filter_map(|(target, text)| model.target(*target).map(|t| (t, text)))
                    .collect();
                if targets.is_empty() {
                    continue;
                }
                let ids: Vec<ItemId> = targets.iter().map(|((_, id), _)| *id).collect();
                let records: Vec<Record> = targets.iter().map(|(_, text)| text_record(text)).collect();
                db.batch_update(&ids, &records).await?;
                for ((position, _), text) in targets {
                    model.update(position, text.clone());
                }
            }
            HistoryOp::Delete(target) => {
                if let Some((position, id)) = model.target(*target) {
                    db.delete(id).await?;
                    model.delete(position);
                }
            }
            HistoryOp::BatchDelete(targets) => {
                let targets: Vec<_> = targets.iter().filter_map(|t| model.target(*t)).collect();
                if targets.is_empty() {
                    continue;
                }
                let ids: Vec<ItemId> = targets.iter().map(|(_, id)| *id).collect();
                db.batch_delete(&ids).await?;
                for (position, _) in targets {
                    model.delete(position);
                }
            }
        }
    }

    Ok(model)
}

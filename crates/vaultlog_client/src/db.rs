//! The caller-facing database handle.

use crate::compaction::{CompactionHandle, CompactionStats, Compactor, NoopCompactor};
use crate::config::ClientConfig;
use crate::error::ClientResult;
use crate::mutation::MutationFacade;
use crate::session::SessionContext;
use crate::sync::{SyncCoordinator, SyncReport};
use crate::transport::Transport;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use vaultlog_core::{ItemsView, Position, Record, StateStore};
use vaultlog_protocol::{ItemId, SequenceNo};

/// Statistics about a client's activity.
#[derive(Debug, Clone, Default)]
pub struct ClientStats {
    /// Syncs that completed.
    pub syncs_completed: u64,
    /// Syncs that failed.
    pub syncs_failed: u64,
    /// Log entries applied across all syncs.
    pub entries_applied: u64,
    /// Mutations accepted by the server.
    pub mutations_submitted: u64,
    /// Mutations that failed.
    pub mutations_failed: u64,
    /// Compaction worker counters.
    pub compaction: CompactionStats,
    /// Last successful sync time.
    pub last_sync_time: Option<Instant>,
    /// Last error message.
    pub last_error: Option<String>,
}

/// An end-to-end encrypted database session.
///
/// Reads come from the local state store and never touch the network.
/// Writes go to the server and appear locally after the next [`sync`].
///
/// [`sync`]: EncryptedDb::sync
pub struct EncryptedDb<T: Transport> {
    store: Arc<StateStore>,
    sync: SyncCoordinator<T>,
    mutations: MutationFacade<T>,
    compaction: Arc<CompactionHandle>,
    stats: RwLock<ClientStats>,
}

impl<T: Transport> EncryptedDb<T> {
    /// Creates a session with a compactor that never bundles.
    ///
    /// # Panics
    ///
    /// Panics if compaction is enabled and this is called outside a tokio
    /// runtime.
    pub fn new(config: ClientConfig, session: SessionContext, transport: T) -> Self {
        Self::with_compactor(config, session, transport, Arc::new(NoopCompactor))
    }

    /// Creates a session whose mutations signal `compactor`.
    ///
    /// # Panics
    ///
    /// Panics if compaction is enabled and this is called outside a tokio
    /// runtime.
    pub fn with_compactor(
        config: ClientConfig,
        session: SessionContext,
        transport: T,
        compactor: Arc<dyn Compactor>,
    ) -> Self {
        let session = Arc::new(session);
        let transport = Arc::new(transport);
        let store = Arc::new(StateStore::new());
        let compaction = Arc::new(if config.compaction_enabled {
            CompactionHandle::start(Arc::clone(&session), compactor)
        } else {
            CompactionHandle::disabled()
        });

        Self {
            sync: SyncCoordinator::new(
                config,
                Arc::clone(&session),
                Arc::clone(&transport),
                Arc::clone(&store),
            ),
            mutations: MutationFacade::new(session, transport, Arc::clone(&compaction)),
            store,
            compaction,
            stats: RwLock::new(ClientStats::default()),
        }
    }

    /// Pulls the remote log and installs the resulting state.
    pub async fn sync(&self) -> ClientResult<SyncReport> {
        let result = self.sync.sync().await;
        let mut stats = self.stats.write();
        match &result {
            Ok(report) => {
                stats.syncs_completed += 1;
                stats.entries_applied += report.replay.entries_applied;
                stats.last_sync_time = Some(Instant::now());
            }
            Err(err) => {
                stats.syncs_failed += 1;
                stats.last_error = Some(err.to_string());
            }
        }
        result
    }

    /// Inserts a record; returns its new id.
    pub async fn insert(&self, record: &Record) -> ClientResult<ItemId> {
        let result = self.mutations.insert(record).await;
        self.record_mutation(&result);
        result
    }

    /// Inserts several records as one entry; returns their ids in order.
    pub async fn batch_insert(&self, records: &[Record]) -> ClientResult<Vec<ItemId>> {
        let result = self.mutations.batch_insert(records).await;
        self.record_mutation(&result);
        result
    }

    /// Replaces the record of an item.
    pub async fn update(&self, item_id: ItemId, record: &Record) -> ClientResult<()> {
        let result = self.mutations.update(item_id, record).await;
        self.record_mutation(&result);
        result
    }

    /// Replaces the records of several items as one entry.
    pub async fn batch_update(&self, item_ids: &[ItemId], records: &[Record]) -> ClientResult<()> {
        let result = self.mutations.batch_update(item_ids, records).await;
        self.record_mutation(&result);
        result
    }

    /// Deletes an item.
    pub async fn delete(&self, item_id: ItemId) -> ClientResult<()> {
        let result = self.mutations.delete(item_id).await;
        self.record_mutation(&result);
        result
    }

    /// Deletes several items as one entry.
    pub async fn batch_delete(&self, item_ids: &[ItemId]) -> ClientResult<()> {
        let result = self.mutations.batch_delete(item_ids).await;
        self.record_mutation(&result);
        result
    }

    /// Positional view of the local items, tombstones included.
    pub fn get_items(&self) -> ItemsView {
        self.store.get_items()
    }

    /// Copy of the live id to position map.
    pub fn get_item_id_to_position(&self) -> BTreeMap<ItemId, Position> {
        self.store.get_item_id_to_position()
    }

    /// Highest sequence number reflected locally.
    pub fn get_max_sequence_no(&self) -> SequenceNo {
        self.store.get_max_sequence_no()
    }

    /// The underlying state store.
    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    /// Gets the current stats.
    pub fn stats(&self) -> ClientStats {
        let mut stats = self.stats.read().clone();
        stats.compaction = self.compaction.stats();
        stats
    }

    /// Stops the compaction worker once pending signals are handled.
    pub async fn shutdown(&self) {
        self.compaction.shutdown().await;
    }

    /// Drops the local state, e.g. after sign-out.
    ///
    /// The next sync rebuilds it from the server.
    pub fn clear_local_state(&self) {
        self.store.reset();
    }

    fn record_mutation<R>(&self, result: &ClientResult<R>) {
        let mut stats = self.stats.write();
        match result {
            Ok(_) => stats.mutations_submitted += 1,
            Err(err) => {
                stats.mutations_failed += 1;
                stats.last_error = Some(err.to_string());
            }
        }
    }
}

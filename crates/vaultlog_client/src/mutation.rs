//! Mutation facade: encrypts records and submits them to the server.
//!
//! Mutations never touch the local state. They show up locally on the next
//! sync, once the server has sequenced them.

use crate::compaction::CompactionHandle;
use crate::error::{ClientError, ClientResult};
use crate::session::SessionContext;
use crate::transport::Transport;
use std::sync::Arc;
use tracing::debug;
use vaultlog_core::{CoreResult, EncryptionKey, Record};
use vaultlog_protocol::{
    concat_ciphertexts, BatchDeleteRequest, BatchWriteRequest, DeleteRequest, EntryItem, ItemId,
    WriteRequest,
};

/// Submits inserts, updates and deletes.
///
/// Each successful call fires the compaction signal and returns without
/// waiting for it.
pub struct MutationFacade<T: Transport> {
    session: Arc<SessionContext>,
    transport: Arc<T>,
    compaction: Arc<CompactionHandle>,
}

impl<T: Transport> MutationFacade<T> {
    /// Creates a facade.
    pub fn new(
        session: Arc<SessionContext>,
        transport: Arc<T>,
        compaction: Arc<CompactionHandle>,
    ) -> Self {
        Self {
            session,
            transport,
            compaction,
        }
    }

    /// Encrypts and submits a new record under a fresh id.
    pub async fn insert(&self, record: &Record) -> ClientResult<ItemId> {
        let key = self.session.key().await?;
        let ciphertext = record.seal(self.session.cipher(), &key)?;
        let item_id = ItemId::new();

        self.session
            .guard(self.transport.insert(WriteRequest {
                item_id,
                ciphertext,
            }))
            .await?;

        debug!(%item_id, "insert submitted");
        self.compaction.fire(Some(key));
        Ok(item_id)
    }

    /// Submits several records as one entry.
    ///
    /// The returned ids are in the order of `records`, which is also the
    /// order the items will occupy once synced.
    pub async fn batch_insert(&self, records: &[Record]) -> ClientResult<Vec<ItemId>> {
        if records.is_empty() {
            return Err(ClientError::invalid_argument("batch insert needs at least one record"));
        }
        let key = self.session.key().await?;
        let item_ids: Vec<ItemId> = records.iter().map(|_| ItemId::new()).collect();
        let request = self.batch_request(&key, &item_ids, records)?;

        self.session
            .guard(self.transport.batch_insert(request))
            .await?;

        debug!(count = item_ids.len(), "batch insert submitted");
        self.compaction.fire(Some(key));
        Ok(item_ids)
    }

    /// Replaces the record of an existing item.
    pub async fn update(&self, item_id: ItemId, record: &Record) -> ClientResult<()> {
        let key = self.session.key().await?;
        let ciphertext = record.seal(self.session.cipher(), &key)?;

        self.session
            .guard(self.transport.update(WriteRequest {
                item_id,
                ciphertext,
            }))
            .await?;

        debug!(%item_id, "update submitted");
        self.compaction.fire(Some(key));
        Ok(())
    }

    /// Replaces the records of several items as one entry.
    ///
    /// `item_ids[i]` receives `records[i]`.
    pub async fn batch_update(&self, item_ids: &[ItemId], records: &[Record]) -> ClientResult<()> {
        if records.is_empty() {
            return Err(ClientError::invalid_argument("batch update needs at least one record"));
        }
        if item_ids.len() != records.len() {
            return Err(ClientError::invalid_argument(format!(
                "{} ids for {} records",
                item_ids.len(),
                records.len()
            )));
        }
        let key = self.session.key().await?;
        let request = self.batch_request(&key, item_ids, records)?;

        self.session
            .guard(self.transport.batch_update(request))
            .await?;

        debug!(count = item_ids.len(), "batch update submitted");
        self.compaction.fire(Some(key));
        Ok(())
    }

    /// Deletes an item. Its position stays occupied by a tombstone.
    pub async fn delete(&self, item_id: ItemId) -> ClientResult<()> {
        self.session
            .guard(self.transport.delete(DeleteRequest { item_id }))
            .await?;

        debug!(%item_id, "delete submitted");
        self.compaction.fire(None);
        Ok(())
    }

    /// Deletes several items as one entry.
    pub async fn batch_delete(&self, item_ids: &[ItemId]) -> ClientResult<()> {
        if item_ids.is_empty() {
            return Err(ClientError::invalid_argument("batch delete needs at least one id"));
        }

        self.session
            .guard(self.transport.batch_delete(BatchDeleteRequest {
                item_ids: item_ids.to_vec(),
            }))
            .await?;

        debug!(count = item_ids.len(), "batch delete submitted");
        self.compaction.fire(None);
        Ok(())
    }

    fn batch_request(
        &self,
        key: &EncryptionKey,
        item_ids: &[ItemId],
        records: &[Record],
    ) -> ClientResult<BatchWriteRequest> {
        let ciphertexts = records
            .iter()
            .map(|record| record.seal(self.session.cipher(), key))
            .collect::<CoreResult<Vec<_>>>()?;
        let (buffer, byte_lengths) = concat_ciphertexts(&ciphertexts);
        let items = item_ids
            .iter()
            .zip(byte_lengths)
            .map(|(item_id, byte_length)| EntryItem::batched(*item_id, byte_length))
            .collect();
        Ok(BatchWriteRequest { items, buffer })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryTransport;
    use crate::session::{KeyProvider, MemoryKeyStore};
    use crate::transport::TransportError;
    use vaultlog_core::AesGcmCipher;
    use vaultlog_protocol::OperationKind;

    struct Fixture {
        key: EncryptionKey,
        keys: Arc<MemoryKeyStore>,
        transport: Arc<MemoryTransport>,
        facade: MutationFacade<MemoryTransport>,
    }

    fn fixture() -> Fixture {
        let key = EncryptionKey::generate();
        let keys = Arc::new(MemoryKeyStore::with_key(key.clone()));
        let session = Arc::new(SessionContext::new(keys.clone()));
        let transport = Arc::new(MemoryTransport::new());
        let facade = MutationFacade::new(
            session,
            transport.clone(),
            Arc::new(CompactionHandle::disabled()),
        );
        Fixture {
            key,
            keys,
            transport,
            facade,
        }
    }

    fn record(n: i64) -> Record {
        Record::from_serialize(&n).unwrap()
    }

    #[tokio::test]
    async fn insert_submits_ciphertext() {
        let f = fixture();
        let id = f.facade.insert(&record(1)).await.unwrap();

        let entries = f.transport.log_entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, OperationKind::Insert);
        assert_eq!(entries[0].items[0].item_id, id);

        let payload = entries[0].payload.as_deref().unwrap();
        let opened = Record::open(&AesGcmCipher::new(), &f.key, payload).unwrap();
        assert_eq!(opened, record(1));
    }

    #[tokio::test]
    async fn batch_insert_frames_each_record() {
        let f = fixture();
        let records = vec![record(1), record(2), record(3)];
        let ids = f.facade.batch_insert(&records).await.unwrap();
        assert_eq!(ids.len(), 3);

        let entries = f.transport.log_entries();
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert!(entry.is_batched());
        assert_eq!(entry.item_ids().collect::<Vec<_>>(), ids);

        let cipher = AesGcmCipher::new();
        let opened: Vec<_> = entry
            .ciphertexts()
            .unwrap()
            .into_iter()
            .map(|(_, ct)| Record::open(&cipher, &f.key, ct).unwrap())
            .collect();
        assert_eq!(opened, records);
    }

    #[tokio::test]
    async fn batch_update_pairs_ids_with_records() {
        let f = fixture();
        let ids = vec![ItemId::new(), ItemId::new()];
        f.facade
            .batch_update(&ids, &[record(10), record(20)])
            .await
            .unwrap();

        let entry = &f.transport.log_entries()[0];
        assert_eq!(entry.kind, OperationKind::Update);
        let pairs = entry.ciphertexts().unwrap();
        assert_eq!(pairs[1].0, ids[1]);
        let second = Record::open(&AesGcmCipher::new(), &f.key, pairs[1].1).unwrap();
        assert_eq!(second, record(20));
    }

    #[tokio::test]
    async fn invalid_batches_never_reach_the_server() {
        let f = fixture();
        assert!(matches!(
            f.facade.batch_insert(&[]).await,
            Err(ClientError::InvalidArgument(_))
        ));
        assert!(matches!(
            f.facade.batch_update(&[ItemId::new()], &[]).await,
            Err(ClientError::InvalidArgument(_))
        ));
        assert!(matches!(
            f.facade.batch_update(&[ItemId::new()], &[record(1), record(2)]).await,
            Err(ClientError::InvalidArgument(_))
        ));
        assert!(matches!(
            f.facade.batch_delete(&[]).await,
            Err(ClientError::InvalidArgument(_))
        ));
        assert_eq!(f.transport.call_count(), 0);
    }

    #[tokio::test]
    async fn deletes_need_no_key() {
        let f = fixture();
        f.keys.clear_authenticated_data();
        let id = ItemId::new();
        f.facade.delete(id).await.unwrap();
        f.facade.batch_delete(&[id, ItemId::new()]).await.unwrap();
        assert_eq!(f.transport.head(), 2);

        assert_eq!(
            f.facade.insert(&record(1)).await.unwrap_err(),
            ClientError::NotAuthenticated
        );
    }

    #[tokio::test]
    async fn unauthorized_mutation_purges_credentials() {
        let f = fixture();
        f.transport.fail_next(TransportError::unauthorized("expired"));

        let err = f.facade.update(ItemId::new(), &record(1)).await.unwrap_err();
        assert!(matches!(err, ClientError::AuthExpired(_)));
        assert_eq!(f.keys.purge_count(), 1);
        assert_eq!(f.transport.head(), 0);
    }

    #[tokio::test]
    async fn server_errors_pass_through() {
        let f = fixture();
        f.transport.fail_next(TransportError::status(500, "boom"));
        let err = f.facade.insert(&record(1)).await.unwrap_err();
        assert_eq!(err, ClientError::Transport(TransportError::status(500, "boom")));
        assert_eq!(f.keys.purge_count(), 0);
    }

    #[tokio::test]
    async fn successful_mutations_fire_the_signal() {
        let key = EncryptionKey::generate();
        let session = Arc::new(SessionContext::new(Arc::new(MemoryKeyStore::with_key(key))));
        let transport = Arc::new(MemoryTransport::new());
        let compaction = Arc::new(CompactionHandle::start(
            session.clone(),
            Arc::new(crate::compaction::NoopCompactor),
        ));
        let facade = MutationFacade::new(session, transport.clone(), compaction.clone());

        let id = facade.insert(&record(1)).await.unwrap();
        facade.update(id, &record(2)).await.unwrap();
        facade.delete(id).await.unwrap();
        transport.fail_next(TransportError::network("down"));
        assert!(facade.delete(id).await.is_err());

        compaction.shutdown().await;
        let stats = compaction.stats();
        assert_eq!(stats.signals, 3);
        assert_eq!(stats.skipped, 3);
    }
}

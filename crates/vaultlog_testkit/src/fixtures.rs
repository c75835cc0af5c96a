//! Session fixtures.
//!
//! Every [`TestSession`] talks to an in-process [`MemoryTransport`]. Several
//! sessions can share one transport and key to act as devices of the same
//! user.

use crate::compactor::BundlingCompactor;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use vaultlog_client::{
    ClientConfig, Compactor, EncryptedDb, ItemsView, MemoryKeyStore, MemoryTransport, NoopCompactor,
    SessionContext,
};
use vaultlog_core::{EncryptionKey, Record};

/// A client session against an in-process server.
pub struct TestSession {
    /// The session key.
    pub key: EncryptionKey,
    /// Key provider of this session.
    pub keys: Arc<MemoryKeyStore>,
    /// The shared in-process server.
    pub transport: Arc<MemoryTransport>,
    /// The client.
    pub db: EncryptedDb<Arc<MemoryTransport>>,
}

impl TestSession {
    /// Creates a session with the default configuration.
    ///
    /// Must be called inside a tokio runtime.
    pub fn new() -> Self {
        Self::with_config(ClientConfig::default())
    }

    /// Creates a session with `config` and a compactor that never bundles.
    pub fn with_config(config: ClientConfig) -> Self {
        let transport = Arc::new(MemoryTransport::new());
        Self::connect(config, transport, EncryptionKey::generate(), None)
    }

    /// Creates a session whose mutations bundle the log every `threshold`
    /// entries.
    pub fn with_bundling(threshold: usize) -> Self {
        let transport = Arc::new(MemoryTransport::new());
        Self::connect(
            ClientConfig::default(),
            transport,
            EncryptionKey::generate(),
            Some(threshold),
        )
    }

    /// Another device of the same user: same server, same key, own store.
    pub fn peer(&self) -> Self {
        Self::connect(
            ClientConfig::default(),
            Arc::clone(&self.transport),
            self.key.clone(),
            None,
        )
    }

    fn connect(
        config: ClientConfig,
        transport: Arc<MemoryTransport>,
        key: EncryptionKey,
        bundling_threshold: Option<usize>,
    ) -> Self {
        let keys = Arc::new(MemoryKeyStore::with_key(key.clone()));
        let session = SessionContext::new(keys.clone());
        let compactor: Arc<dyn Compactor> = match bundling_threshold {
            Some(threshold) => Arc::new(BundlingCompactor::new(Arc::clone(&transport), threshold)),
            None => Arc::new(NoopCompactor),
        };
        let db = EncryptedDb::with_compactor(config, session, Arc::clone(&transport), compactor);
        Self {
            key,
            keys,
            transport,
            db,
        }
    }
}

impl Default for TestSession {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestSession {
    type Target = EncryptedDb<Arc<MemoryTransport>>;

    fn deref(&self) -> &Self::Target {
        &self.db
    }
}

/// Builds a record from any serializable value.
pub fn record<T: Serialize + ?Sized>(value: &T) -> Record {
    Record::from_serialize(value).expect("value serializes to CBOR")
}

/// Builds a text record.
pub fn text_record(text: &str) -> Record {
    record(text)
}

/// Builds one text record per element.
pub fn text_records(texts: &[&str]) -> Vec<Record> {
    texts.iter().map(|text| text_record(text)).collect()
}

/// Decodes a record, panicking on mismatch.
pub fn decode<T: DeserializeOwned>(record: &Record) -> T {
    record.deserialize().expect("record decodes")
}

/// Texts of the live items in position order.
pub fn live_texts(view: &ItemsView) -> Vec<String> {
    view.live().map(|item| decode(&item.record)).collect()
}

/// Texts of all slots in position order; tombstones are `None`.
pub fn raw_texts(view: &ItemsView) -> Vec<Option<String>> {
    view.raw()
        .iter()
        .map(|slot| slot.as_ref().map(|item| decode(&item.record)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn peers_share_the_server() {
        let alice = TestSession::new();
        let phone = alice.peer();

        alice.insert(&text_record("milk")).await.unwrap();
        phone.sync().await.unwrap();

        assert_eq!(live_texts(&phone.get_items()), vec!["milk"]);
        assert!(alice.get_items().is_empty());
    }

    #[test]
    fn record_helpers() {
        let records = text_records(&["a", "b"]);
        assert_eq!(records.len(), 2);
        assert_eq!(decode::<String>(&records[1]), "b");
    }
}

//! Query responses and mutation requests exchanged with the log server.

use crate::entry::{EntryItem, TransactionLogEntry};
use crate::error::ProtocolResult;
use crate::ids::{ItemId, SequenceNo};
use crate::{from_cbor, to_cbor};
use serde::{Deserialize, Serialize};

macro_rules! cbor_message {
    ($ty:ty) => {
        impl $ty {
            /// Encodes to CBOR.
            pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
                to_cbor(self)
            }

            /// Decodes from CBOR.
            pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
                from_cbor(bytes)
            }
        }
    };
}

/// Answer to a transaction log query.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TransactionLogResponse {
    /// Log entries in ascending sequence order.
    pub entries: Vec<TransactionLogEntry>,
    /// Set when the server truncated the log behind a bundle; the entries
    /// then start strictly after this sequence number.
    pub bundle_seq_no: Option<SequenceNo>,
}

impl TransactionLogResponse {
    /// Creates a response for an untruncated log.
    pub fn new(entries: Vec<TransactionLogEntry>) -> Self {
        Self {
            entries,
            bundle_seq_no: None,
        }
    }

    /// Creates a response whose entries follow a bundle.
    pub fn with_bundle(entries: Vec<TransactionLogEntry>, bundle_seq_no: SequenceNo) -> Self {
        Self {
            entries,
            bundle_seq_no: Some(bundle_seq_no),
        }
    }
}

cbor_message!(TransactionLogResponse);

/// An encrypted database state bundle as stored by the server.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncryptedSnapshot(Vec<u8>);

impl EncryptedSnapshot {
    /// Wraps sealed snapshot bytes.
    pub fn new(ciphertext: Vec<u8>) -> Self {
        Self(ciphertext)
    }

    /// Returns the sealed bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consumes the wrapper.
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// Size of the sealed snapshot in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the snapshot is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for EncryptedSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedSnapshot")
            .field("len", &self.0.len())
            .finish()
    }
}

cbor_message!(EncryptedSnapshot);

/// Insert or update of a single item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteRequest {
    /// Target item.
    pub item_id: ItemId,
    /// Encrypted record.
    pub ciphertext: Vec<u8>,
}

cbor_message!(WriteRequest);

/// Deletion of a single item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteRequest {
    /// Target item.
    pub item_id: ItemId,
}

cbor_message!(DeleteRequest);

/// Batched insert or update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchWriteRequest {
    /// Items in submission order, each with its ciphertext length.
    pub items: Vec<EntryItem>,
    /// Concatenated ciphertexts.
    pub buffer: Vec<u8>,
}

cbor_message!(BatchWriteRequest);

/// Batched deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchDeleteRequest {
    /// Items to tombstone.
    pub item_ids: Vec<ItemId>,
}

cbor_message!(BatchDeleteRequest);

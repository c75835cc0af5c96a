//! # VaultLog Protocol
//!
//! Wire types and CBOR codecs for the VaultLog transaction log.
//!
//! This crate provides:
//! - `ItemId` and `SequenceNo` identifiers
//! - `TransactionLogEntry` with batch framing (concatenated ciphertexts
//!   plus per-item byte lengths)
//! - Query responses (`TransactionLogResponse`, `EncryptedSnapshot`)
//! - Mutation request messages
//!
//! Every payload carried by these types is ciphertext. This is a pure
//! protocol crate with no I/O operations and no cryptography.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod entry;
mod error;
mod ids;
mod messages;

pub use entry::{concat_ciphertexts, EntryItem, OperationKind, TransactionLogEntry};
pub use error::{ProtocolError, ProtocolResult};
pub use ids::{ItemId, SequenceNo};
pub use messages::{
    BatchDeleteRequest, BatchWriteRequest, DeleteRequest, EncryptedSnapshot,
    TransactionLogResponse, WriteRequest,
};

/// Encodes a serializable value as CBOR.
pub fn to_cbor<T: serde::Serialize>(value: &T) -> ProtocolResult<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| ProtocolError::codec(e.to_string()))?;
    Ok(buf)
}

/// Decodes a CBOR-encoded value.
pub fn from_cbor<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> ProtocolResult<T> {
    ciborium::from_reader(bytes).map_err(|e| ProtocolError::codec(e.to_string()))
}

//! Application records.

use crate::crypto::{Cipher, EncryptionKey};
use crate::error::{CoreError, CoreResult};
use ciborium::Value;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// An application payload stored in an item.
///
/// Records are schemaless CBOR values. Any `serde` type can be converted
/// into a record and back. The plaintext handed to the cipher is the CBOR
/// encoding of the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Value);

impl Record {
    /// Wraps a CBOR value.
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Converts any serializable value into a record.
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> CoreResult<Self> {
        Value::serialized(value)
            .map(Self)
            .map_err(|e| CoreError::codec(e.to_string()))
    }

    /// Converts the record into a typed value.
    pub fn deserialize<T: DeserializeOwned>(&self) -> CoreResult<T> {
        self.0
            .deserialized()
            .map_err(|e| CoreError::codec(e.to_string()))
    }

    /// Returns the underlying CBOR value.
    pub fn value(&self) -> &Value {
        &self.0
    }

    /// Consumes the record.
    pub fn into_value(self) -> Value {
        self.0
    }

    /// Encodes the record as CBOR bytes.
    pub fn to_bytes(&self) -> CoreResult<Vec<u8>> {
        vaultlog_protocol::to_cbor(&self.0).map_err(|e| CoreError::codec(e.to_string()))
    }

    /// Decodes a record from CBOR bytes.
    pub fn from_bytes(bytes: &[u8]) -> CoreResult<Self> {
        vaultlog_protocol::from_cbor(bytes)
            .map(Self)
            .map_err(|e| CoreError::codec(e.to_string()))
    }

    /// Encodes and encrypts the record.
    pub fn seal<C: Cipher + ?Sized>(&self, cipher: &C, key: &EncryptionKey) -> CoreResult<Vec<u8>> {
        cipher.encrypt(key, &self.to_bytes()?)
    }

    /// Decrypts and decodes a sealed record.
    pub fn open<C: Cipher + ?Sized>(
        cipher: &C,
        key: &EncryptionKey,
        ciphertext: &[u8],
    ) -> CoreResult<Self> {
        Self::from_bytes(&cipher.decrypt(key, ciphertext)?)
    }
}

impl From<Value> for Record {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

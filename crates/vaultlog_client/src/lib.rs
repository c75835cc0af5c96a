//! # VaultLog Client
//!
//! Session layer of an end-to-end encrypted database whose server only ever
//! sees ciphertext.
//!
//! This crate provides:
//! - [`SyncCoordinator`]: pulls the transaction log, optionally rebuilding
//!   from an encrypted bundle, and installs the replayed state
//! - [`MutationFacade`]: encrypts records and submits single and batched
//!   inserts, updates and deletes
//! - [`CompactionHandle`]: fire-and-forget signal to a background
//!   [`Compactor`]
//! - [`EncryptedDb`]: the handle tying the above to one [`StateStore`]
//!
//! ## Transports
//!
//! The network sits behind the [`Transport`] trait. [`HttpTransport`] talks
//! CBOR over any [`HttpClient`]; [`MemoryTransport`] keeps the log in
//! process and is what the tests run against.
//!
//! ## Authentication
//!
//! Every network call goes through [`SessionContext::guard`]. An
//! unauthorized response purges the local credentials and is then returned
//! as [`ClientError::AuthExpired`]. Nothing is retried.
//!
//! [`StateStore`]: vaultlog_core::StateStore

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod compaction;
mod config;
mod db;
mod error;
mod http;
mod memory;
mod mutation;
mod session;
mod sync;
mod transport;

pub use compaction::{
    CompactionHandle, CompactionOutcome, CompactionStats, Compactor, NoopCompactor,
};
pub use config::ClientConfig;
pub use db::{ClientStats, EncryptedDb};
pub use error::{BackgroundSignalError, ClientError, ClientResult};
pub use http::{HttpClient, HttpRequest, HttpResponse, HttpTransport, LoopbackClient, Method};
pub use memory::MemoryTransport;
pub use mutation::MutationFacade;
pub use session::{KeyProvider, MemoryKeyStore, SessionContext};
pub use sync::{SyncCoordinator, SyncReport};
pub use transport::{Transport, TransportError, TransportResult};

// Re-export commonly used types from the lower crates
pub use vaultlog_core::{
    AesGcmCipher, Cipher, DbState, EncryptionKey, Item, ItemsView, Position, Record, StateStore,
};
pub use vaultlog_protocol::{ItemId, SequenceNo};

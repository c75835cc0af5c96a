//! # VaultLog Core
//!
//! Deterministic reconstruction of an encrypted, append-only transaction log.
//!
//! This crate provides:
//! - AES-256-GCM sealing of records and snapshots behind the [`Cipher`] seam
//! - [`ItemSlots`], a positional container that keeps tombstones in place
//! - [`DbState`], the snapshot ("bundle") representation
//! - [`ReplayEngine`], which folds a contiguous log into a base state
//! - [`StateStore`], the live state with atomic whole-state replacement
//!
//! ## Key Invariants
//!
//! - A position is assigned once, at first insertion, and never reused
//! - Deleted slots stay in place as tombstones
//! - The id map only holds live items
//! - A replay either succeeds completely or leaves nothing behind

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crypto;
mod error;
mod item;
mod record;
mod replay;
mod state;
mod store;

pub use crypto::{AesGcmCipher, Cipher, EncryptionKey};
pub use error::{CoreError, CoreResult};
pub use item::{Item, ItemSlots, LiveItems, Position};
pub use record::Record;
pub use replay::{ReplayEngine, ReplayOutcome, ReplayStats};
pub use state::DbState;
pub use store::{ItemsView, StateStore};

pub use vaultlog_protocol::{ItemId, SequenceNo};

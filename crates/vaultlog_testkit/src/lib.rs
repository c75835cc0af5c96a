//! # VaultLog Testkit
//!
//! Test utilities for VaultLog.
//!
//! This crate provides:
//! - Session fixtures wired to an in-process server
//! - A compactor that bundles the in-process log past a threshold
//! - Property-based history generators with a reference model
//! - Log output for tests
//!
//! ## Usage
//!
//! ```rust,ignore
//! use vaultlog_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn insert_then_sync() {
//!     let session = TestSession::new();
//!     session.insert(&text_record("milk")).await.unwrap();
//!     session.sync().await.unwrap();
//!     assert_eq!(live_texts(&session.get_items()), vec!["milk"]);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod compactor;
pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::compactor::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::init_tracing;
}

pub use compactor::*;
pub use fixtures::*;
pub use generators::*;

use tracing_subscriber::EnvFilter;

/// Sends log output to the test harness.
///
/// Honours `RUST_LOG` and defaults to warnings. Safe to call from every
/// test; only the first call installs the subscriber.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

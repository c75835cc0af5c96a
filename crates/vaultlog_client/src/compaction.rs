//! Background compaction trigger.
//!
//! Every successful mutation sends a signal; a single worker task drains the
//! signals in order and asks a [`Compactor`] whether to bundle the log.
//! Callers never wait on compaction and never see its failures, which are
//! only logged.

use crate::error::BackgroundSignalError;
use crate::session::SessionContext;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use vaultlog_core::EncryptionKey;
use vaultlog_protocol::SequenceNo;

/// What a compactor did with a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactionOutcome {
    /// Nothing worth bundling yet.
    Skipped,
    /// A bundle was produced at this sequence number.
    Compacted {
        /// Sequence number the bundle reflects.
        bundle_seq_no: SequenceNo,
    },
}

/// Decides when to bundle the log and does it.
#[async_trait]
pub trait Compactor: Send + Sync + 'static {
    /// Called once per signal with the session key.
    async fn compact_if_needed(
        &self,
        key: &EncryptionKey,
    ) -> Result<CompactionOutcome, BackgroundSignalError>;
}

/// Compactor that never bundles.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCompactor;

#[async_trait]
impl Compactor for NoopCompactor {
    async fn compact_if_needed(
        &self,
        _key: &EncryptionKey,
    ) -> Result<CompactionOutcome, BackgroundSignalError> {
        Ok(CompactionOutcome::Skipped)
    }
}

/// Counters for the compaction worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompactionStats {
    /// Signals accepted.
    pub signals: u64,
    /// Signals that produced a bundle.
    pub compacted: u64,
    /// Signals the compactor declined.
    pub skipped: u64,
    /// Signals that failed.
    pub failed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    signals: AtomicU64,
    compacted: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
}

enum CompactionCommand {
    Signal(Option<EncryptionKey>),
    Shutdown,
}

/// Handle to the compaction worker.
///
/// A disabled handle drops every signal.
pub struct CompactionHandle {
    tx: Option<UnboundedSender<CompactionCommand>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    counters: Arc<Counters>,
}

impl CompactionHandle {
    /// Spawns the worker on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn start(session: Arc<SessionContext>, compactor: Arc<dyn Compactor>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let counters = Arc::new(Counters::default());
        let worker = tokio::spawn(run_compaction_loop(
            session,
            compactor,
            rx,
            Arc::clone(&counters),
        ));
        Self {
            tx: Some(tx),
            worker: Mutex::new(Some(worker)),
            counters,
        }
    }

    /// A handle with no worker behind it.
    pub fn disabled() -> Self {
        Self {
            tx: None,
            worker: Mutex::new(None),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Returns true if signals reach a worker.
    pub fn is_enabled(&self) -> bool {
        self.tx.is_some()
    }

    /// Signals the worker without waiting.
    ///
    /// Pass the key when the caller already holds it; otherwise the worker
    /// resolves it from the session.
    pub fn fire(&self, key: Option<EncryptionKey>) {
        let Some(tx) = &self.tx else {
            debug!("compaction disabled, dropping signal");
            return;
        };
        if tx.send(CompactionCommand::Signal(key)).is_err() {
            warn!("compaction worker has stopped, dropping signal");
            return;
        }
        self.counters.signals.fetch_add(1, Ordering::Relaxed);
    }

    /// Current counters.
    pub fn stats(&self) -> CompactionStats {
        CompactionStats {
            signals: self.counters.signals.load(Ordering::Relaxed),
            compacted: self.counters.compacted.load(Ordering::Relaxed),
            skipped: self.counters.skipped.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }

    /// Stops the worker after it has drained the signals already sent.
    pub async fn shutdown(&self) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(CompactionCommand::Shutdown);
        }
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            if let Err(err) = worker.await {
                warn!(error = %err, "compaction worker ended abnormally");
            }
        }
    }
}

impl std::fmt::Debug for CompactionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompactionHandle")
            .field("enabled", &self.is_enabled())
            .field("stats", &self.stats())
            .finish()
    }
}

async fn run_compaction_loop(
    session: Arc<SessionContext>,
    compactor: Arc<dyn Compactor>,
    mut rx: UnboundedReceiver<CompactionCommand>,
    counters: Arc<Counters>,
) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            CompactionCommand::Signal(key) => {
                match run_job(&session, &compactor, key).await {
                    Ok(CompactionOutcome::Compacted { bundle_seq_no }) => {
                        counters.compacted.fetch_add(1, Ordering::Relaxed);
                        debug!(bundle_seq_no, "log compacted");
                    }
                    Ok(CompactionOutcome::Skipped) => {
                        counters.skipped.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(err) => {
                        counters.failed.fetch_add(1, Ordering::Relaxed);
                        warn!(error = %err, "background compaction failed");
                    }
                }
            }
            CompactionCommand::Shutdown => break,
        }
    }
    debug!("compaction worker stopped");
}

async fn run_job(
    session: &SessionContext,
    compactor: &Arc<dyn Compactor>,
    key: Option<EncryptionKey>,
) -> Result<CompactionOutcome, BackgroundSignalError> {
    let key = match key {
        Some(key) => key,
        None => session
            .key()
            .await
            .map_err(|e| BackgroundSignalError::KeyUnavailable(e.to_string()))?,
    };

    // A panic fails this job only; the worker keeps draining.
    let compactor = Arc::clone(compactor);
    let job = tokio::spawn(async move { compactor.compact_if_needed(&key).await });
    job.await
        .map_err(|e| BackgroundSignalError::Aborted(e.to_string()))?
}

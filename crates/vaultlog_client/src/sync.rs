//! Sync coordinator: pulls the remote log and installs the replayed state.

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::session::SessionContext;
use crate::transport::Transport;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use vaultlog_core::{DbState, ReplayEngine, ReplayStats, StateStore};
use vaultlog_protocol::SequenceNo;

/// Result of one sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// First sequence number requested from the server.
    pub starting_seq_no: SequenceNo,
    /// Bundle the state was rebuilt from, if the server sent one.
    pub bundle_seq_no: Option<SequenceNo>,
    /// Sequence number of the replayed state.
    pub max_sequence_no: SequenceNo,
    /// What the replay did.
    pub replay: ReplayStats,
    /// Whether the replayed state was installed.
    ///
    /// Only false when stale installs are rejected and a newer state got
    /// installed concurrently.
    pub installed: bool,
    /// Duration of the whole sync.
    pub duration: Duration,
}

/// Brings a [`StateStore`] up to date with the server.
///
/// # Flow
///
/// 1. Request the log from `current max_sequence_no + 1`
/// 2. If the server answers with a bundle reference, fetch and open the
///    bundle and use it as the replay base instead of the local state
/// 3. Replay the entries on a scratch copy of the base
/// 4. Install the result as a whole
///
/// Any failure before step 4 leaves the store untouched. Unauthorized
/// responses purge the session credentials before the error is returned.
/// Concurrent syncs are allowed; each installs its own result.
pub struct SyncCoordinator<T: Transport> {
    config: ClientConfig,
    session: Arc<SessionContext>,
    transport: Arc<T>,
    store: Arc<StateStore>,
}

impl<T: Transport> SyncCoordinator<T> {
    /// Creates a coordinator.
    pub fn new(
        config: ClientConfig,
        session: Arc<SessionContext>,
        transport: Arc<T>,
        store: Arc<StateStore>,
    ) -> Self {
        Self {
            config,
            session,
            transport,
            store,
        }
    }

    /// Runs one sync.
    ///
    /// # Errors
    ///
    /// - [`ClientError::AuthExpired`] if the server rejected the session
    /// - [`ClientError::NotAuthenticated`] if no key is available
    /// - [`ClientError::Transport`] for any other network failure
    /// - [`ClientError::Decryption`] if an entry or the bundle fails
    ///   authentication
    /// - [`ClientError::SequenceGap`] if the log is not contiguous
    /// - [`ClientError::Protocol`] if the bundle does not match its reference
    pub async fn sync(&self) -> ClientResult<SyncReport> {
        let start = Instant::now();
        let local = self.store.snapshot();
        let starting_seq_no = local.max_sequence_no() + 1;

        let phase = Instant::now();
        let response = self
            .session
            .guard(self.transport.query_transaction_log(starting_seq_no))
            .await?;
        self.log_phase("retrieve transaction log", phase, response.entries.len());

        let bundle = match response.bundle_seq_no {
            Some(bundle_seq_no) => {
                let phase = Instant::now();
                let encrypted = self
                    .session
                    .guard(self.transport.query_encrypted_db_state(bundle_seq_no))
                    .await?;
                self.log_phase("retrieve bundle", phase, encrypted.len());
                Some((bundle_seq_no, encrypted))
            }
            None => None,
        };

        let key = self.session.key().await?;

        let base = match &bundle {
            Some((bundle_seq_no, encrypted)) => {
                let phase = Instant::now();
                let state = DbState::open(self.session.cipher(), &key, encrypted)?;
                if state.max_sequence_no() != *bundle_seq_no {
                    return Err(ClientError::protocol(format!(
                        "bundle referenced as {bundle_seq_no} reflects sequence {}",
                        state.max_sequence_no()
                    )));
                }
                self.log_phase("open bundle", phase, state.items().len());
                Arc::new(state)
            }
            None => local,
        };

        let phase = Instant::now();
        let outcome = ReplayEngine::new(self.session.cipher(), &key).apply(&base, &response.entries)?;
        self.log_phase("replay", phase, response.entries.len());

        let max_sequence_no = outcome.state.max_sequence_no();
        let installed = if self.config.reject_stale_installs {
            self.store.install_if_newer(outcome.state)
        } else {
            self.store.install(outcome.state);
            true
        };

        if !installed {
            warn!(
                max_sequence_no,
                current = self.store.get_max_sequence_no(),
                "discarding replayed state older than the installed one"
            );
        }

        let report = SyncReport {
            starting_seq_no,
            bundle_seq_no: bundle.map(|(seq, _)| seq),
            max_sequence_no,
            replay: outcome.stats,
            installed,
            duration: start.elapsed(),
        };

        info!(
            starting_seq_no,
            max_sequence_no,
            entries = report.replay.entries_applied,
            skipped = report.replay.items_skipped,
            bundle = ?report.bundle_seq_no,
            elapsed_ms = report.duration.as_millis() as u64,
            "sync complete"
        );

        Ok(report)
    }

    fn log_phase(&self, phase: &str, started: Instant, count: usize) {
        if self.config.log_phase_timings {
            debug!(
                phase,
                count,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "sync phase finished"
            );
        }
    }
}

//! In-process transport backed by an in-memory transaction log.
//!
//! [`MemoryTransport`] plays the server's part: it assigns sequence
//! numbers, keeps the log, serves bundles and truncates the log behind
//! them. It can also be told to fail calls, which is how tests exercise
//! the auth guard and abort paths.

use crate::transport::{Transport, TransportError, TransportResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use vaultlog_protocol::{
    BatchDeleteRequest, BatchWriteRequest, DeleteRequest, EncryptedSnapshot, SequenceNo,
    TransactionLogEntry, TransactionLogResponse, WriteRequest,
};

#[derive(Debug, Default)]
struct ServerLog {
    /// Entries after the bundle, in sequence order.
    entries: Vec<TransactionLogEntry>,
    /// Last assigned sequence number.
    head: SequenceNo,
    bundle: Option<(SequenceNo, EncryptedSnapshot)>,
    faults: VecDeque<TransportError>,
    auth_expired: bool,
    calls: u64,
    mutations: u64,
}

/// A transport that is its own server.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    inner: Mutex<ServerLog>,
}

impl MemoryTransport {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest assigned sequence number.
    pub fn head(&self) -> SequenceNo {
        self.inner.lock().head
    }

    /// Number of entries not yet covered by a bundle.
    pub fn log_len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Copy of the entries not yet covered by a bundle.
    pub fn log_entries(&self) -> Vec<TransactionLogEntry> {
        self.inner.lock().entries.clone()
    }

    /// The current bundle, if any.
    pub fn bundle(&self) -> Option<(SequenceNo, EncryptedSnapshot)> {
        self.inner.lock().bundle.clone()
    }

    /// Sequence number of the current bundle, if any.
    pub fn bundle_seq_no(&self) -> Option<SequenceNo> {
        self.inner.lock().bundle.as_ref().map(|(seq, _)| *seq)
    }

    /// Installs a bundle materialised at `bundle_seq_no` and drops the
    /// entries it covers.
    ///
    /// Fails if the bundle is ahead of the log or behind the current one.
    pub fn install_bundle(
        &self,
        bundle_seq_no: SequenceNo,
        snapshot: EncryptedSnapshot,
    ) -> TransportResult<()> {
        let mut log = self.inner.lock();
        if bundle_seq_no > log.head {
            return Err(TransportError::status(
                409,
                format!("bundle at {bundle_seq_no} is ahead of log head {}", log.head),
            ));
        }
        if let Some((current, _)) = &log.bundle {
            if bundle_seq_no < *current {
                return Err(TransportError::status(
                    409,
                    format!("bundle at {bundle_seq_no} is behind bundle at {current}"),
                ));
            }
        }
        log.entries.retain(|entry| entry.sequence_no > bundle_seq_no);
        log.bundle = Some((bundle_seq_no, snapshot));
        Ok(())
    }

    /// Makes the next call fail with `err`. Queued faults fire in order.
    pub fn fail_next(&self, err: TransportError) {
        self.inner.lock().faults.push_back(err);
    }

    /// Rejects every call as unauthorized until [`restore_auth`] is called.
    ///
    /// [`restore_auth`]: MemoryTransport::restore_auth
    pub fn expire_auth(&self) {
        self.inner.lock().auth_expired = true;
    }

    /// Accepts calls again after [`expire_auth`](MemoryTransport::expire_auth).
    pub fn restore_auth(&self) {
        self.inner.lock().auth_expired = false;
    }

    /// Flips a payload byte of the entry at `sequence_no`.
    ///
    /// Returns false if there is no such entry or it carries no payload.
    pub fn corrupt_entry(&self, sequence_no: SequenceNo) -> bool {
        let mut log = self.inner.lock();
        let payload = log
            .entries
            .iter_mut()
            .find(|entry| entry.sequence_no == sequence_no)
            .and_then(|entry| entry.payload.as_mut());
        match payload.and_then(|bytes| bytes.last_mut()) {
            Some(byte) => {
                *byte ^= 0xff;
                true
            }
            None => false,
        }
    }

    /// Burns a sequence number without writing an entry, leaving a hole.
    pub fn skip_sequence_no(&self) -> SequenceNo {
        let mut log = self.inner.lock();
        log.head += 1;
        log.head
    }

    /// Appends a prebuilt entry under the next sequence number.
    pub fn append_raw(&self, build: impl FnOnce(SequenceNo) -> TransactionLogEntry) -> SequenceNo {
        let mut log = self.inner.lock();
        let seq = log.head + 1;
        log.head = seq;
        log.entries.push(build(seq));
        seq
    }

    /// Number of calls received, failed ones included.
    pub fn call_count(&self) -> u64 {
        self.inner.lock().calls
    }

    /// Number of mutations accepted.
    pub fn mutation_count(&self) -> u64 {
        self.inner.lock().mutations
    }

    fn admit(log: &mut ServerLog) -> TransportResult<()> {
        log.calls += 1;
        if let Some(err) = log.faults.pop_front() {
            return Err(err);
        }
        if log.auth_expired {
            return Err(TransportError::unauthorized("session expired"));
        }
        Ok(())
    }

    fn append(
        &self,
        build: impl FnOnce(SequenceNo) -> TransactionLogEntry,
    ) -> TransportResult<()> {
        let mut log = self.inner.lock();
        Self::admit(&mut log)?;
        let entry = build(log.head + 1);
        entry
            .validate()
            .map_err(|e| TransportError::status(400, e.to_string()))?;
        log.head = entry.sequence_no;
        log.mutations += 1;
        log.entries.push(entry);
        Ok(())
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn query_transaction_log(
        &self,
        starting_seq_no: SequenceNo,
    ) -> TransportResult<TransactionLogResponse> {
        let mut log = self.inner.lock();
        Self::admit(&mut log)?;

        // A caller that starts inside the bundled range has to rebuild from
        // the bundle; the retained entries all come after it.
        if let Some((bundle_seq_no, _)) = &log.bundle {
            if starting_seq_no <= *bundle_seq_no {
                return Ok(TransactionLogResponse::with_bundle(
                    log.entries.clone(),
                    *bundle_seq_no,
                ));
            }
        }

        let entries = log
            .entries
            .iter()
            .filter(|entry| entry.sequence_no >= starting_seq_no)
            .cloned()
            .collect();
        Ok(TransactionLogResponse::new(entries))
    }

    async fn query_encrypted_db_state(
        &self,
        bundle_seq_no: SequenceNo,
    ) -> TransportResult<EncryptedSnapshot> {
        let mut log = self.inner.lock();
        Self::admit(&mut log)?;
        match &log.bundle {
            Some((seq, snapshot)) if *seq == bundle_seq_no => Ok(snapshot.clone()),
            _ => Err(TransportError::status(
                404,
                format!("no bundle at {bundle_seq_no}"),
            )),
        }
    }

    async fn insert(&self, request: WriteRequest) -> TransportResult<()> {
        self.append(|seq| TransactionLogEntry::insert(seq, request.item_id, request.ciphertext))
    }

    async fn update(&self, request: WriteRequest) -> TransportResult<()> {
        self.append(|seq| TransactionLogEntry::update(seq, request.item_id, request.ciphertext))
    }

    async fn delete(&self, request: DeleteRequest) -> TransportResult<()> {
        self.append(|seq| TransactionLogEntry::delete(seq, request.item_id))
    }

    async fn batch_insert(&self, request: BatchWriteRequest) -> TransportResult<()> {
        self.append(|seq| TransactionLogEntry::batch_insert(seq, request.items, request.buffer))
    }

    async fn batch_update(&self, request: BatchWriteRequest) -> TransportResult<()> {
        self.append(|seq| TransactionLogEntry::batch_update(seq, request.items, request.buffer))
    }

    async fn batch_delete(&self, request: BatchDeleteRequest) -> TransportResult<()> {
        self.append(|seq| TransactionLogEntry::batch_delete(seq, &request.item_ids))
    }
}

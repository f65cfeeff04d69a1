//! Transaction context.
//!
//! A context is created by [`crate::TransactionManager::begin`], mutated
//! only through the manager by its owning worker, and consumed by
//! `try_commit`, which publishes the terminal outcome through its return
//! value. Nothing else ever observes a context: buffered writes are
//! invisible to every other transaction until commit installs them as
//! versions.

use std::collections::BTreeMap;
use std::sync::Arc;

use smallvec::SmallVec;

use snapsafe_types::{ItemId, Snapshot, Timestamp, TxnId, TxnStatus};

use crate::oracle::ActiveTxnTable;

/// Handle to a version observed by a read: enough to relocate the version
/// record at commit time. GC cannot invalidate a live reader's handle (the
/// safe point is bounded by the reader's own start timestamp).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadHandle {
    pub key: ItemId,
    pub commit_ts: Timestamp,
}

/// Removes the owning transaction's start timestamp from the active table
/// when the context reaches the end of its life, whatever path it takes
/// (commit, abort, or a dropped handle).
#[derive(Debug)]
struct ActiveRegistration {
    table: Arc<ActiveTxnTable>,
    start_ts: Timestamp,
}

impl Drop for ActiveRegistration {
    fn drop(&mut self) {
        self.table.deregister(self.start_ts);
    }
}

/// Per-transaction state: identity, snapshot, buffered writes, and (under
/// SSN) the read set and running exclusion-window stamps.
#[derive(Debug)]
pub struct Transaction {
    txn_id: TxnId,
    start_ts: Timestamp,
    snapshot: Snapshot,
    status: TxnStatus,
    /// Buffered writes, key -> value. Overwrites replace prior entries;
    /// installed as versions only at commit.
    local_writes: BTreeMap<ItemId, i64>,
    /// SSN only: versions observed by reads, deduplicated.
    read_set: SmallVec<[ReadHandle; 8]>,
    /// Running predecessor high-water mark (SSN). Starts at zero.
    pstamp: Timestamp,
    /// Running successor low-water mark (SSN). Starts at `+inf`.
    sstamp: Timestamp,
    /// Commit timestamp, assigned at commit entry; `None` until then.
    cstamp: Option<Timestamp>,
    _registration: ActiveRegistration,
}

impl Transaction {
    pub(crate) fn begin(
        txn_id: TxnId,
        start_ts: Timestamp,
        table: Arc<ActiveTxnTable>,
    ) -> Self {
        table.register(start_ts);
        Self {
            txn_id,
            start_ts,
            snapshot: Snapshot::new(start_ts),
            status: TxnStatus::InFlight,
            local_writes: BTreeMap::new(),
            read_set: SmallVec::new(),
            pstamp: Timestamp::ZERO,
            sstamp: Timestamp::INFINITY,
            cstamp: None,
            _registration: ActiveRegistration { table, start_ts },
        }
    }

    #[inline]
    #[must_use]
    pub fn txn_id(&self) -> TxnId {
        self.txn_id
    }

    #[inline]
    #[must_use]
    pub fn start_ts(&self) -> Timestamp {
        self.start_ts
    }

    /// The snapshot fixed at `begin`.
    #[inline]
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.snapshot
    }

    #[inline]
    #[must_use]
    pub fn status(&self) -> TxnStatus {
        self.status
    }

    /// Whether the transaction has buffered no writes.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.local_writes.is_empty()
    }

    /// Running predecessor high-water mark.
    #[must_use]
    pub fn pstamp(&self) -> Timestamp {
        self.pstamp
    }

    /// Running successor low-water mark.
    #[must_use]
    pub fn sstamp(&self) -> Timestamp {
        self.sstamp
    }

    /// Commit timestamp, once assigned.
    #[must_use]
    pub fn cstamp(&self) -> Option<Timestamp> {
        self.cstamp
    }

    // -- manager-side mutation --------------------------------------------

    pub(crate) fn buffered(&self, key: ItemId) -> Option<i64> {
        self.local_writes.get(&key).copied()
    }

    pub(crate) fn buffer_write(&mut self, key: ItemId, value: i64) {
        self.local_writes.insert(key, value);
    }

    pub(crate) fn local_writes(&self) -> &BTreeMap<ItemId, i64> {
        &self.local_writes
    }

    /// Record an observed version and fold its metadata into the running
    /// stamps. Re-reads of the same version are recorded once; the folds
    /// are idempotent either way.
    pub(crate) fn record_read(
        &mut self,
        handle: ReadHandle,
        version_pstamp: Timestamp,
        version_sstamp: Timestamp,
    ) {
        if !self.read_set.contains(&handle) {
            self.read_set.push(handle);
        }
        self.pstamp = self.pstamp.max(handle.commit_ts).max(version_pstamp);
        self.sstamp = self.sstamp.min(version_sstamp);
    }

    pub(crate) fn read_set(&self) -> &[ReadHandle] {
        &self.read_set
    }

    pub(crate) fn fold_pstamp(&mut self, ts: Timestamp) {
        self.pstamp = self.pstamp.max(ts);
    }

    pub(crate) fn fold_sstamp(&mut self, ts: Timestamp) {
        self.sstamp = self.sstamp.min(ts);
    }

    pub(crate) fn assign_cstamp(&mut self, cstamp: Timestamp) {
        debug_assert!(self.cstamp.is_none(), "cstamp assigned twice");
        debug_assert!(self.start_ts < cstamp, "cstamp must follow start_ts");
        self.cstamp = Some(cstamp);
    }

    pub(crate) fn mark_committed(&mut self) {
        debug_assert_eq!(self.status, TxnStatus::InFlight);
        self.status = TxnStatus::Committed;
    }

    pub(crate) fn mark_aborted(&mut self) {
        debug_assert_eq!(self.status, TxnStatus::InFlight);
        self.status = TxnStatus::Aborted;
    }
}

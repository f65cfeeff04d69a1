//! Transaction manager: `begin / read / write / try_commit`.
//!
//! One manager serves one store and runs one of two isolation protocols,
//! chosen at construction:
//!
//! - [`Protocol::Si`]: Snapshot Isolation. Commit performs the
//!   first-committer-wins check: a transaction whose write set intersects
//!   any version committed after its snapshot aborts.
//! - [`Protocol::SiSsn`]: SI plus the Serial Safety Net certifier. Reads
//!   fold version metadata into the transaction's running
//!   `pstamp`/`sstamp`; commit folds the write set's predecessor stamps and
//!   the read set's successor stamps, then admits the transaction only if
//!   its exclusion window `(pstamp, sstamp)` is still open. Committed
//!   transactions back-propagate their commit stamp onto the versions they
//!   read and overwrote.
//!
//! The whole commit sequence for a transaction (conflict checks, commit
//! stamp allocation, folding, validation, propagation, appends, GC tick)
//! runs under the store's exclusive lock, making it atomic with respect to
//! every concurrent commit.

use std::fmt;

use parking_lot::Mutex;
use std::sync::Arc;

use snapsafe_types::{ItemCount, ItemId, Protocol, Timestamp};

use crate::error::MvccError;
use crate::gc::{gc_tick, GcTickResult, GcTodo};
use crate::oracle::{ActiveTxnTable, TsOracle, TxnIdAllocator};
use crate::store::{VersionChain, Version, VersionStore};
use crate::txn::{ReadHandle, Transaction};

// ---------------------------------------------------------------------------
// CommitOutcome / AbortReason
// ---------------------------------------------------------------------------

/// Why a transaction lost at commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// First-committer-wins: a concurrent transaction committed a version
    /// of `key` after this transaction's snapshot.
    WriteConflict { key: ItemId },
    /// SSN exclusion window closed: `sstamp <= pstamp` at validation.
    ExclusionWindow { pstamp: Timestamp, sstamp: Timestamp },
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WriteConflict { key } => write!(f, "write-write conflict on {key}"),
            Self::ExclusionWindow { pstamp, sstamp } => {
                write!(f, "exclusion window closed ({pstamp} >= {sstamp})")
            }
        }
    }
}

/// Terminal outcome of `try_commit`. Abort is the expected runtime failure:
/// the caller retries with a fresh `begin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The transaction committed. `commit_ts` is `None` for read-only SI
    /// commits, which consume no timestamp.
    Committed { commit_ts: Option<Timestamp> },
    Aborted { reason: AbortReason },
}

impl CommitOutcome {
    #[must_use]
    pub const fn is_committed(&self) -> bool {
        matches!(self, Self::Committed { .. })
    }
}

// ---------------------------------------------------------------------------
// TransactionManager
// ---------------------------------------------------------------------------

/// The transaction manager. Shared across workers behind an `Arc`; each
/// worker drives its own [`Transaction`] contexts through it sequentially.
#[derive(Debug)]
pub struct TransactionManager {
    protocol: Protocol,
    store: VersionStore,
    oracle: TsOracle,
    ids: TxnIdAllocator,
    active: Arc<ActiveTxnTable>,
    gc_todo: Mutex<GcTodo>,
}

impl TransactionManager {
    /// Construct a manager over a fresh store of `item_count` items, every
    /// key holding the bootstrap version.
    #[must_use]
    pub fn new(item_count: ItemCount, protocol: Protocol) -> Self {
        Self {
            protocol,
            store: VersionStore::new(item_count),
            oracle: TsOracle::new(),
            ids: TxnIdAllocator::new(),
            active: Arc::new(ActiveTxnTable::new()),
            gc_todo: Mutex::new(GcTodo::new()),
        }
    }

    /// The protocol this manager runs.
    #[must_use]
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Number of items in the fixed keyspace.
    #[must_use]
    pub fn item_count(&self) -> ItemCount {
        self.store.item_count()
    }

    /// The underlying store (diagnostics and tests).
    #[must_use]
    pub fn store(&self) -> &VersionStore {
        &self.store
    }

    /// Begin a new transaction.
    ///
    /// # Errors
    ///
    /// `MvccError::TxnIdExhausted` if the id space is spent.
    pub fn begin(&self) -> Result<Transaction, MvccError> {
        let txn_id = self.ids.alloc().ok_or(MvccError::TxnIdExhausted)?;
        let start_ts = self.oracle.next();
        let txn = Transaction::begin(txn_id, start_ts, Arc::clone(&self.active));
        tracing::trace!(txn_id = %txn_id, start_ts = start_ts.get(), "transaction begun");
        Ok(txn)
    }

    /// Read `key` within `txn`.
    ///
    /// Buffered writes win (read-your-own-writes); otherwise the newest
    /// version visible to the transaction's snapshot is returned. Under SSN
    /// the observed version is recorded and its metadata folded into the
    /// running stamps.
    ///
    /// # Errors
    ///
    /// `MvccError::KeyOutOfRange` for a key off the keyspace;
    /// `MvccError::InvalidState` for a terminal context.
    pub fn read(&self, txn: &mut Transaction, key: ItemId) -> Result<i64, MvccError> {
        self.store.check_key(key)?;
        Self::check_in_flight(txn)?;

        if let Some(value) = txn.buffered(key) {
            return Ok(value);
        }

        let chains = self.store.read_chains();
        let version = chains[key.index()].latest_visible(txn.snapshot());
        let value = version.value();

        if self.protocol.is_ssn() {
            let handle = ReadHandle {
                key,
                commit_ts: version.commit_ts(),
            };
            txn.record_read(handle, version.pstamp(), version.sstamp());
        }

        Ok(value)
    }

    /// Buffer a write of `value` to `key`. Repeated writes overwrite; the
    /// store is untouched until commit.
    ///
    /// # Errors
    ///
    /// `MvccError::KeyOutOfRange` for a key off the keyspace;
    /// `MvccError::InvalidState` for a terminal context.
    pub fn write(
        &self,
        txn: &mut Transaction,
        key: ItemId,
        value: i64,
    ) -> Result<(), MvccError> {
        self.store.check_key(key)?;
        Self::check_in_flight(txn)?;
        txn.buffer_write(key, value);
        Ok(())
    }

    /// Attempt to commit, consuming the context. The terminal outcome is
    /// published only through the return value.
    pub fn try_commit(&self, txn: Transaction) -> CommitOutcome {
        match self.protocol {
            Protocol::Si => self.commit_si(txn),
            Protocol::SiSsn => self.commit_ssn(txn),
        }
    }

    /// Run one budgeted GC pass outside the commit path (periodic-tick
    /// entry point; commits already tick after publishing).
    pub fn gc_pass(&self) -> GcTickResult {
        let mut chains = self.store.lock_chains();
        let mut todo = self.gc_todo.lock();
        gc_tick(&mut todo, self.safe_ts(), &mut chains)
    }

    // -----------------------------------------------------------------------
    // SI commit path
    // -----------------------------------------------------------------------

    fn commit_si(&self, mut txn: Transaction) -> CommitOutcome {
        // Read-only transactions conflict with nothing: commit without
        // touching the store or the timestamp sequence.
        if txn.is_read_only() {
            txn.mark_committed();
            return CommitOutcome::Committed { commit_ts: None };
        }

        let mut chains = self.store.lock_chains();

        if let Some(key) = Self::first_committer_conflict(&chains, &txn) {
            drop(chains);
            return self.abort(txn, AbortReason::WriteConflict { key });
        }

        let cstamp = self.oracle.next();
        txn.assign_cstamp(cstamp);
        for (&key, &value) in txn.local_writes() {
            chains[key.index()].append(Version::new(value, cstamp));
        }
        self.gc_after_publish(&mut chains, &txn);
        drop(chains);

        txn.mark_committed();
        tracing::trace!(
            txn_id = %txn.txn_id(),
            cstamp = cstamp.get(),
            "si commit"
        );
        CommitOutcome::Committed {
            commit_ts: Some(cstamp),
        }
    }

    // -----------------------------------------------------------------------
    // SSN commit path
    // -----------------------------------------------------------------------

    fn commit_ssn(&self, mut txn: Transaction) -> CommitOutcome {
        let mut chains = self.store.lock_chains();

        // Step 1: first-committer-wins, identical to SI. Read-only
        // transactions pass vacuously but are NOT short-circuited: the
        // exclusion-window test below still applies to them.
        if let Some(key) = Self::first_committer_conflict(&chains, &txn) {
            drop(chains);
            return self.abort(txn, AbortReason::WriteConflict { key });
        }

        // Step 2: commit stamp.
        let cstamp = self.oracle.next();
        txn.assign_cstamp(cstamp);

        // Step 3: outgoing-write folding. Every overwritten predecessor's
        // pstamp bounds this transaction from below, whether or not the
        // key was also read.
        let mut folded_pstamp = Timestamp::ZERO;
        for &key in txn.local_writes().keys() {
            let prev = chains[key.index()].latest_visible(txn.snapshot());
            folded_pstamp = folded_pstamp.max(prev.pstamp());
        }
        txn.fold_pstamp(folded_pstamp);

        // Step 4: incoming-read folding. The successor stamps of the
        // versions read bound this transaction from above, as does its own
        // commit stamp.
        let mut folded_sstamp = cstamp;
        for handle in txn.read_set() {
            let version = chains[handle.key.index()]
                .find(handle.commit_ts)
                .expect("read-set version must outlive its reader");
            folded_sstamp = folded_sstamp.min(version.sstamp());
        }
        txn.fold_sstamp(folded_sstamp);

        // Step 5: exclusion-window test.
        if txn.sstamp() <= txn.pstamp() {
            let reason = AbortReason::ExclusionWindow {
                pstamp: txn.pstamp(),
                sstamp: txn.sstamp(),
            };
            drop(chains);
            return self.abort(txn, reason);
        }

        // Step 6: propagate metadata and install versions.
        for handle in txn.read_set() {
            let version = chains[handle.key.index()]
                .find(handle.commit_ts)
                .expect("read-set version must outlive its reader");
            version.raise_pstamp(cstamp);
        }
        for (&key, &value) in txn.local_writes() {
            chains[key.index()]
                .latest_visible(txn.snapshot())
                .lower_sstamp(cstamp);
            chains[key.index()].append(Version::new(value, cstamp));
        }
        self.gc_after_publish(&mut chains, &txn);
        drop(chains);

        txn.mark_committed();
        debug_assert!(txn.pstamp() < txn.sstamp());
        tracing::trace!(
            txn_id = %txn.txn_id(),
            cstamp = cstamp.get(),
            pstamp = txn.pstamp().get(),
            sstamp = txn.sstamp().get(),
            "ssn commit"
        );
        CommitOutcome::Committed {
            commit_ts: Some(cstamp),
        }
    }

    // -----------------------------------------------------------------------
    // Shared helpers
    // -----------------------------------------------------------------------

    /// First-committer-wins: the first written key that gained a version
    /// after the transaction's snapshot, if any.
    fn first_committer_conflict(
        chains: &[VersionChain],
        txn: &Transaction,
    ) -> Option<ItemId> {
        txn.local_writes()
            .keys()
            .copied()
            .find(|key| chains[key.index()].has_commit_after(txn.start_ts()))
    }

    fn abort(&self, mut txn: Transaction, reason: AbortReason) -> CommitOutcome {
        txn.mark_aborted();
        tracing::debug!(
            txn_id = %txn.txn_id(),
            start_ts = txn.start_ts().get(),
            %reason,
            "transaction aborted"
        );
        CommitOutcome::Aborted { reason }
    }

    /// The GC safe point: the minimum in-flight start timestamp. The
    /// committing transaction is still registered, so the safe point never
    /// exceeds its snapshot. With no transactions in flight the horizon is
    /// the last issued timestamp (only chain tails survive).
    fn safe_ts(&self) -> Timestamp {
        self.active
            .min_start_ts()
            .unwrap_or_else(|| self.oracle.last_issued())
    }

    /// Enqueue the published keys and run a budgeted pruning pass, all
    /// while still holding the commit critical section.
    fn gc_after_publish(&self, chains: &mut [VersionChain], txn: &Transaction) {
        let mut todo = self.gc_todo.lock();
        for &key in txn.local_writes().keys() {
            todo.enqueue(key);
        }
        let _ = gc_tick(&mut todo, self.safe_ts(), chains);
    }

    fn check_in_flight(txn: &Transaction) -> Result<(), MvccError> {
        if txn.status().is_terminal() {
            return Err(MvccError::InvalidState {
                status: txn.status(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

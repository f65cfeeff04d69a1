//! Versioned item store: per-key append-only version chains.
//!
//! Each key holds a chain of committed versions in ascending `commit_ts`
//! order, never empty thanks to a bootstrap version `(value = 0,
//! commit_ts = 0)` installed at construction. The chain table sits behind a
//! store-wide `RwLock`: snapshot reads take the shared side, the whole
//! commit critical section takes the exclusive side.
//!
//! SSN metadata lives on the versions themselves as atomic cells:
//! `pstamp` (predecessor high-water mark, only ever raised) and `sstamp`
//! (successor low-water mark, only ever lowered). Under plain SI the cells
//! exist but are never consulted.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use snapsafe_types::{ItemCount, ItemId, Snapshot, Timestamp};

use crate::error::MvccError;

// ---------------------------------------------------------------------------
// Version
// ---------------------------------------------------------------------------

/// A committed observation of one item.
///
/// Immutable except for the two SSN stamp cells, whose updates are
/// monotonic: `pstamp` via `fetch_max`, `sstamp` via `fetch_min`.
#[derive(Debug)]
pub struct Version {
    value: i64,
    commit_ts: Timestamp,
    pstamp: AtomicU64,
    sstamp: AtomicU64,
}

impl Version {
    /// A freshly installed version: `pstamp = commit_ts`, `sstamp = +inf`.
    #[must_use]
    pub fn new(value: i64, commit_ts: Timestamp) -> Self {
        Self {
            value,
            commit_ts,
            pstamp: AtomicU64::new(commit_ts.get()),
            sstamp: AtomicU64::new(Timestamp::INFINITY.get()),
        }
    }

    /// The synthetic initial version present on every key at construction.
    #[must_use]
    pub fn bootstrap() -> Self {
        Self::new(0, Timestamp::ZERO)
    }

    #[inline]
    #[must_use]
    pub fn value(&self) -> i64 {
        self.value
    }

    #[inline]
    #[must_use]
    pub fn commit_ts(&self) -> Timestamp {
        self.commit_ts
    }

    /// Current predecessor high-water mark.
    #[inline]
    #[must_use]
    pub fn pstamp(&self) -> Timestamp {
        Timestamp::new(self.pstamp.load(Ordering::Acquire))
    }

    /// Current successor low-water mark.
    #[inline]
    #[must_use]
    pub fn sstamp(&self) -> Timestamp {
        Timestamp::new(self.sstamp.load(Ordering::Acquire))
    }

    /// Raise `pstamp` to at least `ts`. Monotonic: never lowers the cell.
    #[inline]
    pub fn raise_pstamp(&self, ts: Timestamp) {
        self.pstamp.fetch_max(ts.get(), Ordering::AcqRel);
    }

    /// Lower `sstamp` to at most `ts`. Monotonic: never raises the cell.
    #[inline]
    pub fn lower_sstamp(&self, ts: Timestamp) {
        self.sstamp.fetch_min(ts.get(), Ordering::AcqRel);
    }
}

/// Plain-data copy of a version's state, for diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionSnapshot {
    pub value: i64,
    pub commit_ts: Timestamp,
    pub pstamp: Timestamp,
    pub sstamp: Timestamp,
}

impl From<&Version> for VersionSnapshot {
    fn from(v: &Version) -> Self {
        Self {
            value: v.value(),
            commit_ts: v.commit_ts(),
            pstamp: v.pstamp(),
            sstamp: v.sstamp(),
        }
    }
}

/// The core visibility predicate: a version is visible to a snapshot iff it
/// committed at or before the snapshot's high watermark.
#[inline]
#[must_use]
pub fn visible(version: &Version, snapshot: Snapshot) -> bool {
    version.commit_ts() <= snapshot.high
}

// ---------------------------------------------------------------------------
// VersionChain
// ---------------------------------------------------------------------------

/// Per-key chain of committed versions, ascending by `commit_ts`.
#[derive(Debug)]
pub struct VersionChain {
    versions: Vec<Version>,
}

impl VersionChain {
    /// The chain every key holds at store construction: just the bootstrap
    /// version.
    #[must_use]
    pub fn bootstrap() -> Self {
        Self {
            versions: vec![Version::bootstrap()],
        }
    }

    /// Newest version with `commit_ts <= snapshot.high`.
    ///
    /// Infallible: the bootstrap version is visible to every snapshot and
    /// GC never removes the newest version at or below the safe point.
    /// Reverse linear scan; chains stay short in steady state thanks to GC.
    #[must_use]
    pub fn latest_visible(&self, snapshot: Snapshot) -> &Version {
        self.versions
            .iter()
            .rev()
            .find(|v| visible(v, snapshot))
            .expect("chain must hold a version at or below every live snapshot")
    }

    /// Whether any version committed after `ts`. Tail check: chains are
    /// ascending, so only the newest version can be newer than `ts`.
    #[must_use]
    pub fn has_commit_after(&self, ts: Timestamp) -> bool {
        self.versions
            .last()
            .is_some_and(|tail| tail.commit_ts() > ts)
    }

    /// Install a new committed version at the chain tail.
    pub fn append(&mut self, version: Version) {
        debug_assert!(
            self.versions
                .last()
                .is_none_or(|tail| tail.commit_ts() < version.commit_ts()),
            "chain commit timestamps must be strictly increasing"
        );
        self.versions.push(version);
    }

    /// Locate a version by its commit timestamp.
    #[must_use]
    pub fn find(&self, commit_ts: Timestamp) -> Option<&Version> {
        self.versions
            .binary_search_by_key(&commit_ts, Version::commit_ts)
            .ok()
            .map(|i| &self.versions[i])
    }

    /// Number of versions currently on the chain.
    #[must_use]
    pub fn len(&self) -> usize {
        self.versions.len()
    }

    /// Chains are never empty; this exists for the conventional pairing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    /// The chain's newest version.
    #[must_use]
    pub fn tail(&self) -> &Version {
        self.versions.last().expect("chain is never empty")
    }

    /// The chain's oldest retained version.
    #[must_use]
    pub fn oldest(&self) -> &Version {
        self.versions.first().expect("chain is never empty")
    }

    pub(crate) fn versions(&self) -> &[Version] {
        &self.versions
    }

    /// Drop the `n` oldest versions. GC only.
    pub(crate) fn drop_prefix(&mut self, n: usize) {
        debug_assert!(n < self.versions.len(), "pruning must retain a version");
        self.versions.drain(..n);
    }

    /// Plain-data copy of the chain, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<VersionSnapshot> {
        self.versions.iter().map(VersionSnapshot::from).collect()
    }
}

// ---------------------------------------------------------------------------
// VersionStore
// ---------------------------------------------------------------------------

/// The store: a fixed table of version chains behind one `RwLock`.
///
/// Reads resolve snapshots under the shared lock. The commit protocol takes
/// the exclusive lock for its whole critical section, which makes the
/// sequence (conflict checks, commit-stamp allocation, stamp folding,
/// validation, metadata propagation, append) atomic with respect to every
/// other commit.
#[derive(Debug)]
pub struct VersionStore {
    chains: RwLock<Vec<VersionChain>>,
    item_count: ItemCount,
}

impl VersionStore {
    /// Construct a store with `item_count` keys, each holding the bootstrap
    /// version.
    #[must_use]
    pub fn new(item_count: ItemCount) -> Self {
        let chains = (0..item_count.get())
            .map(|_| VersionChain::bootstrap())
            .collect();
        Self {
            chains: RwLock::new(chains),
            item_count,
        }
    }

    /// Number of items in the fixed keyspace.
    #[must_use]
    pub fn item_count(&self) -> ItemCount {
        self.item_count
    }

    /// Reject keys outside `[0, item_count)`.
    pub fn check_key(&self, key: ItemId) -> Result<(), MvccError> {
        if self.item_count.contains(key) {
            Ok(())
        } else {
            Err(MvccError::KeyOutOfRange {
                key,
                item_count: self.item_count,
            })
        }
    }

    /// Shared access for snapshot reads.
    pub(crate) fn read_chains(&self) -> RwLockReadGuard<'_, Vec<VersionChain>> {
        self.chains.read()
    }

    /// Exclusive access for the commit critical section and GC.
    pub(crate) fn lock_chains(&self) -> RwLockWriteGuard<'_, Vec<VersionChain>> {
        self.chains.write()
    }

    /// Plain-data copy of one key's chain, oldest first.
    #[must_use]
    pub fn chain_snapshot(&self, key: ItemId) -> Vec<VersionSnapshot> {
        let chains = self.chains.read();
        chains[key.index()].snapshot()
    }

    /// Total number of versions across all chains.
    #[must_use]
    pub fn version_count(&self) -> usize {
        let chains = self.chains.read();
        chains.iter().map(VersionChain::len).sum()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Timestamp oracle, transaction id allocation, and the active-transaction
//! table.
//!
//! One strictly increasing timestamp sequence serves both `start_ts` and
//! commit stamps: SI visibility (`commit_ts <= start_ts`) requires start and
//! commit events to live in the same total order. Transaction ids come from
//! a disjoint counter so a log line can never confuse the two.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use snapsafe_types::{Timestamp, TxnId};

// ---------------------------------------------------------------------------
// TsOracle
// ---------------------------------------------------------------------------

/// Monotonic timestamp source.
///
/// `next()` returns a strictly increasing, unique timestamp via atomic
/// fetch-add. Timestamp 0 is reserved for the bootstrap versions installed
/// at store construction.
#[derive(Debug)]
pub struct TsOracle {
    next: AtomicU64,
}

impl TsOracle {
    /// Create an oracle whose first `next()` returns timestamp 1.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Allocate the next timestamp.
    #[inline]
    pub fn next(&self) -> Timestamp {
        Timestamp::new(self.next.fetch_add(1, Ordering::Release))
    }

    /// The most recently allocated timestamp (`ZERO` if none yet).
    #[must_use]
    pub fn last_issued(&self) -> Timestamp {
        Timestamp::new(self.next.load(Ordering::Acquire).saturating_sub(1))
    }
}

impl Default for TsOracle {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// TxnIdAllocator
// ---------------------------------------------------------------------------

/// Monotonic `TxnId` allocation via an `AtomicU64` CAS loop.
///
/// Each successful CAS publishes a unique id; the counter only ever
/// increases. If the counter would wrap past the u64 domain the allocator
/// returns `None` rather than publishing a duplicate.
#[derive(Debug)]
pub struct TxnIdAllocator {
    next: AtomicU64,
}

impl TxnIdAllocator {
    /// Create an allocator whose first id is 1.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Allocate the next `TxnId`, or `None` if the id space is exhausted.
    pub fn alloc(&self) -> Option<TxnId> {
        loop {
            let current = self.next.load(Ordering::Acquire);
            let next = current.checked_add(1)?;
            if self
                .next
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return TxnId::new(current);
            }
            // CAS failed: another thread won; retry.
        }
    }
}

impl Default for TxnIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// ActiveTxnTable
// ---------------------------------------------------------------------------

/// Multiset of in-flight start timestamps.
///
/// The minimum entry is the GC safe point: no in-flight transaction can
/// observe a version older than the newest one at or below it. Entries are
/// registered at `begin` and removed when the owning context reaches a
/// terminal state (via the context's registration guard), so a committing
/// transaction still bounds the safe point during its own critical section.
#[derive(Debug, Default)]
pub struct ActiveTxnTable {
    starts: Mutex<BTreeMap<u64, u32>>,
}

impl ActiveTxnTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an in-flight transaction's start timestamp.
    pub fn register(&self, start_ts: Timestamp) {
        let mut starts = self.starts.lock();
        *starts.entry(start_ts.get()).or_insert(0) += 1;
    }

    /// Remove a previously registered start timestamp.
    pub fn deregister(&self, start_ts: Timestamp) {
        let mut starts = self.starts.lock();
        let raw = start_ts.get();
        match starts.get_mut(&raw) {
            Some(count) if *count > 1 => *count -= 1,
            Some(_) => {
                starts.remove(&raw);
            }
            None => debug_assert!(false, "deregister of unknown start_ts {start_ts}"),
        }
    }

    /// The minimum in-flight start timestamp, if any transaction is active.
    #[must_use]
    pub fn min_start_ts(&self) -> Option<Timestamp> {
        let starts = self.starts.lock();
        starts.keys().next().copied().map(Timestamp::new)
    }

    /// Number of in-flight transactions.
    #[must_use]
    pub fn len(&self) -> usize {
        let starts = self.starts.lock();
        starts.values().map(|&c| c as usize).sum()
    }

    /// Whether no transaction is in flight.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.starts.lock().is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn oracle_is_strictly_increasing() {
        let oracle = TsOracle::new();
        let mut prev = Timestamp::ZERO;
        for _ in 0..1000 {
            let ts = oracle.next();
            assert!(ts > prev, "timestamps must be strictly increasing");
            prev = ts;
        }
        assert_eq!(oracle.last_issued(), prev);
    }

    #[test]
    fn oracle_unique_across_threads() {
        let oracle = Arc::new(TsOracle::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let oracle = Arc::clone(&oracle);
                std::thread::spawn(move || {
                    (0..250).map(|_| oracle.next().get()).collect::<Vec<_>>()
                })
            })
            .collect();

        let mut all: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();
        for window in all.windows(2) {
            assert!(window[0] < window[1], "duplicate timestamp {}", window[0]);
        }
        assert_eq!(all.len(), 1000);
    }

    #[test]
    fn txn_ids_unique_across_threads() {
        let ids = Arc::new(TxnIdAllocator::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let ids = Arc::clone(&ids);
                std::thread::spawn(move || {
                    (0..250)
                        .map(|_| ids.alloc().unwrap().get())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut all: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 1000, "all TxnIds must be unique");
    }

    #[test]
    fn active_table_tracks_minimum() {
        let table = ActiveTxnTable::new();
        assert!(table.min_start_ts().is_none());

        table.register(Timestamp::new(5));
        table.register(Timestamp::new(3));
        table.register(Timestamp::new(9));
        assert_eq!(table.min_start_ts(), Some(Timestamp::new(3)));
        assert_eq!(table.len(), 3);

        table.deregister(Timestamp::new(3));
        assert_eq!(table.min_start_ts(), Some(Timestamp::new(5)));

        table.deregister(Timestamp::new(5));
        table.deregister(Timestamp::new(9));
        assert!(table.is_empty());
    }

    #[test]
    fn active_table_handles_duplicate_timestamps() {
        // Two registrations of the same timestamp must survive one
        // deregistration.
        let table = ActiveTxnTable::new();
        table.register(Timestamp::new(7));
        table.register(Timestamp::new(7));
        table.deregister(Timestamp::new(7));
        assert_eq!(table.min_start_ts(), Some(Timestamp::new(7)));
        table.deregister(Timestamp::new(7));
        assert!(table.min_start_ts().is_none());
    }
}

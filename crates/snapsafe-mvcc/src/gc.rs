//! Incremental version-chain garbage collection.
//!
//! Commits enqueue the keys they touched into a dedup todo queue; a
//! budgeted `gc_tick` runs inside the same commit critical section and
//! prunes those chains against the safe point. The safe point is the
//! minimum in-flight start timestamp, so pruning can never remove a version
//! some live snapshot still resolves to: the newest version at or below the
//! safe point is always retained, along with everything after it.
//!
//! Retention invariant per key: the oldest retained version satisfies
//! `commit_ts <= safe_ts < commit_ts_of_next` (or the chain has no version
//! above the safe point at all and only the tail remains).

use std::collections::{HashSet, VecDeque};

use snapsafe_types::{ItemId, Timestamp};

use crate::store::VersionChain;

/// Maximum keys pruned per `gc_tick` invocation.
pub const GC_KEYS_BUDGET: u32 = 64;

/// Maximum versions freed per `gc_tick` invocation.
pub const GC_VERSIONS_BUDGET: u32 = 1024;

// ---------------------------------------------------------------------------
// GcTodo
// ---------------------------------------------------------------------------

/// Touched-key queue with duplicate suppression.
///
/// A key already in the queue is not enqueued again until a tick pops it;
/// version churn on a hot key costs one queue slot, not one per commit.
#[derive(Debug, Default)]
pub struct GcTodo {
    queue: VecDeque<ItemId>,
    in_queue: HashSet<ItemId>,
}

impl GcTodo {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a key for a future pruning pass.
    pub fn enqueue(&mut self, key: ItemId) {
        if self.in_queue.insert(key) {
            self.queue.push_back(key);
        }
    }

    /// Pop the next key to prune, if any.
    pub fn pop(&mut self) -> Option<ItemId> {
        let key = self.queue.pop_front()?;
        self.in_queue.remove(&key);
        Some(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

// ---------------------------------------------------------------------------
// prune_chain / gc_tick
// ---------------------------------------------------------------------------

/// Prune one chain against the safe point; returns the number of versions
/// freed.
///
/// Keeps the newest version with `commit_ts <= safe_ts` (still the visible
/// version for a snapshot taken exactly at the safe point) and every
/// version after it.
pub fn prune_chain(chain: &mut VersionChain, safe_ts: Timestamp) -> u32 {
    // Index of the first version above the safe point; the version just
    // before it is the cut's survivor.
    let first_above = chain
        .versions()
        .iter()
        .position(|v| v.commit_ts() > safe_ts)
        .unwrap_or(chain.len());
    let prune_count = first_above.saturating_sub(1);
    if prune_count == 0 {
        return 0;
    }
    chain.drop_prefix(prune_count);

    debug_assert!(chain.oldest().commit_ts() <= safe_ts);
    debug_assert!(
        chain
            .versions()
            .get(1)
            .is_none_or(|next| safe_ts < next.commit_ts()),
        "oldest retained version must be the newest at or below the safe point"
    );

    u32::try_from(prune_count).unwrap_or(u32::MAX)
}

/// Result of one `gc_tick` pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GcTickResult {
    /// Keys whose chains were examined this tick.
    pub keys_pruned: u32,
    /// Versions freed across all examined chains.
    pub versions_freed: u32,
    /// Whether a work budget cut the tick short.
    pub budget_exhausted: bool,
    /// Keys remaining in the todo queue after this tick.
    pub queue_remaining: usize,
}

/// Run one budgeted pruning pass over the todo queue.
///
/// The caller holds the store's exclusive lock and supplies the chain table
/// and the current safe point.
pub fn gc_tick(
    todo: &mut GcTodo,
    safe_ts: Timestamp,
    chains: &mut [VersionChain],
) -> GcTickResult {
    let mut keys_budget = GC_KEYS_BUDGET;
    let mut versions_budget = GC_VERSIONS_BUDGET;
    let mut keys_pruned = 0_u32;
    let mut versions_freed = 0_u32;
    let mut budget_exhausted = false;

    while keys_budget > 0 && versions_budget > 0 {
        let Some(key) = todo.pop() else {
            break;
        };
        let freed = prune_chain(&mut chains[key.index()], safe_ts);
        keys_pruned += 1;
        versions_freed += freed;
        keys_budget -= 1;
        versions_budget = versions_budget.saturating_sub(freed);
    }

    if (keys_budget == 0 || versions_budget == 0) && !todo.is_empty() {
        budget_exhausted = true;
    }

    if versions_freed > 0 {
        tracing::debug!(
            keys_pruned,
            versions_freed,
            safe_ts = safe_ts.get(),
            queue_remaining = todo.len(),
            "gc tick freed old versions"
        );
    }

    GcTickResult {
        keys_pruned,
        versions_freed,
        budget_exhausted,
        queue_remaining: todo.len(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use crate::store::{Version, VersionStore};
    use snapsafe_types::{ItemCount, Snapshot};

    use super::*;

    fn chain_with(stamps: &[u64]) -> VersionChain {
        let mut chain = VersionChain::bootstrap();
        for &ts in stamps {
            chain.append(Version::new(ts as i64, Timestamp::new(ts)));
        }
        chain
    }

    #[test]
    fn todo_dedups_until_popped() {
        let mut todo = GcTodo::new();
        todo.enqueue(ItemId::new(1));
        todo.enqueue(ItemId::new(1));
        todo.enqueue(ItemId::new(2));
        assert_eq!(todo.len(), 2);
        assert_eq!(todo.pop(), Some(ItemId::new(1)));
        todo.enqueue(ItemId::new(1));
        assert_eq!(todo.len(), 2);
    }

    #[test]
    fn prune_keeps_newest_at_or_below_safe_point() {
        // Chain: 0, 2, 5, 9. Safe point 5 -> bootstrap and v2 freed, v5 kept.
        let mut chain = chain_with(&[2, 5, 9]);
        let freed = prune_chain(&mut chain, Timestamp::new(5));
        assert_eq!(freed, 2);
        let stamps: Vec<_> = chain.snapshot().iter().map(|v| v.commit_ts.get()).collect();
        assert_eq!(stamps, vec![5, 9]);

        // Safe point between versions: 6 keeps v5 as the survivor.
        let mut chain = chain_with(&[2, 5, 9]);
        let freed = prune_chain(&mut chain, Timestamp::new(6));
        assert_eq!(freed, 2);
        assert_eq!(chain.oldest().commit_ts(), Timestamp::new(5));
    }

    #[test]
    fn prune_noop_when_everything_is_needed() {
        let mut chain = chain_with(&[4, 8]);
        // Safe point below every non-bootstrap version: nothing above the
        // bootstrap survivor may be freed.
        assert_eq!(prune_chain(&mut chain, Timestamp::ZERO), 0);
        assert_eq!(chain.len(), 3);
    }

    #[test]
    fn prune_past_the_tail_keeps_the_tail() {
        let mut chain = chain_with(&[4, 8]);
        let freed = prune_chain(&mut chain, Timestamp::new(100));
        assert_eq!(freed, 2);
        assert_eq!(chain.len(), 1);
        assert_eq!(chain.oldest().commit_ts(), Timestamp::new(8));
        // The survivor still resolves a snapshot at the safe point.
        let v = chain.latest_visible(Snapshot::new(Timestamp::new(100)));
        assert_eq!(v.commit_ts(), Timestamp::new(8));
    }

    #[test]
    fn tick_respects_queue_and_reports_counts() {
        let store = VersionStore::new(ItemCount::new(3).unwrap());
        {
            let mut chains = store.lock_chains();
            for key in 0..3 {
                for ts in 1..=4_u64 {
                    let ts = ts + key as u64 * 10;
                    chains[key].append(Version::new(0, Timestamp::new(ts)));
                }
            }
        }

        let mut todo = GcTodo::new();
        todo.enqueue(ItemId::new(0));
        todo.enqueue(ItemId::new(2));

        let mut chains = store.lock_chains();
        let result = gc_tick(&mut todo, Timestamp::new(1000), &mut chains);
        assert_eq!(result.keys_pruned, 2);
        assert_eq!(result.versions_freed, 8);
        assert!(!result.budget_exhausted);
        assert_eq!(result.queue_remaining, 0);

        // Key 1 was never enqueued, so its chain is untouched.
        assert_eq!(chains[1].len(), 5);
        assert_eq!(chains[0].len(), 1);
        assert_eq!(chains[2].len(), 1);
    }
}

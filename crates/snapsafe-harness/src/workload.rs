//! Worker loop: randomized transactions with retry-on-abort.
//!
//! Each worker owns a seeded `StdRng` and drives its transactions
//! sequentially: a coin flip picks read-only vs read-modify-write, every
//! operation targets a uniform random key, and an exponential think time
//! separates operations. An aborted transaction is retried from a fresh
//! `begin` until it commits; the commit delay is measured from the first
//! attempt.

use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use snapsafe_mvcc::TransactionManager;
use snapsafe_types::ItemId;

use crate::params::HarnessParams;
use crate::stats::WorkerSummary;

/// Derive a worker's RNG seed from the master seed (splitmix64 finalizer,
/// so consecutive worker indices land far apart).
#[must_use]
pub fn derive_worker_seed(master: u64, worker: u32) -> u64 {
    let mut z = master
        .wrapping_add(u64::from(worker).wrapping_mul(0x9e37_79b9_7f4a_7c15))
        .wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// Sample an exponential think time with the given mean, by inverse
/// transform. A zero mean disables thinking entirely.
fn think_time(rng: &mut StdRng, mean_ms: f64) -> Duration {
    if mean_ms <= 0.0 {
        return Duration::ZERO;
    }
    let u: f64 = rng.gen_range(0.0..1.0);
    Duration::from_secs_f64(-mean_ms * (1.0 - u).ln() / 1000.0)
}

/// Run one worker's share of the workload to completion.
pub fn run_worker(
    manager: &TransactionManager,
    params: &HarnessParams,
    worker: u32,
) -> WorkerSummary {
    let mut rng = StdRng::seed_from_u64(derive_worker_seed(params.seed, worker));
    let mut summary = WorkerSummary::default();

    for _ in 0..params.txns_per_worker {
        let started = Instant::now();
        let mut aborts_this_txn = 0_u64;

        loop {
            let mut txn = manager
                .begin()
                .expect("harness never exhausts the txn id space");
            let read_only = rng.gen_range(0.0..1.0) < params.read_ratio;

            for _ in 0..params.ops_per_txn {
                let key = ItemId::new(rng.gen_range(0..params.n_items));
                let mut value = manager
                    .read(&mut txn, key)
                    .expect("workload keys are always in range");
                tracing::trace!(
                    worker,
                    txn_id = %txn.txn_id(),
                    %key,
                    value,
                    "read"
                );

                if !read_only {
                    value += rng.gen_range(0..=params.max_value);
                    manager
                        .write(&mut txn, key, value)
                        .expect("workload keys are always in range");
                    tracing::trace!(
                        worker,
                        txn_id = %txn.txn_id(),
                        %key,
                        value,
                        "write"
                    );
                }

                let pause = think_time(&mut rng, params.mean_think_ms);
                if !pause.is_zero() {
                    std::thread::sleep(pause);
                }
            }

            let txn_id = txn.txn_id();
            let outcome = manager.try_commit(txn);
            if outcome.is_committed() {
                let delay = started.elapsed();
                summary.committed += 1;
                summary.aborted += aborts_this_txn;
                summary.total_commit_delay += delay;
                tracing::debug!(
                    worker,
                    txn_id = %txn_id,
                    aborts = aborts_this_txn,
                    delay_us = delay.as_micros() as u64,
                    "transaction committed"
                );
                break;
            }
            aborts_this_txn += 1;
        }
    }

    summary
}

/// Run a full workload: build a manager for the configured protocol, spawn
/// the workers, and aggregate their summaries into a report.
#[must_use]
pub fn run(params: &HarnessParams) -> crate::stats::RunReport {
    let manager = TransactionManager::new(params.item_count(), params.protocol);
    let started = Instant::now();

    let summaries: Vec<WorkerSummary> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..params.n_workers)
            .map(|worker| {
                let manager = &manager;
                scope.spawn(move || run_worker(manager, params, worker))
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("worker thread must not panic"))
            .collect()
    });

    let report = crate::stats::aggregate(params, &summaries, started.elapsed());
    tracing::info!(
        protocol = %params.protocol,
        committed = report.committed,
        aborted = report.aborted,
        avg_commit_delay_ms = report.avg_commit_delay_ms,
        avg_aborts_per_commit = report.avg_aborts_per_commit,
        commits_per_sec = report.commits_per_sec,
        "workload complete"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_seeds_differ() {
        let a = derive_worker_seed(42, 0);
        let b = derive_worker_seed(42, 1);
        let c = derive_worker_seed(43, 0);
        assert_ne!(a, b);
        assert_ne!(a, c);
        // Deterministic for a fixed (master, worker) pair.
        assert_eq!(a, derive_worker_seed(42, 0));
    }

    #[test]
    fn think_time_zero_mean_is_zero() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(think_time(&mut rng, 0.0), Duration::ZERO);
    }

    #[test]
    fn think_time_is_bounded_in_practice() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..1000 {
            let t = think_time(&mut rng, 2.0);
            // Exponential with mean 2ms: astronomically unlikely above 1s.
            assert!(t < Duration::from_secs(1));
        }
    }
}

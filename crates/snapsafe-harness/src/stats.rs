//! Aggregate statistics for a workload run.

use std::time::Duration;

use serde::Serialize;

use snapsafe_types::Protocol;

use crate::params::HarnessParams;

/// Per-worker tallies, merged into a [`RunReport`] after the join.
#[derive(Debug, Default, Clone)]
pub struct WorkerSummary {
    /// Transactions that reached `Committed`.
    pub committed: u64,
    /// Abort-and-retry rounds spent across all committed transactions.
    pub aborted: u64,
    /// Sum of begin-to-commit delays (including retries).
    pub total_commit_delay: Duration,
}

/// Final aggregates for one run, serialized as the result file.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub protocol: Protocol,
    pub n_workers: u32,
    pub n_items: u32,
    pub committed: u64,
    pub aborted: u64,
    /// Mean begin-to-commit delay per committed transaction.
    pub avg_commit_delay_ms: f64,
    /// Mean aborts suffered per committed transaction.
    pub avg_aborts_per_commit: f64,
    pub commits_per_sec: f64,
    pub aborts_per_sec: f64,
    pub elapsed_secs: f64,
}

/// Merge worker summaries into the run report.
#[must_use]
pub fn aggregate(
    params: &HarnessParams,
    summaries: &[WorkerSummary],
    elapsed: Duration,
) -> RunReport {
    let committed: u64 = summaries.iter().map(|s| s.committed).sum();
    let aborted: u64 = summaries.iter().map(|s| s.aborted).sum();
    let total_delay: Duration = summaries.iter().map(|s| s.total_commit_delay).sum();

    let elapsed_secs = elapsed.as_secs_f64();
    let (avg_commit_delay_ms, avg_aborts_per_commit) = if committed > 0 {
        (
            total_delay.as_secs_f64() * 1000.0 / committed as f64,
            aborted as f64 / committed as f64,
        )
    } else {
        (0.0, 0.0)
    };
    let (commits_per_sec, aborts_per_sec) = if elapsed_secs > 0.0 {
        (
            committed as f64 / elapsed_secs,
            aborted as f64 / elapsed_secs,
        )
    } else {
        (0.0, 0.0)
    };

    RunReport {
        protocol: params.protocol,
        n_workers: params.n_workers,
        n_items: params.n_items,
        committed,
        aborted,
        avg_commit_delay_ms,
        avg_aborts_per_commit,
        commits_per_sec,
        aborts_per_sec,
        elapsed_secs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_divides_by_commits() {
        let params = HarnessParams::default();
        let summaries = vec![
            WorkerSummary {
                committed: 3,
                aborted: 1,
                total_commit_delay: Duration::from_millis(30),
            },
            WorkerSummary {
                committed: 1,
                aborted: 1,
                total_commit_delay: Duration::from_millis(10),
            },
        ];
        let report = aggregate(&params, &summaries, Duration::from_secs(2));
        assert_eq!(report.committed, 4);
        assert_eq!(report.aborted, 2);
        assert!((report.avg_commit_delay_ms - 10.0).abs() < 1e-9);
        assert!((report.avg_aborts_per_commit - 0.5).abs() < 1e-9);
        assert!((report.commits_per_sec - 2.0).abs() < 1e-9);
    }

    #[test]
    fn aggregate_handles_empty_run() {
        let params = HarnessParams::default();
        let report = aggregate(&params, &[], Duration::ZERO);
        assert_eq!(report.committed, 0);
        assert_eq!(report.avg_commit_delay_ms, 0.0);
        assert_eq!(report.commits_per_sec, 0.0);
    }
}

//! End-to-end workload runs against both protocols.

use snapsafe_harness::{run, HarnessParams};
use snapsafe_types::Protocol;

fn fast_params(protocol: Protocol) -> HarnessParams {
    HarnessParams {
        n_workers: 4,
        n_items: 4,
        txns_per_worker: 25,
        max_value: 10,
        ops_per_txn: 3,
        mean_think_ms: 0.0,
        read_ratio: 0.5,
        protocol,
        seed: 7,
    }
}

#[test]
fn every_transaction_eventually_commits() {
    for protocol in [Protocol::Si, Protocol::SiSsn] {
        let params = fast_params(protocol);
        params.validate().unwrap();

        let report = run(&params);
        assert_eq!(
            report.committed,
            u64::from(params.n_workers * params.txns_per_worker),
            "{protocol}: retry loop must drive every transaction to commit"
        );
        assert!(report.elapsed_secs > 0.0);
        assert!(report.avg_commit_delay_ms.is_finite());
        assert!(report.avg_aborts_per_commit.is_finite());
        assert_eq!(report.protocol, protocol);
    }
}

#[test]
fn contended_ssn_run_completes_with_aborts_counted() {
    // One hot item and update-heavy transactions: plenty of conflicts, and
    // the retry loop still drives everything through.
    let params = HarnessParams {
        n_items: 1,
        read_ratio: 0.0,
        ..fast_params(Protocol::SiSsn)
    };
    let report = run(&params);
    assert_eq!(
        report.committed,
        u64::from(params.n_workers * params.txns_per_worker)
    );
    // Aborts are workload-dependent, but the counters must be consistent.
    assert!(report.aborts_per_sec >= 0.0);
    assert!(report.avg_aborts_per_commit >= 0.0);
}

#[test]
fn report_serializes_to_json() {
    let report = run(&HarnessParams {
        n_workers: 1,
        txns_per_worker: 5,
        ..fast_params(Protocol::Si)
    });
    let text = serde_json::to_string(&report).unwrap();
    assert!(text.contains("\"protocol\":\"si\""));
    assert!(text.contains("\"committed\":5"));
}

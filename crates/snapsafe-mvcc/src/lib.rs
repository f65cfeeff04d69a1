//! In-memory MVCC transaction manager with two isolation protocols.
//!
//! The store holds a fixed set of integer-keyed, integer-valued items, each
//! with an append-only chain of committed versions. A
//! [`TransactionManager`] drives transactions through
//! `begin / read / write / try_commit` under either protocol:
//!
//! - **SI**: Snapshot Isolation with first-committer-wins write-write
//!   conflict detection.
//! - **SI+SSN**: SI plus the Serial Safety Net certifier, which tracks a
//!   predecessor high-water mark (`pstamp`) and successor low-water mark
//!   (`sstamp`) per transaction and per version, and aborts any transaction
//!   whose exclusion window `(pstamp, sstamp)` closes. This forbids
//!   anti-dependency cycles and yields serializable execution.
//!
//! Aborts are non-destructive; callers retry with a fresh `begin`. The
//! store is volatile: no persistence, recovery, or replication.

pub mod error;
pub mod gc;
pub mod manager;
pub mod oracle;
pub mod store;
pub mod txn;

pub use error::MvccError;
pub use gc::{gc_tick, prune_chain, GcTickResult, GcTodo, GC_KEYS_BUDGET, GC_VERSIONS_BUDGET};
pub use manager::{AbortReason, CommitOutcome, TransactionManager};
pub use oracle::{ActiveTxnTable, TsOracle, TxnIdAllocator};
pub use store::{visible, Version, VersionChain, VersionSnapshot, VersionStore};
pub use txn::{ReadHandle, Transaction};

pub use snapsafe_types::{
    ItemCount, ItemId, Protocol, Snapshot, Timestamp, TxnId, TxnStatus,
};

//! Error taxonomy for the MVCC core.
//!
//! Deliberately narrow: abort is *not* an error (it is the expected outcome
//! of a lost conflict, reported through [`crate::CommitOutcome`]); the
//! variants here cover misuse and resource exhaustion only. A correct
//! caller never triggers them.

use thiserror::Error;

use snapsafe_types::{ItemCount, ItemId, TxnStatus};

/// Error type for the core transaction API.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MvccError {
    /// A read or write addressed a key outside the store's fixed keyspace.
    #[error("{key} out of range: store holds {item_count} items")]
    KeyOutOfRange { key: ItemId, item_count: ItemCount },

    /// The transaction id space is exhausted.
    #[error("transaction id space exhausted")]
    TxnIdExhausted,

    /// An operation was issued against a terminal transaction context.
    #[error("operation on {status} transaction")]
    InvalidState { status: TxnStatus },
}

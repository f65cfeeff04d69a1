//! Workload driver for the SnapSafe MVCC core.
//!
//! This crate provides the external collaborators the core deliberately
//! leaves out: parameter loading, seeded workload generation, the
//! retry-on-abort worker loop, and aggregate statistics. The core sees
//! nothing of it beyond `begin / read / write / try_commit` calls.

pub mod params;
pub mod stats;
pub mod workload;

pub use params::{HarnessError, HarnessParams};
pub use stats::{aggregate, RunReport, WorkerSummary};
pub use workload::{derive_worker_seed, run, run_worker};

//! Harness parameter record: loading, defaults, validation.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use snapsafe_types::{ItemCount, Protocol};

/// Errors surfaced by the harness itself (never by the core).
#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parameter file is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid parameter `{field}`: {detail}")]
    InvalidParam { field: &'static str, detail: String },
}

/// One benchmark run's worth of knobs.
///
/// Mirrors the classic parameter tuple `(n, m, numTrans, constVal,
/// numIters, lambda, readRatio)` with a protocol selector and a master
/// seed on top. All fields have defaults, so a parameter file only needs
/// to name what it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarnessParams {
    /// Worker threads issuing transactions.
    pub n_workers: u32,
    /// Items in the store's fixed keyspace.
    pub n_items: u32,
    /// Transactions each worker must commit.
    pub txns_per_worker: u32,
    /// Upper bound (inclusive) of the random increment added on writes.
    pub max_value: i64,
    /// Read (or read-modify-write) operations per transaction.
    pub ops_per_txn: u32,
    /// Mean of the exponential think-time between operations, in
    /// milliseconds. Zero disables thinking.
    pub mean_think_ms: f64,
    /// Probability that a transaction is read-only.
    pub read_ratio: f64,
    /// Isolation protocol for the run.
    pub protocol: Protocol,
    /// Master seed; worker seeds are derived from it.
    pub seed: u64,
}

impl Default for HarnessParams {
    fn default() -> Self {
        Self {
            n_workers: 4,
            n_items: 16,
            txns_per_worker: 100,
            max_value: 100,
            ops_per_txn: 4,
            mean_think_ms: 1.0,
            read_ratio: 0.7,
            protocol: Protocol::Si,
            seed: 42,
        }
    }
}

impl HarnessParams {
    /// Load a parameter record from a JSON file and validate it.
    pub fn load(path: &Path) -> Result<Self, HarnessError> {
        let text = fs::read_to_string(path)?;
        let params: Self = serde_json::from_str(&text)?;
        params.validate()?;
        Ok(params)
    }

    /// Reject zero-sized or out-of-domain knobs before any thread spawns.
    pub fn validate(&self) -> Result<(), HarnessError> {
        fn nonzero(field: &'static str, value: u32) -> Result<(), HarnessError> {
            if value == 0 {
                return Err(HarnessError::InvalidParam {
                    field,
                    detail: "must be at least 1".to_owned(),
                });
            }
            Ok(())
        }

        nonzero("n_workers", self.n_workers)?;
        nonzero("n_items", self.n_items)?;
        nonzero("txns_per_worker", self.txns_per_worker)?;
        nonzero("ops_per_txn", self.ops_per_txn)?;

        if self.max_value < 0 {
            return Err(HarnessError::InvalidParam {
                field: "max_value",
                detail: format!("must be non-negative, got {}", self.max_value),
            });
        }
        if !(0.0..=1.0).contains(&self.read_ratio) {
            return Err(HarnessError::InvalidParam {
                field: "read_ratio",
                detail: format!("must lie in [0, 1], got {}", self.read_ratio),
            });
        }
        if !self.mean_think_ms.is_finite() || self.mean_think_ms < 0.0 {
            return Err(HarnessError::InvalidParam {
                field: "mean_think_ms",
                detail: format!("must be finite and non-negative, got {}", self.mean_think_ms),
            });
        }
        Ok(())
    }

    /// The validated keyspace size.
    ///
    /// # Panics
    ///
    /// If called on an unvalidated record with `n_items == 0`.
    #[must_use]
    pub fn item_count(&self) -> ItemCount {
        ItemCount::new(self.n_items).expect("n_items validated nonzero")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        HarnessParams::default().validate().unwrap();
    }

    #[test]
    fn zero_workers_rejected() {
        let params = HarnessParams {
            n_workers: 0,
            ..HarnessParams::default()
        };
        let err = params.validate().unwrap_err();
        assert!(err.to_string().contains("n_workers"));
    }

    #[test]
    fn read_ratio_domain_checked() {
        let params = HarnessParams {
            read_ratio: 1.5,
            ..HarnessParams::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let params: HarnessParams =
            serde_json::from_str(r#"{"n_workers": 8, "protocol": "si-ssn"}"#).unwrap();
        assert_eq!(params.n_workers, 8);
        assert_eq!(params.protocol, Protocol::SiSsn);
        assert_eq!(params.n_items, HarnessParams::default().n_items);
    }

    #[test]
    fn unknown_fields_rejected() {
        let result: Result<HarnessParams, _> = serde_json::from_str(r#"{"n_wrkrs": 8}"#);
        assert!(result.is_err());
    }
}

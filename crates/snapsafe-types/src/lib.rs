//! Foundation types shared across the SnapSafe workspace.
//!
//! This crate defines the cross-cutting identifiers of the MVCC core:
//! transaction ids, the unified timestamp domain, item keys, snapshots, and
//! protocol selection. Runtime machinery (version chains, the transaction
//! manager) lives in `snapsafe-mvcc`; this crate is plain data.

use std::fmt;
use std::num::{NonZeroU32, NonZeroU64};

// ---------------------------------------------------------------------------
// TxnId
// ---------------------------------------------------------------------------

/// Monotonically increasing transaction identifier.
///
/// Drawn from its own id space, disjoint from the timestamp sequence.
/// Allocation is a CAS loop in `snapsafe-mvcc`; ids are strictly increasing
/// and never zero.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[repr(transparent)]
pub struct TxnId(NonZeroU64);

impl TxnId {
    /// Construct a `TxnId` from a nonzero raw value.
    #[inline]
    pub const fn new(raw: u64) -> Option<Self> {
        match NonZeroU64::new(raw) {
            Some(nz) => Some(Self(nz)),
            None => None,
        }
    }

    /// Get the raw u64 value.
    #[inline]
    pub const fn get(self) -> u64 {
        self.0.get()
    }

    /// Return the next transaction id if the id space is not exhausted.
    #[inline]
    pub const fn checked_next(self) -> Option<Self> {
        match self.0.checked_add(1) {
            Some(nz) => Some(Self(nz)),
            None => None,
        }
    }
}

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn#{}", self.get())
    }
}

impl TryFrom<u64> for TxnId {
    type Error = InvalidTxnId;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Self::new(value).ok_or(InvalidTxnId { raw: value })
    }
}

/// Error returned when attempting to construct an out-of-domain `TxnId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidTxnId {
    raw: u64,
}

impl fmt::Display for InvalidTxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid TxnId {} (must be nonzero)", self.raw)
    }
}

impl std::error::Error for InvalidTxnId {}

// ---------------------------------------------------------------------------
// Timestamp
// ---------------------------------------------------------------------------

/// A point in the unified start/commit timestamp order.
///
/// One strictly increasing sequence serves both `start_ts` and `cstamp`;
/// SI visibility (`commit_ts <= start_ts`) requires them to share a total
/// order. `Timestamp::INFINITY` is the `+inf` sentinel used by the SSN
/// successor stamp of a version that has not been overwritten.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[repr(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The bootstrap commit timestamp; precedes every allocated timestamp.
    pub const ZERO: Self = Self(0);

    /// The `+inf` sentinel. Never allocated by the oracle.
    pub const INFINITY: Self = Self(u64::MAX);

    #[inline]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Whether this is the `+inf` sentinel.
    #[inline]
    pub const fn is_infinite(self) -> bool {
        self.0 == u64::MAX
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_infinite() {
            f.write_str("ts#inf")
        } else {
            write!(f, "ts#{}", self.0)
        }
    }
}

// ---------------------------------------------------------------------------
// ItemId / ItemCount
// ---------------------------------------------------------------------------

/// Key of an item in the store: an index in `[0, M)` for a store of `M` items.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[repr(transparent)]
pub struct ItemId(u32);

impl ItemId {
    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// The key as a chain-table index.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "item#{}", self.0)
    }
}

/// Validated number of items in a store. Fixed at construction.
///
/// `ItemCount::new(0)` is `None`: an empty keyspace is a configuration
/// error and is rejected before a store can exist.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[repr(transparent)]
pub struct ItemCount(NonZeroU32);

impl ItemCount {
    #[inline]
    pub const fn new(raw: u32) -> Option<Self> {
        match NonZeroU32::new(raw) {
            Some(nz) => Some(Self(nz)),
            None => None,
        }
    }

    #[inline]
    pub const fn get(self) -> u32 {
        self.0.get()
    }

    /// Whether `key` addresses an item of a store this large.
    #[inline]
    pub const fn contains(self, key: ItemId) -> bool {
        key.get() < self.get()
    }

    /// Iterate over every key of a store this large.
    pub fn keys(self) -> impl Iterator<Item = ItemId> {
        (0..self.get()).map(ItemId::new)
    }
}

impl fmt::Display for ItemCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.get())
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// A frozen view of the store taken at `begin`.
///
/// Visibility is a single comparison: `version.commit_ts <= snapshot.high`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct Snapshot {
    pub high: Timestamp,
}

impl Snapshot {
    #[inline]
    pub const fn new(high: Timestamp) -> Self {
        Self { high }
    }
}

// ---------------------------------------------------------------------------
// TxnStatus
// ---------------------------------------------------------------------------

/// Transaction state machine: `InFlight -> (Committed | Aborted)`.
///
/// Terminal states are final; the manager never resurrects a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum TxnStatus {
    InFlight,
    Committed,
    Aborted,
}

impl TxnStatus {
    #[inline]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::InFlight)
    }
}

impl fmt::Display for TxnStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InFlight => f.write_str("in-flight"),
            Self::Committed => f.write_str("committed"),
            Self::Aborted => f.write_str("aborted"),
        }
    }
}

// ---------------------------------------------------------------------------
// Protocol
// ---------------------------------------------------------------------------

/// Isolation protocol a manager runs. Per-store, chosen at construction.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum Protocol {
    /// Snapshot Isolation with first-committer-wins conflict detection.
    #[default]
    Si,
    /// SI plus the Serial Safety Net certifier: exclusion-window validation
    /// over per-version predecessor/successor stamps, yielding serializable
    /// execution.
    SiSsn,
}

impl Protocol {
    /// Parse from a configuration string (case-insensitive).
    #[must_use]
    pub fn from_name(s: &str) -> Option<Self> {
        let lower = s.trim().to_ascii_lowercase();
        match lower.as_str() {
            "si" => Some(Self::Si),
            "si-ssn" | "si+ssn" | "ssn" => Some(Self::SiSsn),
            _ => None,
        }
    }

    /// Whether the SSN certifier is active.
    #[must_use]
    pub const fn is_ssn(self) -> bool {
        matches!(self, Self::SiSsn)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Si => f.write_str("si"),
            Self::SiSsn => f.write_str("si-ssn"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn txn_id_rejects_zero() {
        assert!(TxnId::new(0).is_none());
        assert_eq!(TxnId::new(7).unwrap().get(), 7);
        assert_eq!(TxnId::try_from(0).unwrap_err().to_string(), "invalid TxnId 0 (must be nonzero)");
    }

    #[test]
    fn txn_id_checked_next_saturates_at_domain_end() {
        let last = TxnId::new(u64::MAX).unwrap();
        assert!(last.checked_next().is_none());
        let mid = TxnId::new(41).unwrap();
        assert_eq!(mid.checked_next().unwrap().get(), 42);
    }

    #[test]
    fn timestamp_ordering_and_sentinel() {
        assert!(Timestamp::ZERO < Timestamp::new(1));
        assert!(Timestamp::new(1) < Timestamp::INFINITY);
        assert!(Timestamp::INFINITY.is_infinite());
        assert!(!Timestamp::new(5).is_infinite());
        assert_eq!(Timestamp::new(3).max(Timestamp::new(9)).get(), 9);
        assert_eq!(Timestamp::INFINITY.to_string(), "ts#inf");
        assert_eq!(Timestamp::new(12).to_string(), "ts#12");
    }

    #[test]
    fn item_count_validates_and_bounds() {
        assert!(ItemCount::new(0).is_none());
        let m = ItemCount::new(4).unwrap();
        assert!(m.contains(ItemId::new(0)));
        assert!(m.contains(ItemId::new(3)));
        assert!(!m.contains(ItemId::new(4)));
        assert_eq!(m.keys().count(), 4);
    }

    #[test]
    fn status_terminality() {
        assert!(!TxnStatus::InFlight.is_terminal());
        assert!(TxnStatus::Committed.is_terminal());
        assert!(TxnStatus::Aborted.is_terminal());
    }

    #[test]
    fn protocol_parse() {
        assert_eq!(Protocol::from_name("si"), Some(Protocol::Si));
        assert_eq!(Protocol::from_name("SI-SSN"), Some(Protocol::SiSsn));
        assert_eq!(Protocol::from_name(" ssn "), Some(Protocol::SiSsn));
        assert_eq!(Protocol::from_name("serializable"), None);
        assert_eq!(Protocol::SiSsn.to_string(), "si-ssn");
        assert!(Protocol::SiSsn.is_ssn());
        assert!(!Protocol::Si.is_ssn());
    }
}

//! Timestamp type used throughout the protocol.
//!
//! Timestamps are Unix epoch seconds (UTC). The engine itself never reads
//! the system clock — every operation takes an explicit `now` — but hosts
//! can use [`Timestamp::now`] to supply it.

use crate::params::WEEK_SECS;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// A Unix timestamp in seconds since epoch (UTC).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The epoch (time zero).
    pub const EPOCH: Self = Self(0);

    pub fn new(secs: u64) -> Self {
        Self(secs)
    }

    /// Get the current system time as a `Timestamp`.
    pub fn now() -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before Unix epoch")
            .as_secs();
        Self(secs)
    }

    pub fn as_secs(&self) -> u64 {
        self.0
    }

    /// Seconds elapsed since this timestamp (relative to `now`).
    pub fn elapsed_since(&self, now: Timestamp) -> u64 {
        now.0.saturating_sub(self.0)
    }

    /// This timestamp rounded down to its week boundary.
    pub fn epoch_align(&self) -> Timestamp {
        Self(self.0 / WEEK_SECS * WEEK_SECS)
    }

    /// Whether this timestamp lies exactly on a week boundary.
    pub fn is_epoch_aligned(&self) -> bool {
        self.0 % WEEK_SECS == 0
    }

    /// This timestamp advanced by `secs` seconds (saturating).
    pub fn add_secs(&self, secs: u64) -> Timestamp {
        Self(self.0.saturating_add(secs))
    }

    /// Seconds remaining until `other`, or zero if `other` is in the past.
    pub fn until(&self, other: Timestamp) -> u64 {
        other.0.saturating_sub(self.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_align_rounds_down() {
        let t = Timestamp::new(WEEK_SECS * 3 + 12_345);
        assert_eq!(t.epoch_align(), Timestamp::new(WEEK_SECS * 3));
    }

    #[test]
    fn epoch_align_is_identity_on_boundary() {
        let t = Timestamp::new(WEEK_SECS * 7);
        assert_eq!(t.epoch_align(), t);
        assert!(t.is_epoch_aligned());
    }

    #[test]
    fn unaligned_timestamp_detected() {
        assert!(!Timestamp::new(WEEK_SECS + 1).is_epoch_aligned());
        assert!(Timestamp::EPOCH.is_epoch_aligned());
    }

    #[test]
    fn until_is_zero_for_past() {
        let t = Timestamp::new(5000);
        assert_eq!(t.until(Timestamp::new(7000)), 2000);
        assert_eq!(t.until(Timestamp::new(3000)), 0);
    }

    #[test]
    fn elapsed_since_saturates() {
        let t = Timestamp::new(5000);
        assert_eq!(t.elapsed_since(Timestamp::new(5500)), 500);
        assert_eq!(t.elapsed_since(Timestamp::new(100)), 0);
    }
}

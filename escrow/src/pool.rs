//! Per-pool configuration and state.

use std::collections::HashMap;

use alloy_primitives::{I256, U256};
use ebb_types::Timestamp;
use serde::{Deserialize, Serialize};

use crate::point::Point;

/// Immutable per-pool configuration, set once by [`configure`].
///
/// [`configure`]: crate::engine::EscrowEngine::configure
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Weight multiplier applied to locked balances (fixed-point, at least
    /// [`SCALE`](crate::point::SCALE) — no down-weighting).
    pub multiplier: U256,
    /// Longest allowed lock duration in seconds.
    pub max_lock_secs: u64,
}

/// Everything the engine tracks for one pool: configuration, the aggregate
/// decaying point, and the slope-change schedule.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PoolState {
    /// `None` until the pool is configured.
    pub config: Option<PoolConfig>,
    /// Aggregate decaying point, created on first use of the pool.
    pub global: Option<Point>,
    /// Scheduled slope deltas keyed by future epoch-aligned timestamps.
    /// Entries are negative: they are added to the aggregate slope when the
    /// rolling pass crosses their epoch, cancelling the contribution of
    /// locks that unlock there. Crossed entries are never read again — the
    /// rolling cursor only moves forward.
    pub slope_changes: HashMap<Timestamp, I256>,
}

impl PoolState {
    /// The scheduled slope delta at `at`, zero if none.
    pub fn scheduled_delta(&self, at: Timestamp) -> I256 {
        self.slope_changes.get(&at).copied().unwrap_or(I256::ZERO)
    }

    /// Record the slope delta taking effect at `at`.
    pub fn schedule_delta(&mut self, at: Timestamp, delta: I256) {
        self.slope_changes.insert(at, delta);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::point::secs;

    #[test]
    fn missing_delta_reads_as_zero() {
        let pool = PoolState::default();
        assert_eq!(pool.scheduled_delta(Timestamp::new(604_800)), I256::ZERO);
    }

    #[test]
    fn recorded_delta_reads_back() {
        let mut pool = PoolState::default();
        let at = Timestamp::new(604_800);
        let delta = I256::ZERO.checked_sub(secs(42)).unwrap();
        pool.schedule_delta(at, delta);
        assert_eq!(pool.scheduled_delta(at), delta);
        assert_eq!(pool.scheduled_delta(Timestamp::new(1_209_600)), I256::ZERO);
    }

    #[test]
    fn fresh_pool_is_unconfigured() {
        let pool = PoolState::default();
        assert!(pool.config.is_none());
        assert!(pool.global.is_none());
    }
}

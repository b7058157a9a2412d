//! Decaying points and lock inputs.
//!
//! A [`Point`] is a linearly decaying quantity: `bias` units at
//! `last_update`, falling by `slope` units per second, floored at zero.
//! Both per-lock weight and the per-pool aggregate are points; the only
//! difference is how their slope is maintained over time.

use alloy_primitives::{I256, U256};
use ebb_types::{Timestamp, SCALE_RAW};
use serde::{Deserialize, Serialize};

use crate::error::EscrowError;

/// The fixed-point representation of 1.0, widened to 256 bits.
pub const SCALE: U256 = U256::from_limbs([SCALE_RAW, 0, 0, 0]);

/// Widen a second count into signed 256-bit space.
pub(crate) fn secs(n: u64) -> I256 {
    I256::from_raw(U256::from(n))
}

/// A linearly decaying quantity.
///
/// At any time `t >= last_update` the instantaneous value is
/// `max(0, bias - slope * (t - last_update))`. `bias` and `slope` are
/// never negative once persisted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    /// Magnitude at `last_update`.
    pub bias: I256,
    /// Per-second decay rate.
    pub slope: I256,
    /// Original duration in seconds of the lock that produced this slope.
    /// Fixed when the point is first populated and carried forward
    /// unchanged by later balance changes and extensions.
    pub period_secs: u64,
    /// When `bias` was last materialized.
    pub last_update: Timestamp,
}

impl Point {
    /// A zero point anchored at `at`.
    pub fn zero_at(at: Timestamp) -> Self {
        Self {
            bias: I256::ZERO,
            slope: I256::ZERO,
            period_secs: 0,
            last_update: at,
        }
    }

    /// Instantaneous value at `now`, floored at zero.
    pub fn value_at(&self, now: Timestamp) -> Result<U256, EscrowError> {
        let dt = secs(self.last_update.elapsed_since(now));
        let decayed = self.slope.checked_mul(dt).ok_or(EscrowError::Overflow)?;
        let value = self.bias.checked_sub(decayed).ok_or(EscrowError::Overflow)?;
        Ok(if value.is_negative() {
            U256::ZERO
        } else {
            value.into_raw()
        })
    }
}

/// A balance committed until a future unlock time.
///
/// Ephemeral input supplied by the lock-owning collaborator on each
/// mutation; only its effect is persisted, as bias/slope in a [`Point`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Lock {
    pub balance: U256,
    pub unlock_time: Timestamp,
}

impl Lock {
    /// The empty lock, used as the "old" side of a fresh creation.
    pub const NONE: Self = Self {
        balance: U256::ZERO,
        unlock_time: Timestamp::EPOCH,
    };

    pub fn new(balance: U256, unlock_time: Timestamp) -> Self {
        Self {
            balance,
            unlock_time,
        }
    }

    /// Whether this lock contributes weight at `now`.
    pub fn is_live(&self, now: Timestamp) -> bool {
        self.unlock_time > now && !self.balance.is_zero()
    }
}

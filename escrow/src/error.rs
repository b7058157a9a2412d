//! Escrow-specific errors.

use alloy_primitives::U256;
use ebb_types::{AccountId, LockId, PoolId, Timestamp};
use thiserror::Error;

/// All failures are local, synchronous, and non-retryable by the engine
/// itself; callers re-derive corrected arguments and re-invoke.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EscrowError {
    #[error("caller {0} is not authorized for this operation")]
    Unauthorized(AccountId),

    #[error("{0} is already configured")]
    AlreadyConfigured(PoolId),

    #[error("multiplier {multiplier} is below the unit scale")]
    MultiplierTooLow { multiplier: U256 },

    #[error("{0} is not configured")]
    PoolNotConfigured(PoolId),

    #[error("lock balance must be non-zero")]
    ZeroLock,

    #[error("unlock time {0} is not aligned to a week boundary")]
    UnalignedUnlockTime(Timestamp),

    #[error("unlock time {unlock} is too soon (minimum {min})")]
    LockTooShort { unlock: Timestamp, min: Timestamp },

    #[error("unlock time {unlock} exceeds the pool maximum {max}")]
    LockTooLong { unlock: Timestamp, max: Timestamp },

    #[error("unlock time may only be extended, not shortened")]
    OnlyExtensions,

    #[error("no lock found for {user}/{lock}")]
    NoLockFound { user: AccountId, lock: LockId },

    #[error("lock unlock time {0} has already passed")]
    LockExpired(Timestamp),

    #[error("arithmetic overflow in voting-power computation")]
    Overflow,
}

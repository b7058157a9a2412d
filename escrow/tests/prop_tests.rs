use proptest::prelude::*;

use alloy_primitives::{I256, U256};
use ebb_escrow::{EscrowEngine, EscrowError, SCALE};
use ebb_types::{AccountId, PoolId, Timestamp, WEEK_SECS};

const MAX_LOCK: u64 = 52 * WEEK_SECS;

fn custodian() -> AccountId {
    AccountId::new("custodian")
}

fn holder(n: usize) -> AccountId {
    AccountId::new(format!("holder-{n}"))
}

fn units(n: u64) -> U256 {
    U256::from(n) * SCALE
}

/// Engine with one pool configured at 1.0x multiplier, 52-week maximum,
/// anchored at an epoch-aligned start time.
fn configured(pool: PoolId) -> (EscrowEngine, Timestamp) {
    let mut engine = EscrowEngine::new();
    engine
        .configure(&custodian(), pool, SCALE, MAX_LOCK)
        .unwrap();
    (engine, Timestamp::new(100 * WEEK_SECS))
}

proptest! {
    /// With no further mutations, a lock's power never increases with
    /// time and is exactly zero at and after its unlock time.
    #[test]
    fn power_decays_monotonically(
        balance in 1u64..1_000_000,
        weeks in 1u64..=52,
        e1 in 0u64..=60 * WEEK_SECS,
        e2 in 0u64..=60 * WEEK_SECS,
    ) {
        let pool = PoolId::new(1);
        let (mut engine, t0) = configured(pool);
        let unlock = t0.add_secs(weeks * WEEK_SECS);
        let id = engine
            .note_lock_creation(&custodian(), &holder(0), pool, units(balance), unlock, t0)
            .unwrap();

        let (lo, hi) = if e1 <= e2 { (e1, e2) } else { (e2, e1) };
        let p_lo = engine.voting_power(&holder(0), id, t0.add_secs(lo)).unwrap();
        let p_hi = engine.voting_power(&holder(0), id, t0.add_secs(hi)).unwrap();
        prop_assert!(p_hi <= p_lo, "power grew: {p_lo} -> {p_hi}");

        let at_unlock = engine.voting_power(&holder(0), id, unlock).unwrap();
        prop_assert_eq!(at_unlock, U256::ZERO);
    }

    /// After a checkpoint, the aggregate equals the brute-force sum of
    /// every lock's independently decayed power.
    #[test]
    fn aggregate_conserves_the_lock_sum(
        locks in prop::collection::vec((1u64..1_000_000, 1u64..=52), 1..4),
        query_weeks in 0u64..=52,
        query_offset in 0u64..WEEK_SECS,
    ) {
        let pool = PoolId::new(1);
        let (mut engine, t0) = configured(pool);
        let mut ids = Vec::new();
        for (i, (balance, weeks)) in locks.iter().enumerate() {
            let unlock = t0.add_secs(weeks * WEEK_SECS);
            let id = engine
                .note_lock_creation(&custodian(), &holder(i), pool, units(*balance), unlock, t0)
                .unwrap();
            ids.push(id);
        }

        let at = t0.add_secs(query_weeks * WEEK_SECS + query_offset);
        engine.checkpoint(pool, at).unwrap();

        let mut sum = U256::ZERO;
        for (i, id) in ids.iter().enumerate() {
            sum += engine.voting_power(&holder(i), *id, at).unwrap();
        }
        prop_assert_eq!(engine.global_voting_power(pool, at).unwrap(), sum);
    }

    /// Checkpointing twice at the same timestamp is a no-op the second
    /// time.
    #[test]
    fn checkpoint_is_idempotent(
        balance in 1u64..1_000_000,
        weeks in 1u64..=52,
        elapsed in 0u64..=60 * WEEK_SECS,
    ) {
        let pool = PoolId::new(1);
        let (mut engine, t0) = configured(pool);
        let unlock = t0.add_secs(weeks * WEEK_SECS);
        engine
            .note_lock_creation(&custodian(), &holder(0), pool, units(balance), unlock, t0)
            .unwrap();

        let at = t0.add_secs(elapsed);
        engine.checkpoint(pool, at).unwrap();
        let first = engine.global_point(pool).unwrap();
        engine.checkpoint(pool, at).unwrap();
        let second = engine.global_point(pool).unwrap();
        prop_assert_eq!(first, second);
    }

    /// Rolling past a lock's unlock epoch consumes its scheduled slope
    /// delta exactly: nothing of the lock remains in the aggregate.
    #[test]
    fn crossing_the_unlock_epoch_removes_the_lock(
        balance in 1u64..1_000_000,
        weeks in 1u64..=52,
        after_weeks in 0u64..=10,
    ) {
        let pool = PoolId::new(1);
        let (mut engine, t0) = configured(pool);
        let unlock = t0.add_secs(weeks * WEEK_SECS);
        engine
            .note_lock_creation(&custodian(), &holder(0), pool, units(balance), unlock, t0)
            .unwrap();

        let at = unlock.add_secs(after_weeks * WEEK_SECS);
        engine.checkpoint(pool, at).unwrap();
        let global = engine.global_point(pool).unwrap();
        prop_assert_eq!(global.slope, I256::ZERO);
        prop_assert_eq!(global.bias, I256::ZERO);
    }

    /// Stored bias and slope are never negative, whatever sequence of
    /// creation, re-noting, and checkpointing runs.
    #[test]
    fn stored_points_are_never_negative(
        balance in 1u64..1_000_000,
        new_balance in 1u64..1_000_000,
        weeks in 2u64..=52,
        change_weeks in 1u64..=51,
        checkpoint_weeks in 0u64..=60,
    ) {
        let pool = PoolId::new(1);
        let (mut engine, t0) = configured(pool);
        let unlock = t0.add_secs(weeks * WEEK_SECS);
        let id = engine
            .note_lock_creation(&custodian(), &holder(0), pool, units(balance), unlock, t0)
            .unwrap();

        let change_at = t0.add_secs(change_weeks.min(weeks - 1) * WEEK_SECS);
        engine
            .note_lock_balance_change(
                &custodian(),
                &holder(0),
                pool,
                id,
                units(balance),
                units(new_balance),
                unlock,
                change_at,
            )
            .unwrap();

        engine.checkpoint(pool, t0.add_secs(checkpoint_weeks * WEEK_SECS)).unwrap();

        let global = engine.global_point(pool).unwrap();
        prop_assert!(!global.bias.is_negative());
        prop_assert!(!global.slope.is_negative());
        let user = engine.user_point(&holder(0), id).unwrap();
        prop_assert!(!user.bias.is_negative());
        prop_assert!(!user.slope.is_negative());
    }

    /// A share is a fixed-point fraction: never above 1.0 once the
    /// aggregate is freshly checkpointed.
    #[test]
    fn shares_never_exceed_unity(
        balances in prop::collection::vec(1u64..1_000_000, 1..4),
        weeks in 1u64..=52,
        query_weeks in 0u64..=52,
    ) {
        let pool = PoolId::new(1);
        let (mut engine, t0) = configured(pool);
        let unlock = t0.add_secs(weeks * WEEK_SECS);
        let mut ids = Vec::new();
        for (i, balance) in balances.iter().enumerate() {
            let id = engine
                .note_lock_creation(&custodian(), &holder(i), pool, units(*balance), unlock, t0)
                .unwrap();
            ids.push(id);
        }

        let at = t0.add_secs(query_weeks * WEEK_SECS);
        engine.checkpoint(pool, at).unwrap();
        for (i, id) in ids.iter().enumerate() {
            let share = engine.voting_power_share(&holder(i), pool, *id, at).unwrap();
            prop_assert!(share <= SCALE, "share {share} above unity");
        }
    }
}

#[test]
fn expired_mutation_error_is_stable() {
    let pool = PoolId::new(1);
    let (mut engine, t0) = configured(pool);
    let unlock = t0.add_secs(WEEK_SECS);
    let id = engine
        .note_lock_creation(&custodian(), &holder(0), pool, units(5), unlock, t0)
        .unwrap();
    let err = engine
        .note_lock_balance_change(
            &custodian(),
            &holder(0),
            pool,
            id,
            units(5),
            units(6),
            unlock,
            unlock,
        )
        .unwrap_err();
    assert_eq!(err, EscrowError::LockExpired(unlock));
}

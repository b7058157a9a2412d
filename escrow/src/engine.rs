//! The decay checkpoint engine and its query layer.
//!
//! One engine instance tracks every pool. Each pool keeps an aggregate
//! [`Point`] equal, at all times, to the sum of the live per-lock points —
//! maintained without iterating locks. When a lock is created or changed,
//! the engine schedules a slope delta at the lock's unlock epoch; when the
//! aggregate is rolled forward, it consumes the deltas of every crossed
//! epoch, so rolling costs O(weeks elapsed) and queries cost O(1).
//!
//! Mutating operations are atomic: every precondition and every fallible
//! computation runs before the first state write. The host must serialize
//! mutations to the same pool; reads may run on snapshots.

use std::collections::HashMap;

use alloy_primitives::{I256, U256};
use ebb_types::{AccountId, LockId, PoolId, Timestamp, MAX_CHECKPOINT_WEEKS, WEEK_SECS};
use ebb_utils::format_duration;
use serde::{Deserialize, Serialize};

use crate::auth::{AccessPolicy, OpenPolicy};
use crate::error::EscrowError;
use crate::point::{secs, Lock, Point, SCALE};
use crate::pool::{PoolConfig, PoolState};

/// The escrow engine — pools, locks, and their decaying voting weight.
pub struct EscrowEngine {
    /// Authorization for `configure` and the lock-noting mutators.
    policy: Box<dyn AccessPolicy>,
    /// Per-pool configuration, aggregate point, and slope-change schedule.
    pools: HashMap<PoolId, PoolState>,
    /// One decaying point per (user, lock). Never deleted: an expired
    /// point decays to zero and remains queryable.
    user_points: HashMap<(AccountId, LockId), Point>,
    /// Next lock id to allocate. Starts at 1, never reused.
    next_lock_id: u64,
}

impl EscrowEngine {
    /// Create an engine with the allow-all policy.
    pub fn new() -> Self {
        Self::with_policy(Box::new(OpenPolicy))
    }

    /// Create an engine with a host-supplied access policy.
    pub fn with_policy(policy: Box<dyn AccessPolicy>) -> Self {
        Self {
            policy,
            pools: HashMap::new(),
            user_points: HashMap::new(),
            next_lock_id: 1,
        }
    }

    // ── Pool registry ────────────────────────────────────────────────────

    /// One-time pool setup. Configuration is immutable once stored.
    pub fn configure(
        &mut self,
        caller: &AccountId,
        pool_id: PoolId,
        multiplier: U256,
        max_lock_secs: u64,
    ) -> Result<(), EscrowError> {
        if !self.policy.is_authorized(caller) {
            return Err(EscrowError::Unauthorized(caller.clone()));
        }
        if self
            .pools
            .get(&pool_id)
            .is_some_and(|p| p.config.is_some())
        {
            return Err(EscrowError::AlreadyConfigured(pool_id));
        }
        if multiplier < SCALE {
            return Err(EscrowError::MultiplierTooLow { multiplier });
        }
        self.pools.entry(pool_id).or_default().config = Some(PoolConfig {
            multiplier,
            max_lock_secs,
        });
        tracing::debug!(
            pool = %pool_id,
            %multiplier,
            max_lock = %format_duration(max_lock_secs),
            "pool configured"
        );
        Ok(())
    }

    // ── Checkpoint engine ────────────────────────────────────────────────

    /// Advance the pool's aggregate point to `now` with no lock change.
    ///
    /// Open to any caller: freshening the aggregate mutates no lock. A pool
    /// must be checkpointed (by this call or by any mutation) at least once
    /// per [`MAX_CHECKPOINT_WEEKS`]; a single pass does not consume
    /// scheduled deltas further out than that window.
    pub fn checkpoint(&mut self, pool_id: PoolId, now: Timestamp) -> Result<(), EscrowError> {
        let pool = self.pools.entry(pool_id).or_default();
        let rolled = Self::roll_global(pool, now)?;
        pool.global = Some(rolled);
        tracing::trace!(pool = %pool_id, %now, "checkpoint");
        Ok(())
    }

    /// Roll every pool's aggregate point to `now`.
    ///
    /// For hosts that poll [`global_voting_power`](Self::global_voting_power)
    /// on a timer and want the cheap read path kept exact.
    pub fn checkpoint_all(&mut self, now: Timestamp) -> Result<(), EscrowError> {
        for pool in self.pools.values_mut() {
            let rolled = Self::roll_global(pool, now)?;
            pool.global = Some(rolled);
        }
        Ok(())
    }

    /// Record a freshly created lock and return its id.
    pub fn note_lock_creation(
        &mut self,
        caller: &AccountId,
        user: &AccountId,
        pool_id: PoolId,
        balance: U256,
        unlock_time: Timestamp,
        now: Timestamp,
    ) -> Result<LockId, EscrowError> {
        if !self.policy.is_authorized(caller) {
            return Err(EscrowError::Unauthorized(caller.clone()));
        }
        let config = self.pool_config(pool_id)?;
        if !unlock_time.is_epoch_aligned() {
            return Err(EscrowError::UnalignedUnlockTime(unlock_time));
        }
        let min = now.add_secs(WEEK_SECS);
        if unlock_time < min {
            return Err(EscrowError::LockTooShort {
                unlock: unlock_time,
                min,
            });
        }
        let max = now.add_secs(config.max_lock_secs);
        if unlock_time > max {
            return Err(EscrowError::LockTooLong {
                unlock: unlock_time,
                max,
            });
        }
        if balance.is_zero() {
            return Err(EscrowError::ZeroLock);
        }

        let next = self
            .next_lock_id
            .checked_add(1)
            .ok_or(EscrowError::Overflow)?;
        let lock_id = LockId::new(self.next_lock_id);
        self.apply_lock_change(
            user,
            pool_id,
            lock_id,
            Lock::NONE,
            Lock::new(balance, unlock_time),
            now,
        )?;
        self.next_lock_id = next;
        tracing::debug!(
            pool = %pool_id,
            user = %user,
            lock = %lock_id,
            duration = %format_duration(now.until(unlock_time)),
            "lock created"
        );
        Ok(lock_id)
    }

    /// Record a balance change on an existing lock; the unlock time is
    /// unchanged.
    pub fn note_lock_balance_change(
        &mut self,
        caller: &AccountId,
        user: &AccountId,
        pool_id: PoolId,
        lock_id: LockId,
        old_balance: U256,
        new_balance: U256,
        unlock_time: Timestamp,
        now: Timestamp,
    ) -> Result<(), EscrowError> {
        if !self.policy.is_authorized(caller) {
            return Err(EscrowError::Unauthorized(caller.clone()));
        }
        self.pool_config(pool_id)?;
        if !self
            .user_points
            .contains_key(&(user.clone(), lock_id))
        {
            return Err(EscrowError::NoLockFound {
                user: user.clone(),
                lock: lock_id,
            });
        }
        if unlock_time <= now {
            return Err(EscrowError::LockExpired(unlock_time));
        }
        self.apply_lock_change(
            user,
            pool_id,
            lock_id,
            Lock::new(old_balance, unlock_time),
            Lock::new(new_balance, unlock_time),
            now,
        )
    }

    /// Record an extension of a lock's unlock time; the balance is
    /// unchanged. Shortening is forbidden.
    pub fn note_lock_extension(
        &mut self,
        caller: &AccountId,
        user: &AccountId,
        pool_id: PoolId,
        lock_id: LockId,
        balance: U256,
        old_unlock_time: Timestamp,
        new_unlock_time: Timestamp,
        now: Timestamp,
    ) -> Result<(), EscrowError> {
        if !self.policy.is_authorized(caller) {
            return Err(EscrowError::Unauthorized(caller.clone()));
        }
        let config = self.pool_config(pool_id)?;
        if !new_unlock_time.is_epoch_aligned() {
            return Err(EscrowError::UnalignedUnlockTime(new_unlock_time));
        }
        if new_unlock_time < now {
            return Err(EscrowError::LockTooShort {
                unlock: new_unlock_time,
                min: now,
            });
        }
        if new_unlock_time < old_unlock_time {
            return Err(EscrowError::OnlyExtensions);
        }
        let max = now.add_secs(config.max_lock_secs);
        if new_unlock_time > max {
            return Err(EscrowError::LockTooLong {
                unlock: new_unlock_time,
                max,
            });
        }
        self.apply_lock_change(
            user,
            pool_id,
            lock_id,
            Lock::new(balance, old_unlock_time),
            Lock::new(balance, new_unlock_time),
            now,
        )?;
        tracing::debug!(
            pool = %pool_id,
            user = %user,
            lock = %lock_id,
            remaining = %format_duration(now.until(new_unlock_time)),
            "lock extended"
        );
        Ok(())
    }

    /// The rolling + apply routine shared by every mutator.
    ///
    /// Rolls the pool's aggregate to `now`, folds in the difference between
    /// `old_lock` and `new_lock`, updates the slope-change schedule, and
    /// persists the new user point. All fallible arithmetic happens before
    /// the first write.
    fn apply_lock_change(
        &mut self,
        user: &AccountId,
        pool_id: PoolId,
        lock_id: LockId,
        old_lock: Lock,
        new_lock: Lock,
        now: Timestamp,
    ) -> Result<(), EscrowError> {
        let key = (user.clone(), lock_id);
        let stored_period = self
            .user_points
            .get(&key)
            .map(|p| p.period_secs)
            .unwrap_or(0);
        let pool = self
            .pools
            .get_mut(&pool_id)
            .ok_or(EscrowError::PoolNotConfigured(pool_id))?;
        let config = pool.config.ok_or(EscrowError::PoolNotConfigured(pool_id))?;

        let point_old = Self::lock_point(&old_lock, now, &config, stored_period)?;
        let point_new = Self::lock_point(&new_lock, now, &config, stored_period)?;

        let d_slope_old = pool.scheduled_delta(old_lock.unlock_time);
        let d_slope_new = if new_lock.unlock_time == old_lock.unlock_time {
            d_slope_old
        } else {
            pool.scheduled_delta(new_lock.unlock_time)
        };

        let mut global = Self::roll_global(pool, now)?;

        let slope_delta = point_new
            .slope
            .checked_sub(point_old.slope)
            .ok_or(EscrowError::Overflow)?;
        let bias_delta = point_new
            .bias
            .checked_sub(point_old.bias)
            .ok_or(EscrowError::Overflow)?;
        global.slope = global
            .slope
            .checked_add(slope_delta)
            .ok_or(EscrowError::Overflow)?;
        global.bias = global
            .bias
            .checked_add(bias_delta)
            .ok_or(EscrowError::Overflow)?;
        if global.slope.is_negative() {
            global.slope = I256::ZERO;
        }
        if global.bias.is_negative() {
            global.bias = I256::ZERO;
        }

        // The old unlock epoch must stop cancelling the old slope; when the
        // unlock moved, the new epoch must start cancelling the new one.
        let mut old_entry = None;
        if old_lock.unlock_time > now {
            let mut delta = d_slope_old
                .checked_add(point_old.slope)
                .ok_or(EscrowError::Overflow)?;
            if new_lock.unlock_time == old_lock.unlock_time {
                delta = delta
                    .checked_sub(point_new.slope)
                    .ok_or(EscrowError::Overflow)?;
            }
            old_entry = Some((old_lock.unlock_time, delta));
        }
        let mut new_entry = None;
        if new_lock.unlock_time > now && new_lock.unlock_time > old_lock.unlock_time {
            let delta = d_slope_new
                .checked_sub(point_new.slope)
                .ok_or(EscrowError::Overflow)?;
            new_entry = Some((new_lock.unlock_time, delta));
        }

        // Commit — infallible from here on.
        pool.global = Some(global);
        if let Some((at, delta)) = old_entry {
            pool.schedule_delta(at, delta);
        }
        if let Some((at, delta)) = new_entry {
            pool.schedule_delta(at, delta);
        }
        self.user_points.insert(key, point_new);
        Ok(())
    }

    /// Compute the decaying point induced by `lock` at `now`.
    ///
    /// `stored_period` is the period of the existing user point (zero for a
    /// fresh lock); a non-zero period is carried forward unchanged even
    /// though the remaining duration has shrunk — the weighting model fixes
    /// it at creation.
    fn lock_point(
        lock: &Lock,
        now: Timestamp,
        config: &PoolConfig,
        stored_period: u64,
    ) -> Result<Point, EscrowError> {
        let period = if stored_period != 0 {
            stored_period
        } else {
            now.until(lock.unlock_time)
        };
        let mut point = Point::zero_at(now);
        point.period_secs = period;
        if lock.is_live(now) {
            let max_lock = U256::from(config.max_lock_secs);
            let raw_slope = lock
                .balance
                .checked_div(max_lock)
                .ok_or(EscrowError::Overflow)?;
            let weighted = config
                .multiplier
                .checked_mul(U256::from(period))
                .ok_or(EscrowError::Overflow)?;
            let slope_raw = raw_slope
                .checked_mul(weighted)
                .ok_or(EscrowError::Overflow)?
                .checked_div(max_lock)
                .ok_or(EscrowError::Overflow)?;
            let slope = I256::try_from(slope_raw).map_err(|_| EscrowError::Overflow)?;
            let remaining = secs(now.until(lock.unlock_time));
            point.slope = slope;
            point.bias = slope.checked_mul(remaining).ok_or(EscrowError::Overflow)?;
        }
        Ok(point)
    }

    /// Roll a pool's aggregate point forward to `now` in week-sized steps,
    /// consuming scheduled slope deltas at every crossed epoch.
    ///
    /// Bounded by [`MAX_CHECKPOINT_WEEKS`]; beyond that window a single
    /// pass leaves deltas unconsumed and stamps the point at `now` anyway,
    /// which is why pools must be checkpointed within the bound.
    fn roll_global(pool: &PoolState, now: Timestamp) -> Result<Point, EscrowError> {
        let mut point = pool.global.unwrap_or_else(|| Point::zero_at(now));
        let mut last = point.last_update;
        let mut cursor = last.epoch_align();
        for _ in 0..MAX_CHECKPOINT_WEEKS {
            cursor = cursor.add_secs(WEEK_SECS);
            let mut delta = I256::ZERO;
            if cursor > now {
                cursor = now;
            } else {
                delta = pool.scheduled_delta(cursor);
            }
            let dt = secs(last.until(cursor));
            let decayed = point.slope.checked_mul(dt).ok_or(EscrowError::Overflow)?;
            point.bias = point
                .bias
                .checked_sub(decayed)
                .ok_or(EscrowError::Overflow)?;
            point.slope = point
                .slope
                .checked_add(delta)
                .ok_or(EscrowError::Overflow)?;
            if point.bias.is_negative() {
                point.bias = I256::ZERO;
            }
            if point.slope.is_negative() {
                point.slope = I256::ZERO;
            }
            last = cursor;
            point.last_update = cursor;
            if cursor == now {
                break;
            }
        }
        point.last_update = now;
        Ok(point)
    }

    fn pool_config(&self, pool_id: PoolId) -> Result<PoolConfig, EscrowError> {
        self.pools
            .get(&pool_id)
            .and_then(|p| p.config)
            .ok_or(EscrowError::PoolNotConfigured(pool_id))
    }

    // ── Query layer ──────────────────────────────────────────────────────

    /// Current voting power of a single lock.
    pub fn voting_power(
        &self,
        user: &AccountId,
        lock_id: LockId,
        now: Timestamp,
    ) -> Result<U256, EscrowError> {
        let point = self
            .user_points
            .get(&(user.clone(), lock_id))
            .ok_or_else(|| EscrowError::NoLockFound {
                user: user.clone(),
                lock: lock_id,
            })?;
        point.value_at(now)
    }

    /// Current aggregate voting power of a pool.
    ///
    /// Decays the last persisted aggregate linearly; slope changes
    /// scheduled between the last checkpoint and `now` are not consumed by
    /// this read. Call [`checkpoint`](Self::checkpoint) first when an exact
    /// aggregate is required for a stale pool.
    pub fn global_voting_power(
        &self,
        pool_id: PoolId,
        now: Timestamp,
    ) -> Result<U256, EscrowError> {
        match self.pools.get(&pool_id).and_then(|p| p.global.as_ref()) {
            Some(point) => point.value_at(now),
            None => Ok(U256::ZERO),
        }
    }

    /// Fraction of the pool's aggregate held by one lock, fixed-point
    /// scaled by [`SCALE`]. Zero when the aggregate is zero.
    pub fn voting_power_share(
        &self,
        user: &AccountId,
        pool_id: PoolId,
        lock_id: LockId,
        now: Timestamp,
    ) -> Result<U256, EscrowError> {
        let total = self.global_voting_power(pool_id, now)?;
        let power = self.voting_power(user, lock_id, now)?;
        Self::share_of(power, total)
    }

    /// Batched variant of [`voting_power_share`](Self::voting_power_share):
    /// the aggregate is decayed once for the whole batch.
    pub fn voting_power_shares(
        &self,
        user: &AccountId,
        pool_id: PoolId,
        lock_ids: &[LockId],
        now: Timestamp,
    ) -> Result<Vec<U256>, EscrowError> {
        let total = self.global_voting_power(pool_id, now)?;
        lock_ids
            .iter()
            .map(|&lock_id| {
                let power = self.voting_power(user, lock_id, now)?;
                Self::share_of(power, total)
            })
            .collect()
    }

    fn share_of(power: U256, total: U256) -> Result<U256, EscrowError> {
        if total.is_zero() {
            return Ok(U256::ZERO);
        }
        power
            .checked_mul(SCALE)
            .ok_or(EscrowError::Overflow)?
            .checked_div(total)
            .ok_or(EscrowError::Overflow)
    }

    /// Whether the pool has been configured.
    pub fn is_open_pool(&self, pool_id: PoolId) -> bool {
        self.pools
            .get(&pool_id)
            .is_some_and(|p| p.config.is_some())
    }

    /// Whether a point was ever noted for `(user, lock_id)`.
    pub fn is_noted(&self, user: &AccountId, lock_id: LockId) -> bool {
        self.user_points.contains_key(&(user.clone(), lock_id))
    }

    /// The pool's maximum lock duration in seconds.
    pub fn max_lock_duration(&self, pool_id: PoolId) -> Result<u64, EscrowError> {
        Ok(self.pool_config(pool_id)?.max_lock_secs)
    }

    /// The pool's weight multiplier.
    pub fn multiplier(&self, pool_id: PoolId) -> Result<U256, EscrowError> {
        Ok(self.pool_config(pool_id)?.multiplier)
    }

    /// The last persisted aggregate point, if the pool was ever touched.
    pub fn global_point(&self, pool_id: PoolId) -> Option<Point> {
        self.pools.get(&pool_id).and_then(|p| p.global)
    }

    /// The stored user point, if ever noted.
    pub fn user_point(&self, user: &AccountId, lock_id: LockId) -> Option<Point> {
        self.user_points.get(&(user.clone(), lock_id)).copied()
    }

    /// The week boundary at or before `now`.
    pub fn epoch_time(&self, now: Timestamp) -> Timestamp {
        now.epoch_align()
    }
}

impl Default for EscrowEngine {
    fn default() -> Self {
        Self::new()
    }
}

// ── Snapshot persistence ─────────────────────────────────────────────────

/// Serializable mirror of the engine's keyed state. The access policy is
/// host-side and not part of the snapshot.
#[derive(Default, Serialize, Deserialize)]
struct EngineSnapshot {
    pools: HashMap<PoolId, PoolState>,
    user_points: HashMap<(AccountId, LockId), Point>,
    next_lock_id: u64,
}

impl EscrowEngine {
    /// Serialize all engine state to bytes for host-side persistence.
    pub fn save_state(&self) -> Vec<u8> {
        let snapshot = EngineSnapshot {
            pools: self.pools.clone(),
            user_points: self.user_points.clone(),
            next_lock_id: self.next_lock_id,
        };
        bincode::serialize(&snapshot).unwrap_or_default()
    }

    /// Restore an engine from bytes produced by [`save_state`].
    ///
    /// [`save_state`]: Self::save_state
    pub fn load_state(data: &[u8], policy: Box<dyn AccessPolicy>) -> Self {
        let snapshot: EngineSnapshot = bincode::deserialize(data).unwrap_or_default();
        Self {
            policy,
            pools: snapshot.pools,
            user_points: snapshot.user_points,
            next_lock_id: snapshot.next_lock_id.max(1),
        }
    }
}

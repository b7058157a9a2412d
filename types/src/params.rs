//! Protocol constants — the fixed numeric frame every pool operates in.
//!
//! Unlike pool configuration (per-pool multiplier and maximum lock
//! duration), these values are protocol-wide and not tunable at runtime.

/// Fixed-point scale: the raw representation of 1.0.
///
/// Balances, multipliers, biases, and slopes are all integers scaled by
/// this constant. A pool multiplier of exactly `SCALE_RAW` weights locked
/// balances 1:1.
pub const SCALE_RAW: u64 = 1_000_000_000_000_000_000;

/// Width of one epoch in seconds (one week).
///
/// Unlock times are aligned to multiples of this value, and the global
/// aggregate is advanced in steps of this width.
pub const WEEK_SECS: u64 = 7 * 24 * 3600;

/// Hard cap on weekly steps a single checkpoint pass will take.
///
/// Bounds the cost of advancing a pool that has been idle for a long time.
/// Callers must checkpoint every pool at least once per this many weeks;
/// scheduled slope changes further out than the cap window are not consumed
/// by a single capped pass.
pub const MAX_CHECKPOINT_WEEKS: usize = 64;

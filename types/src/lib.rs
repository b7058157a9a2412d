//! Fundamental types for the EBB protocol.
//!
//! This crate defines the core types shared across every other crate in the
//! workspace: account and lock identifiers, timestamps with epoch alignment,
//! and the fixed protocol constants.

pub mod id;
pub mod params;
pub mod time;

pub use id::{AccountId, LockId, PoolId};
pub use params::{MAX_CHECKPOINT_WEEKS, SCALE_RAW, WEEK_SECS};
pub use time::Timestamp;

//! Shared utilities for the EBB protocol.

pub mod logging;
pub mod time;

pub use logging::{init_tracing, try_init_tracing};
pub use time::format_duration;

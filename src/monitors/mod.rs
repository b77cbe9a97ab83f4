//! Pure decision logic, free of I/O
//!
//! - [`live`]: diff of a fresh snapshot against the cached state
//! - [`cadence`]: poll period and batch selection

pub mod cadence;
pub mod live;

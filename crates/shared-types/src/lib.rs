//! # Shared Types Crate
//!
//! Identifiers and records used across the Biolink core crates.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: `UserId`, `Account` and `Role` are defined
//!   once here and re-used by the rollout engine and the detector.
//! - **Injectable Time**: every time-driven component reads the clock through
//!   [`TimeSource`], so tests can pin `now` exactly.

pub mod entities;
pub mod time;

pub use entities::*;
pub use time::{ManualTimeSource, SystemTimeSource, TimeSource};

//! # Domain Module
//!
//! Core domain types for the rollout engine.

pub mod entities;
pub mod errors;
pub mod keys;
pub mod ramp;

pub use entities::*;
pub use errors::*;
pub use ramp::{progress, target_count};

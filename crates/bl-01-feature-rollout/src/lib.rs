//! # BL-01 Feature Rollout
//!
//! Progressive, time-ramped feature experiments.
//!
//! **Architecture:** Hexagonal (Domain + Ports/Adapters)
//!
//! ## Purpose
//!
//! Gate new features behind experiments whose membership grows from a seed
//! group to the whole population over a fixed window:
//! - Admins are always enrolled first
//! - The seed group is topped up with a uniform random sample
//! - A periodic tick grows membership along a linear ramp
//! - Past the window everyone is enrolled, in bounded batches
//!
//! ## Ramp
//!
//! ```text
//!  members
//!    total ┤                        ●━━━━━━━━━━
//!          │                   ╱
//!          │              ╱
//!          │         ╱
//!  initial ┤━━━━━●
//!          └─────┬──────────────────┬─────────▶ time
//!              start               end
//! ```
//!
//! `target = initial + floor(progress × (total − initial))`
//!
//! ## Module Structure
//!
//! ```text
//! bl-01-feature-rollout/
//! ├── domain/      # Experiment, ramp math, store keys, errors
//! ├── ports/       # FeatureRolloutApi + UserDirectory
//! └── service.rs   # RolloutEngine
//! ```

#![warn(clippy::all)]

pub mod domain;
pub mod ports;
pub mod service;

// Re-exports
pub use domain::{
    progress, target_count, Experiment, ExperimentPhase, ExperimentStatus, RolloutError,
    TickReport,
};
pub use ports::{FeatureRolloutApi, InMemoryUserDirectory, NewExperiment, UserDirectory};
pub use service::{RolloutConfig, RolloutEngine, DEFAULT_EXPANSION_BATCH_SIZE};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

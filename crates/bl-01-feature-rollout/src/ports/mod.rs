//! # Ports Module
//!
//! Hexagonal architecture ports for the rollout engine.

pub mod inbound;
pub mod outbound;

pub use inbound::{FeatureRolloutApi, NewExperiment};
pub use outbound::{InMemoryUserDirectory, UserDirectory};

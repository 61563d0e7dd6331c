//! # Ports Module
//!
//! Hexagonal architecture ports for the detector.

pub mod inbound;
pub mod outbound;

pub use inbound::AltDetectionApi;
pub use outbound::{AccountDirectory, InMemoryAccountDirectory};

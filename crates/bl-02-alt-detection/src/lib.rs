//! # BL-02 Alt Detection
//!
//! Flags accounts that probably belong to the same person.
//!
//! **Architecture:** Hexagonal (Domain + Ports/Adapters)
//!
//! ## Purpose
//!
//! Correlate weak identity signals and publish an `AltAccountDetected`
//! event for downstream notifiers:
//! - Network address on registration and on login (address changes only)
//! - Exact verified-email equality
//!
//! The detector never notifies anyone itself; it only publishes.
//!
//! ## Module Structure
//!
//! ```text
//! bl-02-alt-detection/
//! ├── domain/      # Payload types, confidence, store keys, errors
//! ├── ports/       # AltDetectionApi + AccountDirectory
//! └── service.rs   # AltDetector
//! ```

#![warn(clippy::all)]

pub mod domain;
pub mod ports;
pub mod service;

// Re-exports
pub use domain::{
    confidence, AltAccountDetected, AltMatch, DetectionError, DetectionSource, MatchReason,
    EMAIL_CONFIDENCE,
};
pub use ports::{AccountDirectory, AltDetectionApi, InMemoryAccountDirectory};
pub use service::{AltDetector, DetectorConfig, DEFAULT_LAST_IP_TTL};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

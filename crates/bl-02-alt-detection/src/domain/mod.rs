//! # Domain Module
//!
//! Core domain types for the alt-account detector.

pub mod confidence;
pub mod entities;
pub mod errors;
pub mod keys;

pub use confidence::{confidence, EMAIL_CONFIDENCE};
pub use entities::*;
pub use errors::*;

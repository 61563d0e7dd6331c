//! # Biolink Core Test Suite
//!
//! Cross-crate flows that no single crate can exercise on its own.
//!
//! ## Structure
//!
//! ```text
//! tests/
//! ├── benches/          # Criterion benchmarks
//! │   └── core_benchmarks.rs
//! └── src/
//!     └── integration/  # Multi-process flows over one shared store
//!         ├── event_bus.rs
//!         ├── feature_rollout.rs
//!         └── alt_detection.rs
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p bl-tests
//!
//! # By area
//! cargo test -p bl-tests integration::event_bus::
//!
//! # Benchmarks
//! cargo bench -p bl-tests
//! ```

pub mod integration;

//! vxeval Integration Test Suite
//!
//! This file serves as the entry point for integration tests.
//! It imports and re-exports all integration test modules.
//!
//! ## Test Categories
//!
//! - **common**: Shared test utilities and helpers
//! - **integration**: Cross-component integration tests
//!   - programs: Stack, memory and array programs run end to end
//!   - traversal: Context loads, arc groups, culling and collection over a graph
//!   - config: JSON configuration and bind-time validation
//! - **benchmark**: Evaluation throughput
//!
//! ## Running Tests
//!
//! ```bash
//! # Run all integration tests
//! cargo test --test main
//!
//! # Run specific test module
//! cargo test --test main traversal
//!
//! # Run benchmarks (release mode recommended)
//! cargo test --test main benchmark --release -- --nocapture
//!
//! # Run with evaluator logging
//! RUST_LOG=vxeval=debug cargo test --test main -- --nocapture
//! ```

mod common;
mod integration;
mod benchmark;

// Re-export test modules for test organisation
pub use integration::*;

//! # Director Test Utilities
//!
//! Shared testing utilities for all crates:
//! - Scripted host world and fixed spawn pools
//! - Determinism harness and scripted scenario runs
//! - Property-based testing strategies

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod determinism;
pub mod fixtures;

/// Re-export proptest for convenience.
pub use proptest;

//! Headless runner for director tuning and CI verification.
//!
//! Drives the encounter director against a small simulated arena so its
//! pacing can be inspected without a game attached:
//!
//! - **Tuning**: stream snapshots of a single run, or aggregate many seeds
//! - **CI verification**: replay a seed and compare state hashes
//! - **Config checks**: load and validate RON configuration files
//!
//! # Output
//!
//! - **stdout**: JSON (snapshot lines, summaries)
//! - **stderr**: logs (human-readable)
//!
//! # Example
//!
//! ```bash
//! # Stream one run
//! cargo run -p director_headless -- run --seed 7
//!
//! # Verify determinism
//! cargo run -p director_headless -- verify --seed 7 --runs 3
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod arena;
pub mod batch;
pub mod error;
pub mod metrics;
pub mod runner;

pub use arena::{ArenaPool, SimArena};
pub use batch::{run_batch, BatchConfig, BatchResults};
pub use error::{HeadlessError, Result};
pub use metrics::{BatchSummary, RunMetrics};
pub use runner::{run_encounter, verify_run, RunConfig, SnapshotLine, Verification};

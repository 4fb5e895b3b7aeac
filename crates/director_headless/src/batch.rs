//! Batch runner for director tuning.
//!
//! Plays many seeds in parallel using rayon and aggregates their metrics.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use director_core::config::DirectorConfig;

use crate::metrics::{BatchSummary, RunMetrics};
use crate::runner::{run_encounter, RunConfig};

/// Configuration for a batch run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Template for every run; its seed is replaced per run.
    pub run: RunConfig,
    /// Number of runs.
    pub run_count: u32,
    /// Maximum parallel runs (0 = use rayon default).
    pub parallel_runs: u32,
    /// First seed; run `i` uses `seed_start + i`.
    pub seed_start: u64,
    /// Output directory for results.
    pub output_dir: PathBuf,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            run: RunConfig::default(),
            run_count: 100,
            parallel_runs: 0,
            seed_start: 0,
            output_dir: PathBuf::from("results"),
        }
    }
}

impl BatchConfig {
    /// Batch of `run_count` runs.
    #[must_use]
    pub fn new(run_count: u32) -> Self {
        Self {
            run_count,
            ..Default::default()
        }
    }

    /// Set output directory.
    #[must_use]
    pub fn with_output(mut self, dir: PathBuf) -> Self {
        self.output_dir = dir;
        self
    }

    /// Set seed start.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed_start = seed;
        self
    }

    /// Set the run template.
    #[must_use]
    pub fn with_run(mut self, run: RunConfig) -> Self {
        self.run = run;
        self
    }
}

/// Results from a batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResults {
    /// Configuration used.
    pub config: BatchConfig,
    /// Per-run metrics, in seed order.
    pub runs: Vec<RunMetrics>,
    /// Aggregate summary.
    pub summary: BatchSummary,
    /// Total runtime.
    pub duration_seconds: f64,
    /// Runs that failed.
    pub errors: Vec<BatchError>,
}

impl BatchResults {
    /// Save results to a JSON file.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be written.
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }

    /// Load results from a JSON file.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or parsed.
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json).map_err(std::io::Error::other)
    }
}

/// A run that failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchError {
    /// Run index.
    pub run_index: u32,
    /// Seed used.
    pub seed: u64,
    /// Error message.
    pub message: String,
}

/// Run a batch of seeds.
pub fn run_batch(director_config: &DirectorConfig, config: BatchConfig) -> BatchResults {
    let start = Instant::now();
    let completed = AtomicU32::new(0);

    info!(runs = config.run_count, seed_start = config.seed_start, "Starting batch");

    if config.parallel_runs > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(config.parallel_runs as usize)
            .build_global()
            .ok(); // Ignore if already set
    }

    let results: Vec<Result<RunMetrics, BatchError>> = (0..config.run_count)
        .into_par_iter()
        .map(|i| {
            let seed = config.seed_start.wrapping_add(u64::from(i));
            let run = RunConfig {
                seed,
                ..config.run.clone()
            };
            match run_encounter(director_config, &run, |_| {}) {
                Ok(metrics) => {
                    let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                    if done % 10 == 0 {
                        debug!("Progress: {}/{}", done, config.run_count);
                    }
                    Ok(metrics)
                }
                Err(e) => {
                    warn!(run = i, seed, error = %e, "Run failed");
                    Err(BatchError {
                        run_index: i,
                        seed,
                        message: e.to_string(),
                    })
                }
            }
        })
        .collect();

    let (runs, errors): (Vec<_>, Vec<_>) = results.into_iter().partition(Result::is_ok);
    let runs: Vec<RunMetrics> = runs.into_iter().filter_map(Result::ok).collect();
    let errors: Vec<BatchError> = errors.into_iter().filter_map(Result::err).collect();

    let summary = BatchSummary::from_runs(&runs);
    let duration_seconds = start.elapsed().as_secs_f64();

    info!(
        "Batch complete: {} runs in {:.1}s ({} failed)",
        runs.len(),
        duration_seconds,
        errors.len()
    );

    BatchResults {
        config,
        runs,
        summary,
        duration_seconds,
        errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_config_builder() {
        let config = BatchConfig::new(500)
            .with_output(PathBuf::from("/tmp/results"))
            .with_seed(12345);

        assert_eq!(config.run_count, 500);
        assert_eq!(config.seed_start, 12345);
        assert_eq!(config.output_dir, PathBuf::from("/tmp/results"));
    }

    #[test]
    fn test_small_batch_runs_every_seed() {
        let run = RunConfig {
            stages: 1,
            stage_seconds: 40.0,
            charge_delay: 5.0,
            cooldown_seconds: 5.0,
            ..RunConfig::default()
        };
        let results = run_batch(&DirectorConfig::default(), BatchConfig::new(4).with_seed(100).with_run(run));
        assert!(results.errors.is_empty());
        assert_eq!(results.runs.len(), 4);
        let seeds: Vec<u64> = results.runs.iter().map(|r| r.seed).collect();
        assert_eq!(seeds, vec![100, 101, 102, 103]);
        assert_eq!(results.summary.runs, 4);
    }
}

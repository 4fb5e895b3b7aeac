//! Headless director runner.
//!
//! Plays the encounter director against a simulated arena without a game
//! attached. Designed for tuning sessions and CI.
//!
//! # Usage
//!
//! ```bash
//! # Stream snapshot lines of one run
//! cargo run -p director_headless -- run --seed 7 --stages 4
//!
//! # Run a batch of seeds in parallel
//! cargo run -p director_headless -- batch --count 200 --output results/
//!
//! # Verify determinism
//! cargo run -p director_headless -- verify --seed 12345 --runs 3
//!
//! # Validate a config file
//! cargo run -p director_headless -- validate --file configs/default.ron
//! ```
//!
//! Logs go to stderr; stdout carries JSON only.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use director_core::config::DirectorConfig;
use director_headless::{
    batch::{run_batch, BatchConfig},
    runner::{run_encounter, verify_run, RunConfig},
};

#[derive(Parser)]
#[command(name = "director_headless")]
#[command(about = "Headless encounter director runner for tuning and CI")]
#[command(version)]
struct Cli {
    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Director config (RON); built-in tuning when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play one run and print a JSON line per snapshot
    Run {
        /// Run seed
        #[arg(long, default_value = "0")]
        seed: u64,

        /// Stages to play
        #[arg(long, default_value = "4")]
        stages: u32,

        /// Players in the arena
        #[arg(long, default_value = "3")]
        players: u32,

        /// Every n-th stage has a boss (0 = none)
        #[arg(long, default_value = "3")]
        boss_every: u32,

        /// Print only the final metrics
        #[arg(long)]
        quiet: bool,
    },

    /// Run many seeds in parallel and write a summary
    Batch {
        /// Number of runs
        #[arg(short = 'n', long, default_value = "100")]
        count: u32,

        /// Maximum parallel runs (0 = auto)
        #[arg(short, long, default_value = "0")]
        parallel: u32,

        /// Output directory for results
        #[arg(short, long, default_value = "results")]
        output: PathBuf,

        /// Starting seed
        #[arg(long, default_value = "0")]
        seed: u64,

        /// Stages per run
        #[arg(long, default_value = "4")]
        stages: u32,
    },

    /// Verify determinism by running the same seed multiple times
    Verify {
        /// Seed to verify
        #[arg(long, default_value = "12345")]
        seed: u64,

        /// Number of verification runs
        #[arg(short, long, default_value = "3")]
        runs: u32,
    },

    /// Load and validate a config file
    Validate {
        /// Config file to check
        #[arg(long)]
        file: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging to stderr (stdout is for JSON)
    let log_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(true),
        )
        .with(tracing_subscriber::filter::LevelFilter::from_level(log_level))
        .init();

    let config = load_config(cli.config.as_deref());

    match cli.command {
        Commands::Run {
            seed,
            stages,
            players,
            boss_every,
            quiet,
        } => {
            let run = RunConfig {
                seed,
                stages,
                players,
                boss_every,
                ..RunConfig::default()
            };
            cmd_run(&config, &run, quiet);
        }
        Commands::Batch {
            count,
            parallel,
            output,
            seed,
            stages,
        } => {
            cmd_batch(&config, count, parallel, output, seed, stages);
        }
        Commands::Verify { seed, runs } => {
            cmd_verify(&config, seed, runs);
        }
        Commands::Validate { file } => {
            cmd_validate(&file);
        }
    }
}

fn load_config(path: Option<&Path>) -> DirectorConfig {
    let Some(path) = path else {
        return DirectorConfig::default();
    };
    match DirectorConfig::load(path).and_then(|c| c.validate().map(|()| c)) {
        Ok(config) => {
            tracing::info!(path = %path.display(), "Loaded director config");
            config
        }
        Err(e) => {
            eprintln!("FATAL: {e}");
            std::process::exit(1);
        }
    }
}

/// Play one run
fn cmd_run(config: &DirectorConfig, run: &RunConfig, quiet: bool) {
    let result = run_encounter(config, run, |line| {
        if quiet {
            return;
        }
        match serde_json::to_string(line) {
            Ok(json) => println!("{json}"),
            Err(e) => tracing::warn!(error = %e, "Failed to encode snapshot line"),
        }
    });

    match result {
        Ok(metrics) => match serde_json::to_string(&metrics) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("FATAL: Failed to encode metrics: {e}");
                std::process::exit(1);
            }
        },
        Err(e) => {
            eprintln!("FATAL: Run failed: {e}");
            std::process::exit(1);
        }
    }
}

/// Run a batch of seeds
fn cmd_batch(config: &DirectorConfig, count: u32, parallel: u32, output: PathBuf, seed: u64, stages: u32) {
    if let Err(e) = std::fs::create_dir_all(&output) {
        tracing::error!(error = %e, path = %output.display(), "Failed to create output directory");
        eprintln!("FATAL: Cannot create output directory '{}': {}", output.display(), e);
        std::process::exit(1);
    }

    let batch = BatchConfig {
        run: RunConfig {
            stages,
            ..RunConfig::default()
        },
        run_count: count,
        parallel_runs: parallel,
        seed_start: seed,
        output_dir: output.clone(),
    };

    let results = run_batch(config, batch);

    let results_path = output.join("batch_results.json");
    if let Err(e) = results.save(&results_path) {
        tracing::error!(error = %e, path = %results_path.display(), "Failed to save results");
        eprintln!("FATAL: Failed to save results: {e}");
        std::process::exit(1);
    }

    eprintln!("\n{}", "=".repeat(50));
    eprintln!("BATCH COMPLETE");
    eprintln!("{}", "=".repeat(50));
    eprintln!("Runs played: {}", results.runs.len());
    if !results.errors.is_empty() {
        eprintln!("Runs failed: {}", results.errors.len());
    }
    eprintln!("Mean spawned: {:.1}", results.summary.mean_spawned);
    eprintln!("Mean commander defeats: {:.2}", results.summary.mean_commander_defeats);
    eprintln!("Mean breaches: {:.2}", results.summary.mean_breaches);
    eprintln!("Mean peak intensity: {:.1}", results.summary.mean_peak_intensity);
    if results.summary.session_resets > 0 {
        eprintln!("WARNING: {} session reset(s)", results.summary.session_resets);
    }
    eprintln!("Results: {}", results_path.display());

    match serde_json::to_string(&results.summary) {
        Ok(json) => println!("{json}"),
        Err(e) => tracing::warn!(error = %e, "Failed to encode summary"),
    }
}

/// Verify determinism
fn cmd_verify(config: &DirectorConfig, seed: u64, runs: u32) {
    tracing::info!("Verifying determinism with seed {} ({} runs)", seed, runs);

    match verify_run(config, &RunConfig::with_seed(seed), runs) {
        Ok(v) if v.deterministic => {
            eprintln!("PASS: All {} runs produced identical results", v.hashes.len());
            if let Some(hash) = v.hashes.first() {
                eprintln!("  Hash: {hash:016x}");
            }
        }
        Ok(v) => {
            eprintln!("FAIL: Non-determinism detected!");
            for (i, hash) in v.hashes.iter().enumerate() {
                eprintln!("  Run {i}: {hash:016x}");
            }
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("FATAL: {e}");
            std::process::exit(1);
        }
    }
}

/// Validate a config file
fn cmd_validate(file: &Path) {
    match DirectorConfig::load(file).and_then(|c| c.validate()) {
        Ok(()) => eprintln!("OK: {}", file.display()),
        Err(e) => {
            eprintln!("INVALID: {}: {e}", file.display());
            std::process::exit(1);
        }
    }
}

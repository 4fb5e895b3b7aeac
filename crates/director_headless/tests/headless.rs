//! End-to-end checks of the headless runner.

use std::path::PathBuf;

use director_core::config::DirectorConfig;
use director_headless::{run_batch, run_encounter, verify_run, BatchConfig, BatchResults, RunConfig};

fn shipped_config() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("configs/default.ron")
}

fn quick_run(seed: u64) -> RunConfig {
    RunConfig {
        seed,
        stages: 3,
        stage_seconds: 120.0,
        charge_delay: 10.0,
        cooldown_seconds: 10.0,
        boss_every: 3,
        ..RunConfig::default()
    }
}

#[test]
fn test_shipped_config_is_the_builtin_tuning() {
    let config = DirectorConfig::load(shipped_config()).unwrap();
    config.validate().unwrap();
    assert_eq!(config, DirectorConfig::default());
}

#[test]
fn test_batch_results_survive_save_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested/batch_results.json");
    let run = RunConfig {
        stages: 1,
        stage_seconds: 45.0,
        ..quick_run(0)
    };
    let results = run_batch(&DirectorConfig::default(), BatchConfig::new(3).with_run(run));
    results.save(&path).unwrap();

    let loaded = BatchResults::load(&path).unwrap();
    assert_eq!(loaded.config, results.config);
    assert_eq!(loaded.summary, results.summary);
    let hashes: Vec<u64> = loaded.runs.iter().map(|r| r.final_state_hash).collect();
    let expected: Vec<u64> = results.runs.iter().map(|r| r.final_state_hash).collect();
    assert_eq!(hashes, expected);
}

#[test]
fn test_batch_is_reproducible() {
    let run = RunConfig {
        stages: 1,
        stage_seconds: 45.0,
        ..quick_run(0)
    };
    let config = DirectorConfig::default();
    let a = run_batch(&config, BatchConfig::new(3).with_seed(40).with_run(run.clone()));
    let b = run_batch(&config, BatchConfig::new(3).with_seed(40).with_run(run));
    let hashes = |r: &BatchResults| r.runs.iter().map(|m| m.final_state_hash).collect::<Vec<_>>();
    assert_eq!(hashes(&a), hashes(&b));
}

#[test]
fn test_multi_stage_run_is_deterministic() {
    let verification = verify_run(&DirectorConfig::default(), &quick_run(12345), 2).unwrap();
    assert!(verification.deterministic);
    assert_eq!(verification.hashes.len(), 2);
}

#[test]
fn test_first_stage_is_balanced_and_snapshots_stay_in_range() {
    let mut lines = Vec::new();
    let metrics = run_encounter(&DirectorConfig::default(), &quick_run(9), |l| lines.push(l.clone())).unwrap();
    assert_eq!(metrics.stages, 3);
    assert_eq!(metrics.doctrines.first().map(String::as_str), Some("balanced"));
    assert!(lines.iter().filter(|l| l.stage == 0).all(|l| l.doctrine.name() == "balanced" || metrics.pivots > 0));
    assert!(lines.iter().all(|l| (0.0..=100.0).contains(&l.intensity)));
    assert!(lines.iter().all(|l| l.siege_tier <= 3));
    assert_eq!(metrics.session_resets, 0);
}

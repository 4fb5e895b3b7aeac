//! Run metrics collection for director tuning.
//!
//! Everything here is fed from [`TickEvents`] and snapshots, never by
//! reaching into director internals, so the numbers match what a host would
//! see.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use director_core::cadence::CadencePhase;
use director_core::director::TickEvents;
use director_core::snapshot::SnapshotState;

/// Metrics for a single run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunMetrics {
    /// Seed the run was played with.
    pub seed: u64,
    /// Stages played.
    pub stages: u32,
    /// Director ticks executed.
    pub ticks: u64,
    /// Enemy units spawned.
    pub spawned: u64,
    /// Of those, elites.
    pub elites_spawned: u64,
    /// Commanders defeated.
    pub commander_defeats: u32,
    /// Commander responses rolled, by name.
    pub responses: BTreeMap<String, u32>,
    /// Doctrine rolled for each stage, in order.
    pub doctrines: Vec<String>,
    /// Breach assaults triggered.
    pub breaches: u32,
    /// Mercy windows opened.
    pub mercy_windows: u32,
    /// Doctrine changes after the stage roll.
    pub pivots: u32,
    /// Stage sessions reset after an invariant failure.
    pub session_resets: u32,
    /// Seconds spent in each phase.
    pub phase_seconds: BTreeMap<String, f32>,
    /// Highest snapshot intensity.
    pub peak_intensity: f32,
    /// Mean snapshot intensity.
    pub mean_intensity: f32,
    /// Currency granted across all players.
    pub currency: u64,
    /// Reward containers dropped.
    pub containers: u32,
    /// Player deaths.
    pub player_deaths: u32,
    /// Final director state hash.
    pub final_state_hash: u64,
    #[serde(skip)]
    intensity_samples: u32,
}

impl RunMetrics {
    /// Empty metrics for a seed.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            ..Default::default()
        }
    }

    /// Fold in the result of a stage start.
    pub fn record_stage(&mut self, events: &TickEvents) {
        self.stages += 1;
        if let Some(roll) = &events.operation_changed {
            self.doctrines.push(roll.doctrine().name().to_string());
        }
        self.record_counts(events);
    }

    /// Fold in one tick or hook result. A doctrine change here is a pivot.
    pub fn record_events(&mut self, events: &TickEvents) {
        self.pivots += u32::from(events.operation_changed.is_some());
        self.record_counts(events);
    }

    fn record_counts(&mut self, events: &TickEvents) {
        self.spawned += events.spawned.len() as u64;
        self.elites_spawned += events.spawned.iter().filter(|s| s.elite).count() as u64;
        for defeat in &events.commander_defeats {
            self.commander_defeats += 1;
            *self.responses.entry(defeat.response.name().to_string()).or_insert(0) += 1;
        }
        self.breaches += u32::from(events.breach_triggered);
        self.mercy_windows += u32::from(events.mercy_opened);
        self.session_resets += u32::from(events.session_reset);
    }

    /// Account one tick of wall-free simulated time to a phase.
    pub fn record_phase(&mut self, phase: Option<CadencePhase>, dt: f32) {
        self.ticks += 1;
        if let Some(phase) = phase {
            *self.phase_seconds.entry(phase.name().to_string()).or_insert(0.0) += dt;
        }
    }

    /// Fold in a decoded snapshot.
    pub fn record_snapshot(&mut self, state: &SnapshotState) {
        if !state.active {
            return;
        }
        self.peak_intensity = self.peak_intensity.max(state.intensity);
        self.intensity_samples += 1;
        let n = self.intensity_samples as f32;
        self.mean_intensity += (state.intensity - self.mean_intensity) / n;
    }
}

/// Aggregate over a batch of runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Runs aggregated.
    pub runs: u32,
    /// Mean units spawned per run.
    pub mean_spawned: f64,
    /// Mean commander defeats per run.
    pub mean_commander_defeats: f64,
    /// Mean breaches per run.
    pub mean_breaches: f64,
    /// Mean mercy windows per run.
    pub mean_mercy_windows: f64,
    /// Mean of per-run peak intensity.
    pub mean_peak_intensity: f64,
    /// Stage doctrine frequencies.
    pub doctrine_counts: BTreeMap<String, u32>,
    /// Commander response frequencies.
    pub response_counts: BTreeMap<String, u32>,
    /// Total invariant resets; anything above zero needs a look.
    pub session_resets: u32,
}

impl BatchSummary {
    /// Summarise a set of runs.
    #[must_use]
    pub fn from_runs(runs: &[RunMetrics]) -> Self {
        let mut summary = Self {
            runs: runs.len() as u32,
            ..Default::default()
        };
        if runs.is_empty() {
            return summary;
        }
        let n = runs.len() as f64;
        let mean = |f: fn(&RunMetrics) -> f64| runs.iter().map(f).sum::<f64>() / n;
        summary.mean_spawned = mean(|r| r.spawned as f64);
        summary.mean_commander_defeats = mean(|r| f64::from(r.commander_defeats));
        summary.mean_breaches = mean(|r| f64::from(r.breaches));
        summary.mean_mercy_windows = mean(|r| f64::from(r.mercy_windows));
        summary.mean_peak_intensity = mean(|r| f64::from(r.peak_intensity));
        for run in runs {
            for doctrine in &run.doctrines {
                *summary.doctrine_counts.entry(doctrine.clone()).or_insert(0) += 1;
            }
            for (response, count) in &run.responses {
                *summary.response_counts.entry(response.clone()).or_insert(0) += count;
            }
            summary.session_resets += run.session_resets;
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_intensity_is_running_mean() {
        let mut metrics = RunMetrics::new(1);
        for intensity in [10.0, 20.0, 60.0] {
            metrics.record_snapshot(&SnapshotState {
                active: true,
                intensity,
                ..SnapshotState::default()
            });
        }
        metrics.record_snapshot(&SnapshotState::default());
        assert!((metrics.mean_intensity - 30.0).abs() < 1e-4);
        assert_eq!(metrics.peak_intensity, 60.0);
    }

    #[test]
    fn test_summary_of_nothing_is_empty() {
        assert_eq!(BatchSummary::from_runs(&[]), BatchSummary::default());
    }

    #[test]
    fn test_summary_counts_doctrines() {
        let mut a = RunMetrics::new(1);
        a.doctrines = vec!["balanced".into(), "blitz".into()];
        a.breaches = 2;
        let mut b = RunMetrics::new(2);
        b.doctrines = vec!["balanced".into()];
        let summary = BatchSummary::from_runs(&[a, b]);
        assert_eq!(summary.runs, 2);
        assert_eq!(summary.doctrine_counts.get("balanced"), Some(&2));
        assert!((summary.mean_breaches - 1.0).abs() < f64::EPSILON);
    }
}

//! Drives one run of the director against the simulated arena.
//!
//! Each stage follows the same script: a quiet lead-in, the charge event
//! (begins after `charge_delay` seconds, ends when the objective fills),
//! then a cooldown before the next stage. A stage that never fills is cut
//! off at `stage_seconds` with a `ChargeFinish`.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use director_core::cadence::CadencePhase;
use director_core::config::DirectorConfig;
use director_core::director::{Director, TickEvents};
use director_core::hooks::{Hook, StageInfo};
use director_core::math::Vec2;
use director_core::operation::{Anomaly, DoctrineProfile, Warning};
use director_core::roles::Role;
use director_core::session::StageSession;
use director_core::snapshot::SnapshotState;

use crate::arena::{ArenaPool, SimArena};
use crate::error::{HeadlessError, Result};
use crate::metrics::RunMetrics;

/// Distance of command zones from the objective.
const COMMAND_ZONE_DISTANCE: f32 = 40.0;

/// One run of the arena.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Seed for the director and the arena.
    pub seed: u64,
    /// Stages to play.
    pub stages: u32,
    /// Players in the arena.
    pub players: u32,
    /// Hard cap on a stage's length in seconds.
    pub stage_seconds: f32,
    /// Seconds from stage start to the charge event.
    pub charge_delay: f32,
    /// Seconds played after the objective fills.
    pub cooldown_seconds: f32,
    /// Every n-th stage has a boss; 0 disables bosses.
    pub boss_every: u32,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            stages: 4,
            players: 3,
            stage_seconds: 300.0,
            charge_delay: 20.0,
            cooldown_seconds: 20.0,
            boss_every: 3,
        }
    }
}

impl RunConfig {
    /// Default run with a given seed.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed,
            ..Default::default()
        }
    }

    /// Check the run makes sense.
    ///
    /// # Errors
    ///
    /// Returns [`HeadlessError::InvalidRun`] naming the first bad field.
    pub fn validate(&self) -> Result<()> {
        if self.stages == 0 {
            return Err(HeadlessError::InvalidRun("stages must be at least 1".into()));
        }
        if self.players == 0 {
            return Err(HeadlessError::InvalidRun("players must be at least 1".into()));
        }
        if !(self.stage_seconds.is_finite() && self.stage_seconds > 0.0) {
            return Err(HeadlessError::InvalidRun("stage_seconds must be positive".into()));
        }
        if !(self.charge_delay >= 0.0 && self.cooldown_seconds >= 0.0) {
            return Err(HeadlessError::InvalidRun(
                "charge_delay and cooldown_seconds must not be negative".into(),
            ));
        }
        Ok(())
    }
}

/// One JSON output line per pushed snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotLine {
    /// Director tick the snapshot was pushed on.
    pub tick: u64,
    /// Stage being played.
    pub stage: u32,
    /// Cadence phase.
    pub phase: CadencePhase,
    /// Doctrine in force.
    pub doctrine: DoctrineProfile,
    /// Role leading the current phase.
    pub dominant_role: Role,
    /// Both warnings.
    pub warnings: [Warning; 2],
    /// The anomaly.
    pub anomaly: Anomaly,
    /// Intensity in `[0, 100]`.
    pub intensity: f32,
    /// Objective charge.
    pub charge: f32,
    /// Breach assault running.
    pub breach: bool,
    /// Mercy window open.
    pub mercy: bool,
    /// Reactive escalation raised.
    pub reactive: bool,
    /// Lone-wolf pressure.
    pub lone_wolf: f32,
    /// Living commanders.
    pub commanders: u8,
    /// Siege tier.
    pub siege_tier: u8,
    /// Living enemy units in the arena.
    pub enemies: usize,
}

impl SnapshotLine {
    fn new(tick: u64, stage: u32, state: &SnapshotState, enemies: usize) -> Self {
        Self {
            tick,
            stage,
            phase: state.phase,
            doctrine: state.doctrine,
            dominant_role: state.dominant_role,
            warnings: state.warnings,
            anomaly: state.anomaly,
            intensity: state.intensity,
            charge: state.charge_fraction,
            breach: state.breach,
            mercy: state.mercy,
            reactive: state.reactive,
            lone_wolf: state.lone_wolf_pressure,
            commanders: state.commander_count,
            siege_tier: state.siege_tier,
            enemies,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum StageStep {
    LeadIn,
    Charging,
    Cooldown { since: f32 },
}

/// Command zones for a stage, opposite each other and rotating per stage.
fn command_zones(stage: u32) -> [Vec2; 2] {
    let first = Vec2::from_angle(stage as f32 * 1.3).scale(COMMAND_ZONE_DISTANCE);
    [first, first.rotate(std::f32::consts::PI)]
}

struct Run<'a, F> {
    director: Director<ArenaPool>,
    arena: SimArena,
    metrics: RunMetrics,
    on_snapshot: &'a mut F,
}

impl<F: FnMut(&SnapshotLine)> Run<'_, F> {
    fn hook(&mut self, hook: Hook) -> TickEvents {
        if matches!(hook, Hook::PlayerDeath { .. }) {
            self.metrics.player_deaths += 1;
        }
        self.director.handle_hook(&mut self.arena, hook)
    }

    fn forward(&mut self, hook: Hook) {
        let events = self.hook(hook);
        self.metrics.record_events(&events);
    }

    fn tick(&mut self, stage: u32, dt: f32) -> Result<()> {
        for hook in self.arena.step(dt) {
            self.forward(hook);
        }
        let events = self.director.tick(&mut self.arena);
        self.metrics.record_events(&events);
        self.metrics
            .record_phase(self.director.session().map(StageSession::phase), dt);
        if let Some(snapshot) = events.snapshot {
            let state = snapshot.state()?;
            self.metrics.record_snapshot(&state);
            let line = SnapshotLine::new(self.director.tick_count(), stage, &state, self.arena.enemy_count());
            (self.on_snapshot)(&line);
        }
        Ok(())
    }

    fn play_stage(&mut self, run: &RunConfig, stage: u32, dt: f32) -> Result<()> {
        let boss = run.boss_every > 0 && (stage + 1) % run.boss_every == 0;
        self.arena.begin_stage(boss);
        let info = StageInfo::new(stage, 1.0 + stage as f32 * 0.25).with_command_zones(command_zones(stage));
        let events = self.hook(Hook::StageStart(info));
        self.metrics.record_stage(&events);

        let mut step = StageStep::LeadIn;
        let mut elapsed = 0.0_f32;
        while elapsed < run.stage_seconds {
            match step {
                StageStep::LeadIn if elapsed >= run.charge_delay => {
                    self.arena.begin_charge();
                    self.forward(Hook::ChargeBegin);
                    step = StageStep::Charging;
                }
                StageStep::Charging if self.arena.charged() => {
                    self.arena.end_charge();
                    self.forward(Hook::ChargeCharged);
                    debug!(stage, elapsed, "Objective charged");
                    step = StageStep::Cooldown { since: elapsed };
                }
                StageStep::Cooldown { since } if elapsed - since >= run.cooldown_seconds => break,
                _ => {}
            }
            self.tick(stage, dt)?;
            elapsed += dt;
        }
        if matches!(step, StageStep::LeadIn | StageStep::Charging) {
            info!(stage, "Stage timed out before the objective filled");
        }
        self.arena.end_charge();
        self.forward(Hook::ChargeFinish);
        Ok(())
    }
}

/// Play one run, calling `on_snapshot` for every pushed snapshot.
///
/// # Errors
///
/// Fails if the run or director config is invalid, or a snapshot fails to
/// decode.
pub fn run_encounter<F>(config: &DirectorConfig, run: &RunConfig, mut on_snapshot: F) -> Result<RunMetrics>
where
    F: FnMut(&SnapshotLine),
{
    run.validate()?;
    let dt = config.tick_seconds();
    let director = Director::new(config.clone(), ArenaPool::standard())?;
    let mut state = Run {
        director,
        arena: SimArena::new(run.seed, run.players),
        metrics: RunMetrics::new(run.seed),
        on_snapshot: &mut on_snapshot,
    };

    info!(seed = run.seed, stages = run.stages, players = run.players, "Run starting");
    state.forward(Hook::RunStart { seed: run.seed });
    for stage in 0..run.stages {
        state.play_stage(run, stage, dt)?;
    }
    state.forward(Hook::RunEnd);

    let mut metrics = state.metrics;
    metrics.currency = state.arena.currency();
    metrics.containers = state.arena.containers();
    metrics.final_state_hash = state.director.state_hash();
    info!(
        seed = run.seed,
        ticks = metrics.ticks,
        spawned = metrics.spawned,
        defeats = metrics.commander_defeats,
        hash = format!("{:016x}", metrics.final_state_hash),
        "Run complete"
    );
    Ok(metrics)
}

/// Outcome of replaying one seed several times.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verification {
    /// Final state hash of each run.
    pub hashes: Vec<u64>,
    /// All hashes and snapshot streams matched.
    pub deterministic: bool,
}

/// Replay one run `runs` times and compare.
///
/// # Errors
///
/// Propagates the first run failure.
pub fn verify_run(config: &DirectorConfig, run: &RunConfig, runs: u32) -> Result<Verification> {
    let mut hashes = Vec::new();
    let mut streams: Vec<Vec<SnapshotLine>> = Vec::new();
    for _ in 0..runs.max(2) {
        let mut lines = Vec::new();
        let metrics = run_encounter(config, run, |line| lines.push(line.clone()))?;
        hashes.push(metrics.final_state_hash);
        streams.push(lines);
    }
    let deterministic = hashes.windows(2).all(|w| w[0] == w[1]) && streams.windows(2).all(|w| w[0] == w[1]);
    Ok(Verification { hashes, deterministic })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn short_run(seed: u64) -> RunConfig {
        RunConfig {
            seed,
            stages: 2,
            stage_seconds: 90.0,
            charge_delay: 5.0,
            cooldown_seconds: 5.0,
            boss_every: 2,
            ..RunConfig::default()
        }
    }

    #[test]
    fn test_rejects_empty_run() {
        let run = RunConfig {
            stages: 0,
            ..RunConfig::default()
        };
        assert!(matches!(run.validate(), Err(HeadlessError::InvalidRun(_))));
    }

    #[test]
    fn test_run_produces_snapshots_and_stages() {
        let mut lines = Vec::new();
        let metrics = run_encounter(&DirectorConfig::default(), &short_run(3), |l| lines.push(l.clone())).unwrap();
        assert_eq!(metrics.stages, 2);
        assert_eq!(metrics.doctrines.len(), 2);
        assert_eq!(metrics.doctrines[0], "balanced");
        assert!(metrics.spawned > 0);
        assert!(!lines.is_empty());
        assert!(lines.iter().all(|l| (0.0..=100.0).contains(&l.intensity)));
        assert!(lines.iter().all(|l| l.warnings[0] != l.warnings[1]));
        assert_eq!(metrics.session_resets, 0);
    }

    #[test]
    fn test_same_seed_same_run() {
        let verification = verify_run(&DirectorConfig::default(), &short_run(11), 2).unwrap();
        assert!(verification.deterministic, "{:?}", verification.hashes);
    }

    #[test]
    fn test_command_zones_are_opposite() {
        let [a, b] = command_zones(2);
        assert!((a + b).length() < 1e-3);
        assert!((a.length() - COMMAND_ZONE_DISTANCE).abs() < 1e-3);
    }
}

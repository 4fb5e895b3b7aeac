//! Determinism testing utilities.
//!
//! Provides a harness for verifying that the director makes identical
//! decisions given identical inputs.
//!
//! # Testing Strategy
//!
//! The director must be reproducible from its seed so that tuning runs and
//! bug reports can be replayed. Sources of non-determinism include:
//!
//! - **System randomness**: every decision draws from the director's own
//!   seeded `ChaCha8Rng`; nothing else may call into `rand`.
//!
//! - **HashMap iteration order**: the scripted arena stores units in a
//!   `BTreeMap` so enemy queries come back in id order.
//!
//! - **Wall-clock time**: all timers advance by the fixed tick delta.
//!
//! # Test Levels
//!
//! 1. **Unit tests**: individual components with a fixed seed
//! 2. **Property tests**: random inputs must keep invariants
//! 3. **Scenario runs**: a scripted multi-stage run hashes identically twice

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use director_core::config::DirectorConfig;
use director_core::director::Director;
use director_core::error::Result;
use director_core::hooks::{Hook, StageInfo};
use director_core::host::PlayerId;
use director_core::math::Vec2;
use director_core::snapshot::DirectorSnapshot;

use crate::fixtures::{FixedPool, ScriptedArena};

/// Result of a determinism test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// Whether all runs produced identical results.
    pub is_deterministic: bool,
    /// Final hash from each run.
    pub hashes: Vec<u64>,
    /// Ticks simulated per run.
    pub ticks: u64,
}

impl DeterminismResult {
    /// Distinct hashes (1 for a deterministic director).
    #[must_use]
    pub fn unique_hashes(&self) -> Vec<u64> {
        let mut unique = self.hashes.clone();
        unique.sort_unstable();
        unique.dedup();
        unique
    }

    /// Assert that every run agreed.
    ///
    /// # Panics
    ///
    /// Panics if the runs produced different hashes.
    pub fn assert_deterministic(&self) {
        assert!(
            self.is_deterministic,
            "Director is non-deterministic!\nRuns: {}\nTicks: {}\nUnique hashes: {} (expected 1)\nAll hashes: {:?}",
            self.hashes.len(),
            self.ticks,
            self.unique_hashes().len(),
            self.hashes
        );
    }
}

/// Run any stateful process several times and compare final hashes.
pub fn verify_determinism<S, Setup, Step, HashFn>(
    runs: usize,
    ticks: u64,
    setup: Setup,
    step: Step,
    hash: HashFn,
) -> DeterminismResult
where
    Setup: Fn() -> S,
    Step: Fn(&mut S),
    HashFn: Fn(&S) -> u64,
{
    let hashes: Vec<u64> = (0..runs)
        .map(|_| {
            let mut state = setup();
            for _ in 0..ticks {
                step(&mut state);
            }
            hash(&state)
        })
        .collect();
    DeterminismResult {
        is_deterministic: hashes.windows(2).all(|w| w[0] == w[1]),
        hashes,
        ticks,
    }
}

/// A scripted multi-stage run against the [`ScriptedArena`].
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioScript {
    /// Run seed.
    pub seed: u64,
    /// Stages to play.
    pub stages: u32,
    /// Ticks per stage.
    pub stage_ticks: u32,
    /// Tick within each stage at which the charge event begins.
    pub charge_begin_tick: u32,
    /// Charge gained per tick once the event runs.
    pub charge_per_tick: f32,
    /// Players in the arena.
    pub players: u32,
    /// Kill the oldest enemy every this many ticks; 0 disables.
    pub kill_every: u32,
    /// Stage tick at which every commander dies; `None` keeps them alive.
    pub commander_death_tick: Option<u32>,
    /// Stage tick at which player 1 dies.
    pub player_death_tick: Option<u32>,
}

impl Default for ScenarioScript {
    fn default() -> Self {
        Self {
            seed: 7,
            stages: 3,
            stage_ticks: 2400,
            charge_begin_tick: 300,
            charge_per_tick: 1.0 / 1600.0,
            players: 3,
            kill_every: 20,
            commander_death_tick: Some(900),
            player_death_tick: Some(1200),
        }
    }
}

/// Everything a scripted run observed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunTrace {
    /// State hash after every tick.
    pub hashes: Vec<u64>,
    /// Snapshots pushed to observers, in order.
    pub snapshots: Vec<DirectorSnapshot>,
    /// Units spawned.
    pub spawned: usize,
    /// Commanders defeated.
    pub defeats: usize,
    /// Breaches triggered.
    pub breaches: usize,
}

impl RunTrace {
    /// Hash at the end of the run.
    #[must_use]
    pub fn final_hash(&self) -> u64 {
        self.hashes.last().copied().unwrap_or_default()
    }
}

/// Play a script from scratch.
pub fn run_scenario(config: &DirectorConfig, script: &ScenarioScript) -> Result<RunTrace> {
    let mut director = Director::new(config.clone(), FixedPool::standard())?;
    let mut arena = ScriptedArena::new()
        .with_players(script.players)
        .with_objective(Vec2::ZERO, 12.0);
    let dt = config.tick_seconds();
    let mut trace = RunTrace::default();

    director.handle_hook(&mut arena, Hook::RunStart { seed: script.seed });
    for stage in 0..script.stages {
        arena.set_charge(0.0);
        let info = StageInfo::new(stage, 1.0 + stage as f32 * 0.25)
            .with_command_zones([Vec2::new(40.0, 0.0), Vec2::new(-40.0, 10.0)]);
        director.handle_hook(&mut arena, Hook::StageStart(info));
        let mut charging = false;

        for t in 0..script.stage_ticks {
            if t == script.charge_begin_tick {
                director.handle_hook(&mut arena, Hook::ChargeBegin);
                charging = true;
            }
            if charging && !arena.charge_held() {
                arena.set_charge(arena.charge() + script.charge_per_tick);
                if arena.charge() >= 1.0 {
                    director.handle_hook(&mut arena, Hook::ChargeCharged);
                    charging = false;
                }
            }
            if script.kill_every > 0 && t % script.kill_every == 0 {
                let oldest = arena.enemies().find(|(_, u)| !u.elite).map(|(id, _)| id);
                if let Some(unit) = oldest {
                    director.handle_hook(
                        &mut arena,
                        Hook::DamageDealt {
                            attacker: Some(unit),
                            victim: Some(PlayerId(1)),
                            amount: 5.0,
                        },
                    );
                    arena.kill(unit);
                }
            }
            if script.commander_death_tick == Some(t) {
                for unit in arena.elites() {
                    arena.kill(unit);
                }
            }
            if script.player_death_tick == Some(t) {
                director.handle_hook(&mut arena, Hook::PlayerDeath { player: PlayerId(1) });
            }

            let events = director.tick(&mut arena);
            arena.step(dt);
            trace.spawned += events.spawned.len();
            trace.defeats += events.commander_defeats.len();
            trace.breaches += usize::from(events.breach_triggered);
            if let Some(snapshot) = events.snapshot {
                trace.snapshots.push(snapshot);
            }
            trace.hashes.push(director.state_hash());
        }
        director.handle_hook(&mut arena, Hook::ChargeFinish);
    }
    director.handle_hook(&mut arena, Hook::RunEnd);
    Ok(trace)
}

/// Play a script `runs` times and compare final hashes.
pub fn verify_scenario_determinism(
    config: &DirectorConfig,
    script: &ScenarioScript,
    runs: usize,
) -> Result<DeterminismResult> {
    let traces = (0..runs)
        .map(|_| run_scenario(config, script))
        .collect::<Result<Vec<_>>>()?;
    let hashes: Vec<u64> = traces.iter().map(RunTrace::final_hash).collect();
    let ticks = u64::from(script.stages) * u64::from(script.stage_ticks);
    Ok(DeterminismResult {
        is_deterministic: hashes.windows(2).all(|w| w[0] == w[1])
            && traces.windows(2).all(|w| w[0].snapshots == w[1].snapshots),
        hashes,
        ticks,
    })
}

/// First tick at which two plays of the same script disagree.
pub fn find_first_divergence(config: &DirectorConfig, script: &ScenarioScript) -> Result<Option<usize>> {
    let a = run_scenario(config, script)?;
    let b = run_scenario(config, script)?;
    let first = a.hashes.iter().zip(&b.hashes).position(|(x, y)| x != y);
    let first = first.or_else(|| (a.hashes.len() != b.hashes.len()).then_some(a.hashes.len().min(b.hashes.len())));
    if let Some(tick) = first {
        tracing::warn!(tick, seed = script.seed, "Scripted runs diverged");
    }
    Ok(first)
}

/// Hash any hashable value.
pub fn compute_hash<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Proptest strategies for director inputs.
pub mod strategies {
    use director_core::adaptation::StageTelemetry;
    use director_core::config::SignalTuning;
    use director_core::host::{ObjectiveView, PlayerId, PlayerView};
    use director_core::math::Vec2;
    use director_core::operation::DoctrineProfile;
    use proptest::prelude::*;

    /// Any f32, including NaN and infinities.
    pub fn arb_any_weight() -> impl Strategy<Value = f32> {
        prop_oneof![
            -1.0e6f32..1.0e6f32,
            Just(f32::NAN),
            Just(f32::INFINITY),
            Just(f32::NEG_INFINITY),
            Just(0.0f32),
        ]
    }

    /// A position inside a typical arena.
    pub fn arb_position() -> impl Strategy<Value = Vec2> {
        (-200.0f32..200.0, -200.0f32..200.0).prop_map(|(x, y)| Vec2::new(x, y))
    }

    /// One stage's raw telemetry, sometimes extreme.
    pub fn arb_stage_telemetry() -> impl Strategy<Value = StageTelemetry> {
        (
            0.0f32..50_000.0,
            0.0f32..5_000.0,
            0.0f32..600.0,
            0.0f32..600.0,
            0u32..40,
            proptest::array::uniform6(0.0f32..500.0),
            0.0f32..900.0,
        )
            .prop_map(
                |(damage_taken, healing_received, contest_seconds, lone_wolf_seconds, breach_triggers, roles, elapsed)| {
                    StageTelemetry {
                        damage_taken,
                        healing_received,
                        contest_seconds,
                        lone_wolf_seconds,
                        breach_triggers,
                        role_contributions: roles,
                        elapsed,
                    }
                },
            )
    }

    /// Signal tuning within the shipped bands.
    pub fn arb_signal_tuning() -> impl Strategy<Value = SignalTuning> {
        (0.06f32..=0.09, 0.35f32..=0.42).prop_map(|(decay, blend)| SignalTuning { decay, blend })
    }

    /// Up to six players, some dead.
    pub fn arb_players() -> impl Strategy<Value = Vec<PlayerView>> {
        proptest::collection::vec((arb_position(), 0.0f32..=1.0, any::<bool>()), 0..6).prop_map(|views| {
            views
                .into_iter()
                .enumerate()
                .map(|(i, (position, health_fraction, alive))| PlayerView {
                    id: PlayerId(i as u32 + 1),
                    position,
                    health_fraction,
                    alive,
                })
                .collect()
        })
    }

    /// An objective, sometimes with an invalid zone.
    pub fn arb_objective() -> impl Strategy<Value = ObjectiveView> {
        (arb_position(), 4.0f32..30.0, 0.0f32..=1.0, any::<bool>()).prop_map(
            |(position, radius, charge_fraction, zone_valid)| ObjectiveView {
                position,
                radius,
                charge_fraction,
                zone_valid,
            },
        )
    }

    /// Any doctrine.
    pub fn arb_doctrine() -> impl Strategy<Value = DoctrineProfile> {
        proptest::sample::select(DoctrineProfile::ALL.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_determinism_counts() {
        let result = verify_determinism(3, 10, || 0u64, |s| *s += 1, |s| *s);
        assert!(result.is_deterministic);
        assert_eq!(result.hashes, vec![10, 10, 10]);
        result.assert_deterministic();
    }

    #[test]
    fn test_short_scenario_is_deterministic() {
        let script = ScenarioScript {
            stages: 2,
            stage_ticks: 600,
            charge_begin_tick: 100,
            charge_per_tick: 1.0 / 300.0,
            commander_death_tick: Some(200),
            player_death_tick: Some(250),
            ..ScenarioScript::default()
        };
        let result = verify_scenario_determinism(&DirectorConfig::default(), &script, 2).unwrap();
        result.assert_deterministic();
    }
}

//! Run-level learning from per-stage telemetry.
//!
//! Each stage accumulates raw telemetry in a [`StageLedger`]. When the stage
//! ends the ledger is normalised into a `[0, 1]` sample and blended into the
//! [`RunAdaptationState`]:
//!
//! ```text
//! new = clamp01(lerp(max(0, old - decay), clamp01(sample), blend))
//! ```
//!
//! so every stage nudges the running value toward its latest sample while the
//! past fades even without new data. The ledger carries a latch: the natural
//! stage-end path and the event-end path may both try to commit, only the first
//! one counts.

use serde::{Deserialize, Serialize};

use crate::config::{AdaptationTuning, SignalTuning};
use crate::math::{clamp01, lerp};
use crate::roles::{Role, ROLE_COUNT};

/// Number of scalar run-level signals.
pub const SIGNAL_COUNT: usize = 4;

/// Scalar run-level signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Signal {
    /// How much damage players are taking.
    Damage,
    /// How contested the objective is.
    Contest,
    /// How often a lone player holds the objective.
    Solo,
    /// How often breaches trigger.
    Breach,
}

impl Signal {
    /// Every signal, in table order.
    pub const ALL: [Signal; SIGNAL_COUNT] =
        [Signal::Damage, Signal::Contest, Signal::Solo, Signal::Breach];

    const fn index(self) -> usize {
        match self {
            Signal::Damage => 0,
            Signal::Contest => 1,
            Signal::Solo => 2,
            Signal::Breach => 3,
        }
    }

    fn tuning(self, tuning: &AdaptationTuning) -> SignalTuning {
        match self {
            Signal::Damage => tuning.damage,
            Signal::Contest => tuning.contest,
            Signal::Solo => tuning.solo,
            Signal::Breach => tuning.breach,
        }
    }
}

/// One step of the damp-and-blend learner.
#[must_use]
pub fn blend_signal(old: f32, incoming: f32, tuning: SignalTuning) -> f32 {
    let damped = (clamp01(old) - tuning.decay).max(0.0);
    clamp01(lerp(damped, clamp01(incoming), clamp01(tuning.blend)))
}

/// Raw telemetry for one stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageTelemetry {
    /// Damage dealt to players by enemies.
    pub damage_taken: f32,
    /// Healing received by players.
    pub healing_received: f32,
    /// Contest-weighted seconds.
    pub contest_seconds: f32,
    /// Lone-wolf-pressure-weighted seconds.
    pub lone_wolf_seconds: f32,
    /// Breaches triggered.
    pub breach_triggers: u32,
    /// Per-role contributions from spawns and attributed damage.
    pub role_contributions: [f32; ROLE_COUNT],
    /// Stage seconds elapsed.
    pub elapsed: f32,
}

impl StageTelemetry {
    /// Accumulate per-tick continuous measures.
    pub fn advance(&mut self, dt: f32, contest_weight: f32, lone_wolf_pressure: f32) {
        self.elapsed += dt;
        self.contest_seconds += clamp01(contest_weight) * dt;
        self.lone_wolf_seconds += clamp01(lone_wolf_pressure) * dt;
    }

    /// Credit a role with a contribution.
    pub fn record_role(&mut self, role: Role, amount: f32) {
        if let Some(i) = role.index() {
            if amount.is_finite() && amount > 0.0 {
                self.role_contributions[i] += amount;
            }
        }
    }

    /// Normalise into a `[0, 1]` sample.
    #[must_use]
    pub fn normalize(&self, tuning: &AdaptationTuning, difficulty: f32) -> StageSample {
        let duration = self.elapsed.max(tuning.min_stage_seconds).max(1.0);
        let difficulty = difficulty.max(0.1);

        let net_damage = (self.damage_taken - 0.5 * self.healing_received).max(0.0);
        let damage = ratio(net_damage, tuning.damage_per_second * duration * difficulty);
        let contest = ratio(self.contest_seconds, tuning.contest_fraction * duration);
        let solo = ratio(self.lone_wolf_seconds, tuning.lone_wolf_fraction * duration);
        let breach = ratio(
            self.breach_triggers as f32,
            tuning.breaches_per_minute * (duration / 60.0) * difficulty,
        );

        let total: f32 = self.role_contributions.iter().sum();
        let mut roles = [0.0; ROLE_COUNT];
        if total > 0.0 {
            for (share, contribution) in roles.iter_mut().zip(self.role_contributions) {
                *share = clamp01(contribution / total);
            }
        }

        StageSample {
            signals: [damage, contest, solo, breach],
            roles,
        }
    }
}

fn ratio(value: f32, denominator: f32) -> f32 {
    if denominator <= f32::EPSILON || !denominator.is_finite() {
        0.0
    } else {
        clamp01(value / denominator)
    }
}

/// A normalised stage sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageSample {
    /// Damage, contest, solo, breach.
    pub signals: [f32; SIGNAL_COUNT],
    /// Role share, in [`Role::TAGGED`] order.
    pub roles: [f32; ROLE_COUNT],
}

/// Learned signals that persist for the whole run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunAdaptationState {
    signals: [f32; SIGNAL_COUNT],
    role_threat: [f32; ROLE_COUNT],
    stages_committed: u32,
}

impl RunAdaptationState {
    /// Fresh state with every signal at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of a signal.
    #[must_use]
    pub fn signal(&self, signal: Signal) -> f32 {
        self.signals[signal.index()]
    }

    /// All signals in [`Signal::ALL`] order.
    #[must_use]
    pub fn signals(&self) -> [f32; SIGNAL_COUNT] {
        self.signals
    }

    /// Threat signal for a role; zero for [`Role::None`].
    #[must_use]
    pub fn role_threat(&self, role: Role) -> f32 {
        role.index().map_or(0.0, |i| self.role_threat[i])
    }

    /// Stages blended so far.
    #[must_use]
    pub fn stages_committed(&self) -> u32 {
        self.stages_committed
    }

    /// Blend one stage sample in.
    pub fn blend(&mut self, sample: &StageSample, tuning: &AdaptationTuning) {
        for signal in Signal::ALL {
            let i = signal.index();
            self.signals[i] = blend_signal(self.signals[i], sample.signals[i], signal.tuning(tuning));
        }
        for (threat, incoming) in self.role_threat.iter_mut().zip(sample.roles) {
            *threat = blend_signal(*threat, incoming, tuning.role);
        }
        self.stages_committed += 1;
    }

    /// Linear combination of signals with per-item coefficients.
    #[must_use]
    pub fn weigh(&self, coefficients: [f32; SIGNAL_COUNT]) -> f32 {
        self.signals
            .iter()
            .zip(coefficients)
            .map(|(s, c)| s * c)
            .sum()
    }

    /// Back to zero. Only called at run start and end.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Stage telemetry plus the commit latch.
#[derive(Debug, Clone, Default)]
pub struct StageLedger {
    telemetry: StageTelemetry,
    committed: bool,
}

impl StageLedger {
    /// Empty, uncommitted ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read telemetry.
    #[must_use]
    pub fn telemetry(&self) -> &StageTelemetry {
        &self.telemetry
    }

    /// Mutable telemetry; ignored once committed.
    pub fn telemetry_mut(&mut self) -> Option<&mut StageTelemetry> {
        (!self.committed).then_some(&mut self.telemetry)
    }

    /// Whether this stage has already been committed.
    #[must_use]
    pub fn is_committed(&self) -> bool {
        self.committed
    }

    /// Commit into the run state exactly once; returns whether it committed.
    pub fn commit(
        &mut self,
        run: &mut RunAdaptationState,
        tuning: &AdaptationTuning,
        difficulty: f32,
    ) -> bool {
        if self.committed {
            return false;
        }
        self.committed = true;
        let sample = self.telemetry.normalize(tuning, difficulty);
        run.blend(&sample, tuning);
        tracing::info!(
            damage = sample.signals[0],
            contest = sample.signals[1],
            solo = sample.signals[2],
            breach = sample.signals[3],
            stages = run.stages_committed(),
            "Committed stage telemetry"
        );
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blend_rule() {
        let t = SignalTuning { decay: 0.1, blend: 0.5 };
        // max(0, 0.6 - 0.1) = 0.5 → lerp(0.5, 1.0, 0.5) = 0.75
        assert!((blend_signal(0.6, 1.0, t) - 0.75).abs() < 1e-6);
        // Decay never drives below zero
        assert_eq!(blend_signal(0.05, 0.0, t), 0.0);
        // Incoming is clamped
        assert!(blend_signal(0.0, 7.0, t) <= 1.0);
    }

    #[test]
    fn test_zero_telemetry_converges_to_zero() {
        let tuning = AdaptationTuning::default();
        let mut run = RunAdaptationState::new();
        let hot = StageSample {
            signals: [1.0; SIGNAL_COUNT],
            roles: [1.0; ROLE_COUNT],
        };
        run.blend(&hot, &tuning);
        run.blend(&hot, &tuning);
        assert!(run.signal(Signal::Damage) > 0.5);

        let cold = StageTelemetry::default().normalize(&tuning, 1.0);
        // Worst case (old = 1, decay 0.06, blend 0.35): value drops by the
        // decay every stage and by a further third, so 20 stages is ample.
        for _ in 0..20 {
            run.blend(&cold, &tuning);
        }
        for signal in Signal::ALL {
            assert_eq!(run.signal(signal), 0.0, "{signal:?} did not converge");
        }
        for role in Role::TAGGED {
            assert_eq!(run.role_threat(role), 0.0);
        }
    }

    #[test]
    fn test_ledger_commits_once() {
        let tuning = AdaptationTuning::default();
        let mut run = RunAdaptationState::new();
        let mut ledger = StageLedger::new();
        if let Some(t) = ledger.telemetry_mut() {
            t.damage_taken = 500.0;
            t.elapsed = 60.0;
        }
        assert!(ledger.commit(&mut run, &tuning, 1.0));
        let after_first = run.clone();
        assert!(!ledger.commit(&mut run, &tuning, 1.0));
        assert_eq!(run, after_first);
        assert_eq!(run.stages_committed(), 1);
        assert!(ledger.telemetry_mut().is_none());
    }

    #[test]
    fn test_normalize_scales_with_duration_and_difficulty() {
        let tuning = AdaptationTuning::default();
        let telemetry = StageTelemetry {
            damage_taken: 240.0,
            elapsed: 60.0,
            ..Default::default()
        };
        // 240 / (4 * 60 * 1) = 1.0
        assert!((telemetry.normalize(&tuning, 1.0).signals[0] - 1.0).abs() < 1e-6);
        // Twice the difficulty halves the sample
        assert!((telemetry.normalize(&tuning, 2.0).signals[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_role_shares() {
        let tuning = AdaptationTuning::default();
        let mut telemetry = StageTelemetry::default();
        telemetry.record_role(Role::Hunter, 3.0);
        telemetry.record_role(Role::Artillery, 1.0);
        telemetry.record_role(Role::None, 50.0);
        let sample = telemetry.normalize(&tuning, 1.0);
        assert!((sample.roles[Role::Hunter.index().unwrap()] - 0.75).abs() < 1e-6);
        assert!((sample.roles[Role::Artillery.index().unwrap()] - 0.25).abs() < 1e-6);
    }
}

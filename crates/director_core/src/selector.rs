//! Weighted operation selection.
//!
//! Every candidate's weight is `1 + affinity + adaptation`, clamped into the
//! configured bounds before it reaches the cumulative sum. Warnings are drawn
//! without replacement so the two active warnings always differ.

use rand::Rng;

use crate::adaptation::RunAdaptationState;
use crate::config::SelectorTuning;
use crate::operation::{Anomaly, DoctrineProfile, OperationRoll, Warning};
use crate::roles::Role;

/// Scale of the learned role-threat term in every weight.
const ROLE_THREAT_WEIGHT: f32 = 0.5;
/// Support-role bonus when a warning favours the role.
const SUPPORT_WARNING_BONUS: f32 = 0.8;
/// Support-role bonus when the doctrine rotation contains the role.
const SUPPORT_ROTATION_BONUS: f32 = 0.5;

/// Draw one item from `candidates` with probability proportional to weight.
///
/// Non-positive and non-finite weights count as zero. Returns `None` only for
/// an empty slice; when every weight is zero the first candidate wins.
pub fn weighted_pick<T: Copy, R: Rng + ?Sized>(candidates: &[(T, f32)], rng: &mut R) -> Option<T> {
    let usable = |w: f32| if w.is_finite() && w > 0.0 { w } else { 0.0 };
    let total: f32 = candidates.iter().map(|(_, w)| usable(*w)).sum();
    if !(total > 0.0) {
        return candidates.first().map(|(c, _)| *c);
    }
    let mut roll = rng.gen_range(0.0..total);
    for (candidate, weight) in candidates {
        let weight = usable(*weight);
        if roll < weight {
            return Some(*candidate);
        }
        roll -= weight;
    }
    // Float drift can leave a sliver past the last bucket.
    candidates.iter().rev().find(|(_, w)| usable(*w) > 0.0).map(|(c, _)| *c)
}

/// Which doctrine ran last and for how many consecutive stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DoctrineHistory {
    last: Option<DoctrineProfile>,
    streak: u32,
    before_last: (Option<DoctrineProfile>, u32),
}

impl DoctrineHistory {
    /// Record the doctrine chosen for a stage.
    pub fn record(&mut self, doctrine: DoctrineProfile) {
        self.before_last = (self.last, self.streak);
        if self.last == Some(doctrine) {
            self.streak += 1;
        } else {
            self.last = Some(doctrine);
            self.streak = 1;
        }
    }

    /// Replace the current stage's doctrine after a mid-stage pivot, so the
    /// repeat penalty sees the doctrine the stage ended on.
    pub fn amend(&mut self, doctrine: DoctrineProfile) {
        if self.last.is_none() {
            self.record(doctrine);
            return;
        }
        let (last, streak) = self.before_last;
        self.last = last;
        self.streak = streak;
        self.record(doctrine);
        self.before_last = (last, streak);
    }

    /// Last doctrine, if any stage has been rolled.
    #[must_use]
    pub fn last(&self) -> Option<DoctrineProfile> {
        self.last
    }

    /// Consecutive stages the last doctrine has run.
    #[must_use]
    pub fn streak(&self) -> u32 {
        self.streak
    }
}

/// Rolls operations and support roles from the configured weights.
#[derive(Debug, Clone)]
pub struct OperationSelector {
    tuning: SelectorTuning,
}

impl OperationSelector {
    /// Create a selector with the given bounds and penalties.
    #[must_use]
    pub fn new(tuning: SelectorTuning) -> Self {
        Self { tuning }
    }

    /// Clamp a raw weight into bounds. Non-finite weights become the minimum.
    #[must_use]
    pub fn clamp_weight(&self, raw: f32) -> f32 {
        if raw.is_finite() {
            raw.clamp(self.tuning.weight_min, self.tuning.weight_max)
        } else {
            self.tuning.weight_min
        }
    }

    /// Weight of a doctrine given the run state and history.
    #[must_use]
    pub fn doctrine_weight(
        &self,
        doctrine: DoctrineProfile,
        run: &RunAdaptationState,
        history: &DoctrineHistory,
    ) -> f32 {
        let rotation = doctrine.rotation();
        let role_term = rotation.iter().map(|r| run.role_threat(*r)).sum::<f32>()
            / rotation.len().max(1) as f32;
        let mut raw = 1.0 + run.weigh(doctrine.signal_coefficients()) + ROLE_THREAT_WEIGHT * role_term;
        if history.last() == Some(doctrine) {
            raw *= if history.streak() >= 2 {
                self.tuning.streak_penalty
            } else {
                self.tuning.repeat_penalty
            };
        }
        self.clamp_weight(raw)
    }

    /// Weight of a warning under a doctrine.
    #[must_use]
    pub fn warning_weight(
        &self,
        warning: Warning,
        doctrine: DoctrineProfile,
        run: &RunAdaptationState,
    ) -> f32 {
        let role_term = warning.favored_role().map_or(0.0, |r| run.role_threat(r));
        self.clamp_weight(
            1.0 + doctrine.warning_affinity(warning)
                + run.weigh(warning.signal_coefficients())
                + ROLE_THREAT_WEIGHT * role_term,
        )
    }

    /// Weight of an anomaly under a doctrine.
    #[must_use]
    pub fn anomaly_weight(
        &self,
        anomaly: Anomaly,
        doctrine: DoctrineProfile,
        run: &RunAdaptationState,
    ) -> f32 {
        self.clamp_weight(
            1.0 + doctrine.anomaly_affinity(anomaly) + run.weigh(anomaly.signal_coefficients()),
        )
    }

    /// Roll a full operation for a stage. Stage 0 is always Balanced.
    pub fn roll<R: Rng + ?Sized>(
        &self,
        stage_index: u32,
        run: &RunAdaptationState,
        history: &DoctrineHistory,
        rng: &mut R,
    ) -> OperationRoll {
        let doctrine = if stage_index == 0 {
            DoctrineProfile::Balanced
        } else {
            let weights: Vec<(DoctrineProfile, f32)> = DoctrineProfile::ALL
                .iter()
                .map(|d| (*d, self.doctrine_weight(*d, run, history)))
                .collect();
            weighted_pick(&weights, rng).unwrap_or_default()
        };
        self.roll_modifiers(doctrine, run, rng)
    }

    /// Re-roll the doctrine toward `preferred`, then roll fresh modifiers.
    ///
    /// Falls back to a weighted draw among the other doctrines when there is
    /// no preference or the preference is already active.
    pub fn pivot<R: Rng + ?Sized>(
        &self,
        current: &OperationRoll,
        preferred: Option<DoctrineProfile>,
        run: &RunAdaptationState,
        rng: &mut R,
    ) -> OperationRoll {
        let doctrine = match preferred {
            Some(d) if d != current.doctrine() => d,
            _ => {
                let history = DoctrineHistory::default();
                let weights: Vec<(DoctrineProfile, f32)> = DoctrineProfile::ALL
                    .iter()
                    .filter(|d| **d != current.doctrine())
                    .map(|d| (*d, self.doctrine_weight(*d, run, &history)))
                    .collect();
                weighted_pick(&weights, rng).unwrap_or_default()
            }
        };
        self.roll_modifiers(doctrine, run, rng)
    }

    fn roll_modifiers<R: Rng + ?Sized>(
        &self,
        doctrine: DoctrineProfile,
        run: &RunAdaptationState,
        rng: &mut R,
    ) -> OperationRoll {
        let mut warnings: Vec<(Warning, f32)> = Warning::ALL
            .iter()
            .map(|w| (*w, self.warning_weight(*w, doctrine, run)))
            .collect();
        let warning_a = weighted_pick(&warnings, rng).unwrap_or(Warning::SuppressionVolleys);
        warnings.retain(|(w, _)| *w != warning_a);
        let warning_b = weighted_pick(&warnings, rng).unwrap_or(Warning::MedicCorps);

        let anomalies: Vec<(Anomaly, f32)> = Anomaly::ALL
            .iter()
            .map(|a| (*a, self.anomaly_weight(*a, doctrine, run)))
            .collect();
        let anomaly = weighted_pick(&anomalies, rng).unwrap_or(Anomaly::Stillness);

        OperationRoll::new(doctrine, warning_a, warning_b, anomaly).unwrap_or_default()
    }

    /// Weighted support role for the third assault pulse.
    pub fn support_role<R: Rng + ?Sized>(
        &self,
        roll: &OperationRoll,
        run: &RunAdaptationState,
        rng: &mut R,
    ) -> Role {
        let rotation = roll.doctrine().rotation();
        let weights: Vec<(Role, f32)> = Role::SUPPORT
            .iter()
            .map(|role| {
                let mut raw = 1.0 + ROLE_THREAT_WEIGHT * run.role_threat(*role);
                if roll.warnings().iter().any(|w| w.favored_role() == Some(*role)) {
                    raw += SUPPORT_WARNING_BONUS;
                }
                if rotation.contains(role) {
                    raw += SUPPORT_ROTATION_BONUS;
                }
                (*role, self.clamp_weight(raw))
            })
            .collect();
        weighted_pick(&weights, rng).unwrap_or(Role::Flanker)
    }
}

impl Default for OperationSelector {
    fn default() -> Self {
        Self::new(SelectorTuning::default())
    }
}

//! Per-stage state owned by the director.

use crate::adaptation::StageLedger;
use crate::cadence::{CadenceMachine, CadencePhase};
use crate::commander::{kind_mask, CommanderNode};
use crate::config::DirectorConfig;
use crate::error::{DirectorError, Result};
use crate::fairness::FairnessState;
use crate::hooks::StageInfo;
use crate::host::UnitId;
use crate::math::Vec2;
use crate::operation::OperationRoll;
use crate::roles::Role;
use crate::spawn::SpawnLayer;
use crate::steering::SteeringController;

/// Intensity target added per siege tier.
const INTENSITY_PER_TIER: f32 = 5.0;
/// Intensity target removed while mercy is open.
const MERCY_INTENSITY_RELIEF: f32 = 20.0;

/// Everything that lives for exactly one stage.
///
/// Created on stage start and dropped on the next stage start or run end.
/// Run-level state (learned signals, doctrine history) lives on the
/// director, not here.
#[derive(Debug, Clone)]
pub struct StageSession {
    pub(crate) info: StageInfo,
    pub(crate) elapsed: f32,
    pub(crate) cadence: CadenceMachine,
    pub(crate) roll: OperationRoll,
    pub(crate) intensity: f32,
    pub(crate) charge_fraction: f32,
    pub(crate) commanders: Vec<CommanderNode>,
    pub(crate) spawn: SpawnLayer,
    pub(crate) fairness: FairnessState,
    pub(crate) ledger: StageLedger,
    pub(crate) steering: SteeringController,
}

impl StageSession {
    /// Fresh session in Recon.
    #[must_use]
    pub fn new(info: StageInfo, roll: OperationRoll, config: &DirectorConfig) -> Self {
        Self {
            info,
            elapsed: 0.0,
            cadence: CadenceMachine::new(config),
            roll,
            intensity: 0.0,
            charge_fraction: 0.0,
            commanders: Vec::new(),
            spawn: SpawnLayer::new(config.spawn.clone()),
            fairness: FairnessState::new(),
            ledger: StageLedger::new(),
            steering: SteeringController::new(config.steering.clone()),
        }
    }

    /// Stage parameters.
    #[must_use]
    pub fn info(&self) -> &StageInfo {
        &self.info
    }

    /// Seconds since stage start.
    #[must_use]
    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }

    /// Active phase.
    #[must_use]
    pub fn phase(&self) -> CadencePhase {
        self.cadence.phase()
    }

    /// The pacing machine.
    #[must_use]
    pub fn cadence(&self) -> &CadenceMachine {
        &self.cadence
    }

    /// Active operation.
    #[must_use]
    pub fn roll(&self) -> &OperationRoll {
        &self.roll
    }

    /// Intensity in `[0, 100]`.
    #[must_use]
    pub fn intensity(&self) -> f32 {
        self.intensity
    }

    /// Objective charge fraction seen on the last tick.
    #[must_use]
    pub fn charge_fraction(&self) -> f32 {
        self.charge_fraction
    }

    /// Live commander nodes.
    #[must_use]
    pub fn commanders(&self) -> &[CommanderNode] {
        &self.commanders
    }

    /// Bitmask of live commander kinds.
    #[must_use]
    pub fn commander_mask(&self) -> u8 {
        kind_mask(&self.commanders)
    }

    /// Spawn layer and its credit.
    #[must_use]
    pub fn spawn(&self) -> &SpawnLayer {
        &self.spawn
    }

    /// Mercy and lone-wolf state.
    #[must_use]
    pub fn fairness(&self) -> &FairnessState {
        &self.fairness
    }

    /// Telemetry ledger.
    #[must_use]
    pub fn ledger(&self) -> &StageLedger {
        &self.ledger
    }

    /// Role steering.
    #[must_use]
    pub fn steering(&self) -> &SteeringController {
        &self.steering
    }

    /// Director-spawned units still tracked, commanders included.
    #[must_use]
    pub fn alive_enemies(&self) -> usize {
        self.steering.len() + self.commanders.len()
    }

    /// Role a tracked unit was spawned with.
    #[must_use]
    pub fn role_of(&self, unit: UnitId) -> Option<Role> {
        self.steering
            .agents()
            .iter()
            .find(|a| a.unit() == unit)
            .map(|a| a.role())
            .or_else(|| self.commanders.iter().any(|c| c.unit() == unit).then_some(Role::Anchor))
    }

    /// Anchors for commanders fielded at stage entry.
    #[must_use]
    pub fn command_zones(&self) -> &[Vec2] {
        &self.info.command_zones
    }

    /// Where intensity is heading this tick.
    #[must_use]
    pub fn intensity_target(&self) -> f32 {
        let mut target = self.cadence.phase().intensity_target() + f32::from(self.cadence.tier()) * INTENSITY_PER_TIER;
        if self.fairness.mercy_active() {
            target -= MERCY_INTENSITY_RELIEF;
        }
        target.clamp(0.0, 100.0)
    }

    /// Ease intensity toward its target.
    pub fn ease_intensity(&mut self, dt: f32, response: f32) {
        let step = (response.max(0.0) * dt).min(1.0);
        let next = self.intensity + (self.intensity_target() - self.intensity) * step;
        self.intensity = if next.is_finite() { next.clamp(0.0, 100.0) } else { 0.0 };
    }

    /// Fail if session state contradicts itself.
    pub fn check_invariants(&self) -> Result<()> {
        self.cadence.check_invariants()?;
        if !(0.0..=100.0).contains(&self.intensity) {
            return Err(DirectorError::InvariantViolation(format!(
                "intensity {} outside [0, 100]",
                self.intensity
            )));
        }
        if self.commanders.iter().any(CommanderNode::is_consumed) {
            return Err(DirectorError::InvariantViolation(
                "consumed commander still tracked".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> StageSession {
        StageSession::new(StageInfo::new(0, 1.0), OperationRoll::baseline(), &DirectorConfig::default())
    }

    #[test]
    fn test_new_session_is_recon() {
        let s = session();
        assert_eq!(s.phase(), CadencePhase::Recon);
        assert_eq!(s.alive_enemies(), 0);
        assert_eq!(s.intensity(), 0.0);
        assert!(s.check_invariants().is_ok());
    }

    #[test]
    fn test_intensity_eases_and_stays_bounded() {
        let mut s = session();
        for _ in 0..10_000 {
            s.ease_intensity(0.05, 50.0);
            assert!((0.0..=100.0).contains(&s.intensity()));
        }
        assert!((s.intensity() - CadencePhase::Recon.intensity_target()).abs() < 1e-3);
    }

    #[test]
    fn test_out_of_range_intensity_is_a_violation() {
        let mut s = session();
        s.intensity = 140.0;
        assert!(matches!(s.check_invariants(), Err(DirectorError::InvariantViolation(_))));
    }
}
